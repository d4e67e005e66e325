//! Lookup command implementation

use anyhow::Result;
use intraday_strategies::instruments::{ContractsTable, InstrumentLookup};
use intraday_strategies::Config;
use tracing::info;

pub fn run(config_path: String, name: String) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let table = ContractsTable::from_csv(&config.instruments.contracts_csv)?;

    match table.lookup(&name) {
        Some(id) => {
            info!("Resolved {} -> {}", name, id);
            println!("{}", id);
            Ok(())
        }
        None => anyhow::bail!("Instrument not found: {}", name),
    }
}
