//! Intraday strategies - main entry point
//!
//! This binary provides two subcommands:
//! - run: Replay tick data through one strategy with simulated execution
//! - lookup: Resolve a contract name to its instrument id

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "intraday-strategies")]
#[command(about = "Intraday strategy simulator with order management and risk checks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a strategy against replayed market data
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/mean_reversion_nifty.json")]
        config: String,

        /// Tick CSV to replay (symbol,timestamp,price)
        #[arg(short, long, default_value = "data/ticks.csv")]
        data: String,
    },

    /// Look up an instrument id by contract name
    Lookup {
        /// Path to configuration file (for the contracts table location)
        #[arg(short, long, default_value = "configs/mean_reversion_nifty.json")]
        config: String,

        /// Contract name, e.g. "NIFTY25NOV24500CE"
        name: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Lookup { .. } => "lookup",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Run { config, data } => commands::run::run(config, data).await,
        Commands::Lookup { config, name } => commands::lookup::run(config, name),
    }
}
