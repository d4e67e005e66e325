//! Instrument name to exchange identifier lookup

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::EngineError;
use crate::Symbol;

/// Resolves human-readable contract names (e.g. `NIFTY25NOV24500CE`) to the
/// identifiers prices are published under
pub trait InstrumentLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Symbol>;
}

/// Resolve `name` or fail with [`EngineError::UnknownInstrument`]
pub fn require_instrument(lookup: &dyn InstrumentLookup, name: &str) -> Result<Symbol, EngineError> {
    lookup
        .lookup(name)
        .ok_or_else(|| EngineError::UnknownInstrument(name.to_string()))
}

#[derive(Debug, Deserialize)]
struct ContractRow {
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "exchangeInstrumentID")]
    exchange_instrument_id: String,
}

/// Contracts master loaded from the broker's CSV dump
#[derive(Debug, Clone, Default)]
pub struct ContractsTable {
    by_description: HashMap<String, Symbol>,
}

impl ContractsTable {
    /// Load from a CSV with `Description` and `exchangeInstrumentID` columns.
    ///
    /// Extra columns are ignored. A duplicated description keeps its first row.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open contracts file {}", path.display()))?;

        let mut by_description = HashMap::new();
        for (row_idx, result) in reader.deserialize::<ContractRow>().enumerate() {
            let row = result.context(format!("Failed to read contracts row {}", row_idx + 1))?;
            by_description
                .entry(row.description.trim().to_string())
                .or_insert_with(|| Symbol::new(row.exchange_instrument_id.trim()));
        }

        info!("Loaded {} contracts from {}", by_description.len(), path.display());
        Ok(Self { by_description })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        Self {
            by_description: pairs
                .into_iter()
                .map(|(name, id)| (name.into(), Symbol::new(id)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_description.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_description.is_empty()
    }
}

impl InstrumentLookup for ContractsTable {
    fn lookup(&self, name: &str) -> Option<Symbol> {
        self.by_description.get(name.trim()).cloned()
    }
}
