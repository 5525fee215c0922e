//! Table store connectors.
//!
//! Every zone of the pipeline (formatted, trusted, ...) is backed by its own
//! table store. Units only ever talk to a store through the narrow
//! `TableStore` contract, so tests can swap in `MemoryTableStore`.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::{Dataset, DatasetError};

pub use memory::MemoryTableStore;
pub use sqlite::SqliteTableStore;

/// Errors surfaced by a table store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Table '{table}' has no column '{column}'")]
    SchemaMismatch { table: String, column: String },

    #[error("Cannot create table '{0}' without columns")]
    NoColumns(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

/// Narrow contract every zone store implements
pub trait TableStore: Send + Sync {
    /// Human-readable store label used in logs
    fn label(&self) -> &str;

    /// Whether a table with this exact name exists
    fn exists_table(&self, name: &str) -> Result<bool, StoreError>;

    /// Read a whole table
    fn get_table(&self, name: &str) -> Result<Dataset, StoreError>;

    /// Create the table from `data` if absent, otherwise append its rows
    fn insert_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError>;

    /// Drop any existing table of that name, then create it from `data`
    fn replace_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError>;

    /// Names of all tables, in a stable order
    fn list_tables(&self) -> Result<Vec<String>, StoreError>;
}

/// A store handle shared by every unit of a stage
pub type SharedStore = Arc<dyn TableStore>;

/// Persisted zones of the medallion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    Formatted,
    Trusted,
    Exploitation,
    AnalyticalSandbox,
    FeatureEngineering,
}

impl Zone {
    /// All zones in pipeline order
    pub const ALL: [Zone; 5] = [
        Zone::Formatted,
        Zone::Trusted,
        Zone::Exploitation,
        Zone::AnalyticalSandbox,
        Zone::FeatureEngineering,
    ];

    /// Zone name, also the stem of its store file
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Formatted => "formatted",
            Zone::Trusted => "trusted",
            Zone::Exploitation => "exploitation",
            Zone::AnalyticalSandbox => "analytical_sandbox",
            Zone::FeatureEngineering => "feature_engineering",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Zone::ALL
            .into_iter()
            .find(|z| z.as_str() == normalized)
            .ok_or_else(|| format!("unknown zone '{}'", s))
    }
}

/// Quote an identifier for SQL, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_parsing_accepts_dashes() {
        assert_eq!("analytical-sandbox".parse::<Zone>().unwrap(), Zone::AnalyticalSandbox);
        assert_eq!("Trusted".parse::<Zone>().unwrap(), Zone::Trusted);
        assert!("landing".parse::<Zone>().is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
