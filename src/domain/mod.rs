//! Domain types for the dataops orchestrator.
//!
//! This module contains the core data structures:
//! - Dataset: In-memory table handed between pipeline steps
//! - Record: Ledger entries describing the latest status of each unit

pub mod dataset;
pub mod record;

// Re-export commonly used types
pub use dataset::{Dataset, DatasetError, Value, TIMESTAMP_FORMAT};
pub use record::{ExecutionRecord, UnitStatus};
