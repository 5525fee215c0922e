//! dataops - Medallion data pipeline orchestrator
//!
//! Moves motor vehicle collision and NHTSA safety rating data through a
//! fixed sequence of zones, each backed by its own table store.
//!
//! # Architecture
//!
//! The system is built around a static stage registry:
//! - Stages run in declared order (landing, formatted, trusted, exploitation,
//!   analytical_sandbox, feature_engineering)
//! - Each stage constructs its units fresh from the collaborators its
//!   argument strategy resolves
//! - A failing unit is recorded in the status ledger and never stops its
//!   siblings or later stages
//!
//! # Modules
//!
//! - `core`: Orchestration logic (StageRegistry, Orchestrator, StatusLedger)
//! - `units`: Processing units for every stage, including the trusted cleaners
//! - `store`: Table store contract and its SQLite/in-memory backends
//! - `domain`: Data structures (Dataset, Value, ExecutionRecord)
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run every stage
//! dataops run
//!
//! # Run a single stage
//! dataops run trusted
//!
//! # Check the latest status of every unit
//! dataops logs
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;
pub mod units;

// Re-export main types at crate root for convenience
pub use config::{CleaningSettings, ResolvedConfig};
pub use core::{Orchestrator, StageRegistry, StatusLedger};
pub use domain::{Dataset, ExecutionRecord, UnitStatus, Value};
pub use store::{MemoryTableStore, SharedStore, SqliteTableStore, TableStore, Zone};
pub use units::ProcessingUnit;
