//! Core orchestration logic.
//!
//! This module contains:
//! - StatusLedger: Persistent per-unit execution status
//! - StageRegistry: Static stage → unit table with collaborator strategies
//! - Orchestrator: Phase executor with per-unit failure isolation
//! - PipelineLock: Exclusive lock guarding zone stores across processes

pub mod ledger;
pub mod lock;
pub mod orchestrator;
pub mod stage;

// Re-export commonly used types
pub use ledger::{LedgerError, StatusLedger};
pub use lock::{LockError, PipelineLock};
pub use orchestrator::{Orchestrator, OrchestratorError, PipelineReport, StageReport, UnitOutcome};
pub use stage::{
    ArgStrategy, RegistryError, Resources, Stage, StageRegistry, UnitArgs, UnitConstructor,
    UnitSpec,
};
