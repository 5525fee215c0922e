//! Phase executor.
//!
//! Runs stages in declared order and units in registration order, recording
//! every unit's status in the ledger. A failing unit is recorded and skipped;
//! it never aborts its stage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::domain::{ExecutionRecord, UnitStatus};

use super::ledger::{LedgerError, StatusLedger};
use super::stage::{Resources, Stage, StageRegistry, UnitSpec};

/// Errors surfaced to callers of the executor
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown stage '{name}' (registered: {registered})")]
    UnknownStage { name: String, registered: String },
}

/// Outcome of one unit within a stage run
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub unit: String,
    pub status: UnitStatus,
    pub error: Option<String>,
}

/// Outcome of one stage run
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub outcomes: Vec<UnitOutcome>,
}

impl StageReport {
    /// Units that ended in FAILED
    pub fn failed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| o.status == UnitStatus::Failed)
    }
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// Number of failed units across all stages
    pub fn failure_count(&self) -> usize {
        self.stages.iter().map(|s| s.failed().count()).sum()
    }
}

/// Main pipeline executor
pub struct Orchestrator {
    registry: StageRegistry,
    resources: Resources,
    ledger: StatusLedger,
}

impl Orchestrator {
    /// Create an executor from explicit collaborators
    pub fn new(registry: StageRegistry, resources: Resources, ledger: StatusLedger) -> Self {
        Self {
            registry,
            resources,
            ledger,
        }
    }

    /// Standard stages over the stores and ledger named by the configuration
    pub fn from_config(config: &ResolvedConfig) -> anyhow::Result<Self> {
        let resources = Resources::open(config)?;
        let ledger = StatusLedger::open_or_in_memory(&config.ledger_path())?;
        Ok(Self::new(StageRegistry::standard(), resources, ledger))
    }

    /// The stage registry
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Run exactly one named stage
    #[instrument(skip(self))]
    pub async fn execute_stage(&self, name: &str) -> Result<StageReport, OrchestratorError> {
        match self.registry.get(name) {
            Some(stage) => Ok(self.run_stage(stage).await),
            None => {
                let err = OrchestratorError::UnknownStage {
                    name: name.to_string(),
                    registered: self.registry.stage_names().join(", "),
                };
                error!(error = %err, "Stage not executed");
                Err(err)
            }
        }
    }

    /// Run every registered stage in declared order
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn execute_all_stages(&self) -> PipelineReport {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        info!(%run_id, stages = self.registry.stages().len(), "Starting pipeline execution");

        let mut stages = Vec::with_capacity(self.registry.stages().len());
        for stage in self.registry.stages() {
            stages.push(self.run_stage(stage).await);
        }

        let report = PipelineReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            stages,
        };
        info!(
            %run_id,
            failures = report.failure_count(),
            "Pipeline execution complete"
        );
        report
    }

    /// Latest status of every unit that has ever run
    pub fn get_execution_logs(&self) -> Result<Vec<ExecutionRecord>, LedgerError> {
        self.ledger.get_all_statuses()
    }

    #[instrument(skip(self, stage), fields(stage = %stage.name))]
    async fn run_stage(&self, stage: &Stage) -> StageReport {
        info!(units = stage.units.len(), "Executing stage");

        let mut outcomes = Vec::with_capacity(stage.units.len());
        for spec in &stage.units {
            outcomes.push(self.run_unit(stage, spec).await);
        }

        let failed = outcomes
            .iter()
            .filter(|o| o.status == UnitStatus::Failed)
            .count();
        if failed > 0 {
            warn!(failed, "Stage completed with failed units");
        } else {
            info!("Stage completed");
        }

        StageReport {
            stage: stage.name.clone(),
            outcomes,
        }
    }

    async fn run_unit(&self, stage: &Stage, spec: &UnitSpec) -> UnitOutcome {
        self.record(spec.name, UnitStatus::Executing, None);

        let built = stage
            .strategy
            .resolve(&self.resources)
            .and_then(|args| (spec.construct)(args));

        let result = match built {
            Ok(unit) => unit.execute().await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                info!(unit = spec.name, "Unit done");
                self.record(spec.name, UnitStatus::Done, None);
                UnitOutcome {
                    unit: spec.name.to_string(),
                    status: UnitStatus::Done,
                    error: None,
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(unit = spec.name, error = %message, "Unit failed");
                self.record(spec.name, UnitStatus::Failed, Some(&message));
                UnitOutcome {
                    unit: spec.name.to_string(),
                    status: UnitStatus::Failed,
                    error: Some(message),
                }
            }
        }
    }

    /// Ledger writes are observability only; failures are logged and dropped
    fn record(&self, unit: &str, status: UnitStatus, error_message: Option<&str>) {
        if let Err(e) = self.ledger.update_status(unit, status, error_message) {
            warn!(unit, %status, error = %e, "Failed to update execution ledger");
        }
    }
}
