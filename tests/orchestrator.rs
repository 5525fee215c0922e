//! Orchestrator Integration Tests
//!
//! Tests for stage ordering, per-unit failure isolation, and ledger updates.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dataops::core::stage::{ArgStrategy, RegistryError, Resources, Stage, StageRegistry, UnitArgs, UnitSpec};
use dataops::core::{Orchestrator, OrchestratorError, StatusLedger};
use dataops::domain::{Dataset, UnitStatus, Value};
use dataops::store::{MemoryTableStore, SharedStore, Zone};
use dataops::units::ProcessingUnit;
use tempfile::TempDir;

/// Writes a one-row table named after itself, or fails when told to
struct MarkerUnit {
    name: &'static str,
    fail: bool,
    target: SharedStore,
}

#[async_trait]
impl ProcessingUnit for MarkerUnit {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self) -> Result<()> {
        if self.fail {
            anyhow::bail!("{} exploded", self.name);
        }
        let data = Dataset::from_rows(vec!["ran".into()], vec![vec![Value::Bool(true)]])?;
        self.target.replace_table(self.name, &data)?;
        Ok(())
    }
}

fn marker(name: &'static str, fail: bool, args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (_, target, _) = args.into_zone_to_zone(name)?;
    Ok(Box::new(MarkerUnit { name, fail, target }))
}

fn build_a(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    marker("unit_a", false, args)
}

fn build_b(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    marker("unit_b", true, args)
}

fn build_c(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    marker("unit_c", false, args)
}

fn build_d(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    marker("unit_d", false, args)
}

fn registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry
        .register(Stage::new(
            "first",
            ArgStrategy::Between {
                source: Zone::Formatted,
                target: Zone::Trusted,
            },
            vec![
                UnitSpec::new("unit_a", build_a),
                UnitSpec::new("unit_b", build_b),
                UnitSpec::new("unit_c", build_c),
            ],
        ))
        .unwrap();
    registry
        .register(Stage::new(
            "second",
            ArgStrategy::Between {
                source: Zone::Trusted,
                target: Zone::Exploitation,
            },
            vec![UnitSpec::new("unit_d", build_d)],
        ))
        .unwrap();
    registry
}

struct Fixture {
    orchestrator: Orchestrator,
    trusted: Arc<MemoryTableStore>,
    exploitation: Arc<MemoryTableStore>,
}

fn fixture() -> Fixture {
    let trusted = Arc::new(MemoryTableStore::new("trusted"));
    let exploitation = Arc::new(MemoryTableStore::new("exploitation"));
    let resources = Resources::in_memory(PathBuf::from("/nonexistent/tmp"), PathBuf::from("/nonexistent/persist"))
        .with_store(Zone::Trusted, trusted.clone())
        .with_store(Zone::Exploitation, exploitation.clone());
    let orchestrator = Orchestrator::new(registry(), resources, StatusLedger::in_memory().unwrap());
    Fixture {
        orchestrator,
        trusted,
        exploitation,
    }
}

#[tokio::test]
async fn test_failing_unit_does_not_stop_siblings() {
    use dataops::store::TableStore;

    let f = fixture();
    let report = f.orchestrator.execute_stage("first").await.unwrap();

    let statuses: Vec<(&str, UnitStatus)> = report
        .outcomes
        .iter()
        .map(|o| (o.unit.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("unit_a", UnitStatus::Done),
            ("unit_b", UnitStatus::Failed),
            ("unit_c", UnitStatus::Done),
        ]
    );

    // A and C both wrote their output; B did not
    assert!(f.trusted.exists_table("unit_a").unwrap());
    assert!(!f.trusted.exists_table("unit_b").unwrap());
    assert!(f.trusted.exists_table("unit_c").unwrap());

    let logs = f.orchestrator.get_execution_logs().unwrap();
    let b = logs.iter().find(|r| r.unit_name == "unit_b").unwrap();
    assert_eq!(b.status, UnitStatus::Failed);
    assert!(b.error_message.as_deref().unwrap().contains("unit_b exploded"));
    assert!(logs
        .iter()
        .filter(|r| r.unit_name != "unit_b")
        .all(|r| r.status == UnitStatus::Done));
}

#[tokio::test]
async fn test_all_stages_continue_past_failures() {
    use dataops::store::TableStore;

    let f = fixture();
    let report = f.orchestrator.execute_all_stages().await;

    let stage_names: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stage_names, vec!["first", "second"]);
    assert_eq!(report.failure_count(), 1);
    assert!(f.exploitation.exists_table("unit_d").unwrap());
    assert!(report.completed_at >= report.started_at);
}

#[tokio::test]
async fn test_unknown_stage_is_an_error_not_a_crash() {
    let f = fixture();
    let err = f.orchestrator.execute_stage("gold").await.unwrap_err();

    match err {
        OrchestratorError::UnknownStage { name, registered } => {
            assert_eq!(name, "gold");
            assert_eq!(registered, "first, second");
        }
    }
    assert!(f.orchestrator.get_execution_logs().unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_collaborators_fail_the_unit() {
    let mut registry = StageRegistry::new();
    registry
        .register(Stage::new(
            "misconfigured",
            ArgStrategy::Landing,
            vec![UnitSpec::new("unit_a", build_a)],
        ))
        .unwrap();
    let resources = Resources::in_memory(PathBuf::from("/tmp/in"), PathBuf::from("/tmp/out"));
    let orchestrator = Orchestrator::new(registry, resources, StatusLedger::in_memory().unwrap());

    let report = orchestrator.execute_stage("misconfigured").await.unwrap();
    assert_eq!(report.outcomes[0].status, UnitStatus::Failed);
    assert!(report.outcomes[0].error.as_deref().unwrap().contains("unit_a"));
}

#[tokio::test]
async fn test_standard_pipeline_over_empty_folders() {
    let temp = TempDir::new().unwrap();
    let temporal = temp.path().join("temporal");
    let persistent = temp.path().join("persistent");
    std::fs::create_dir_all(&temporal).unwrap();
    std::fs::create_dir_all(&persistent).unwrap();

    let orchestrator = Orchestrator::new(
        StageRegistry::standard(),
        Resources::in_memory(temporal, persistent),
        StatusLedger::in_memory().unwrap(),
    );
    let report = orchestrator.execute_all_stages().await;

    let stage_names: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(
        stage_names,
        vec![
            "landing",
            "formatted",
            "trusted",
            "exploitation",
            "analytical_sandbox",
            "feature_engineering"
        ]
    );

    // Nothing to land or clean is not a failure; missing upstream tables are
    let outcome = |unit: &str| {
        report
            .stages
            .iter()
            .flat_map(|s| &s.outcomes)
            .find(|o| o.unit == unit)
            .map(|o| o.status)
    };
    assert_eq!(outcome("landing"), Some(UnitStatus::Done));
    assert_eq!(outcome("csv_formatted"), Some(UnitStatus::Done));
    assert_eq!(outcome("mvc_crash_trusted"), Some(UnitStatus::Done));
    assert_eq!(outcome("brand_safety_exploitation"), Some(UnitStatus::Failed));

    let logs = orchestrator.get_execution_logs().unwrap();
    assert_eq!(logs.len(), 13);
}
