//! Command-line interface for dataops.
//!
//! Provides commands for running stages, listing the stage registry,
//! reading the execution ledger, and inspecting zone stores.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::core::{Orchestrator, PipelineLock, StageReport, StageRegistry};
use crate::domain::UnitStatus;
use crate::store::{SqliteTableStore, TableStore, Zone};

/// dataops - Medallion data pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "dataops")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one stage, or every stage in order
    Run {
        /// Stage name (runs all stages if omitted)
        stage: Option<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered stages and their units
    Stages,

    /// Show the latest status of every unit
    Logs {
        /// Only show failed units
        #[arg(long)]
        failed: bool,
    },

    /// List tables in a zone store
    Tables {
        /// Zone name (formatted, trusted, exploitation, analytical_sandbox, feature_engineering)
        zone: Zone,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { stage, json } => run(stage.as_deref(), json).await,
            Commands::Stages => list_stages(),
            Commands::Logs { failed } => show_logs(failed),
            Commands::Tables { zone } => list_tables(zone),
            Commands::Config => show_config(),
        }
    }
}

/// Run a stage (or all of them) while holding the pipeline lock
async fn run(stage: Option<&str>, json: bool) -> Result<()> {
    let cfg = config::load_config()?;
    let _lock = PipelineLock::acquire(&cfg.lock_path())?;
    let orchestrator = Orchestrator::from_config(&cfg)?;

    let failures = match stage {
        Some(name) => {
            let report = orchestrator.execute_stage(name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_stage(&report);
            }
            report.failed().count()
        }
        None => {
            let report = orchestrator.execute_all_stages().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Run {}", report.run_id);
                for stage in &report.stages {
                    print_stage(stage);
                }
            }
            report.failure_count()
        }
    };

    if failures > 0 {
        eprintln!("\n[{} unit(s) failed; see `dataops logs --failed`]", failures);
        std::process::exit(1);
    }
    Ok(())
}

fn print_stage(report: &StageReport) {
    println!("\n{}", report.stage);
    for outcome in &report.outcomes {
        match &outcome.error {
            Some(error) => println!("  {:<36} {:<10} {}", outcome.unit, outcome.status.as_str(), error),
            None => println!("  {:<36} {}", outcome.unit, outcome.status),
        }
    }
}

/// List the standard stage registry
fn list_stages() -> Result<()> {
    let registry = StageRegistry::standard();
    for (i, stage) in registry.stages().iter().enumerate() {
        println!("{}. {}", i + 1, stage.name);
        for unit in stage.unit_names() {
            println!("     {}", unit);
        }
    }
    Ok(())
}

/// Print the execution ledger
fn show_logs(failed_only: bool) -> Result<()> {
    let cfg = config::load_config()?;
    if !cfg.ledger_path().exists() {
        println!("No executions recorded yet");
        return Ok(());
    }
    let ledger = crate::core::StatusLedger::open(&cfg.ledger_path())?;
    let records: Vec<_> = ledger
        .get_all_statuses()?
        .into_iter()
        .filter(|r| !failed_only || r.status == UnitStatus::Failed)
        .collect();

    if records.is_empty() {
        println!("No matching executions");
        return Ok(());
    }

    println!("{:<36} {:<10} {:<26}", "UNIT", "STATUS", "LAST EXECUTION");
    println!("{}", "-".repeat(72));
    for record in records {
        println!(
            "{:<36} {:<10} {:<26}",
            record.unit_name,
            record.status.as_str(),
            record.last_execution.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(error) = &record.error_message {
            println!("    {}", error);
        }
    }
    Ok(())
}

/// List tables in one zone store
fn list_tables(zone: Zone) -> Result<()> {
    let cfg = config::load_config()?;
    let path = cfg.store_path(zone);
    if !path.exists() {
        println!("Zone '{}' has no store yet ({})", zone, path.display());
        return Ok(());
    }

    let store = SqliteTableStore::open(zone.as_str(), &path)?;
    let tables = store.list_tables()?;
    if tables.is_empty() {
        println!("No tables in {}", zone);
        return Ok(());
    }
    for table in tables {
        let rows = store.get_table(&table).map(|t| t.len()).unwrap_or(0);
        println!("{:<60} {:>10} rows", table, rows);
    }
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg: ResolvedConfig = config::load_config()?;

    println!("dataops configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Temporal:   {}", cfg.temporal_folder.display());
    println!("  Persistent: {}", cfg.persistent_folder.display());
    println!("  Ledger:     {}", cfg.ledger_path().display());
    println!("  Lock:       {}", cfg.lock_path().display());
    println!();
    println!("Zone stores:");
    for zone in Zone::ALL {
        println!("  {:<20} {}", zone.as_str(), cfg.store_path(zone).display());
    }
    println!();
    println!("Cleaning:");
    println!("  Fuzzy cutoff:  {}", cfg.cleaning.fuzzy_cutoff);
    println!("  KNN neighbors: {}", cfg.cleaning.knn_neighbors);

    Ok(())
}
