//! Trusted: the per-dataset cleaning pipeline.
//!
//! Every trusted dataset runs the same fixed sequence:
//!
//! 1. list its source tables in the formatted zone
//! 2. union all versions
//! 3. normalize column names
//! 4. drop insignificant columns
//! 5. de-duplicate on the natural key
//! 6. correct categorical values
//! 7. structural formatting
//! 8. handle missing values
//!
//! A dataset is described by a `TrustedTemplate`: steps 3 to 8 are function
//! slots defaulting to identity (snake_case for step 3), overridden per
//! dataset.

pub mod crash;
pub mod fuzzy;
pub mod impute;
pub mod person;
pub mod safety_rating;
pub mod steps;
pub mod vehicles;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::CleaningSettings;
use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, DatasetError};
use crate::store::{SharedStore, StoreError, TableStore};

use super::ProcessingUnit;

pub use steps::Step;

/// How a dataset picks its source tables from the formatted zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    Prefix(&'static str),
    Contains(&'static str),
}

impl SourceFilter {
    pub fn matches(&self, table: &str) -> bool {
        match self {
            SourceFilter::Prefix(p) => table.starts_with(p),
            SourceFilter::Contains(s) => table.contains(s),
        }
    }
}

/// A dataset's cleaning pipeline: identity plus one slot per step
#[derive(Clone, Copy)]
pub struct TrustedTemplate {
    pub unit_name: &'static str,
    pub table_name: &'static str,
    pub source: SourceFilter,
    pub normalize_columns: Step,
    pub drop_insignificant: Step,
    pub deduplicate: Step,
    pub correct_categoricals: Step,
    pub format: Step,
    pub handle_missing: Step,
}

impl TrustedTemplate {
    pub fn new(unit_name: &'static str, table_name: &'static str, source: SourceFilter) -> Self {
        Self {
            unit_name,
            table_name,
            source,
            normalize_columns: steps::snake_case_columns,
            drop_insignificant: steps::identity,
            deduplicate: steps::identity,
            correct_categoricals: steps::identity,
            format: steps::identity,
            handle_missing: steps::identity,
        }
    }

    pub fn normalize_columns(mut self, step: Step) -> Self {
        self.normalize_columns = step;
        self
    }

    pub fn drop_insignificant(mut self, step: Step) -> Self {
        self.drop_insignificant = step;
        self
    }

    pub fn deduplicate(mut self, step: Step) -> Self {
        self.deduplicate = step;
        self
    }

    pub fn correct_categoricals(mut self, step: Step) -> Self {
        self.correct_categoricals = step;
        self
    }

    pub fn format(mut self, step: Step) -> Self {
        self.format = step;
        self
    }

    pub fn handle_missing(mut self, step: Step) -> Self {
        self.handle_missing = step;
        self
    }

    /// Step 1: matching formatted tables, in store order
    pub fn list_source_tables(&self, store: &dyn TableStore) -> Result<Vec<String>, StoreError> {
        Ok(store
            .list_tables()?
            .into_iter()
            .filter(|t| self.source.matches(t))
            .collect())
    }

    /// Step 2: outer union of every version, null-filling drifted columns
    pub fn union_versions(
        &self,
        store: &dyn TableStore,
        tables: &[String],
    ) -> Result<Dataset, StoreError> {
        let mut parts = Vec::with_capacity(tables.len());
        for table in tables {
            parts.push(store.get_table(table)?);
        }

        if let Some(first) = parts.first() {
            for (table, part) in tables.iter().zip(&parts).skip(1) {
                if part.columns() != first.columns() {
                    warn!(
                        unit = self.unit_name,
                        %table,
                        "Source version has a different column set; null-filling"
                    );
                }
            }
        }

        Ok(Dataset::concat(parts))
    }

    /// Steps 3 to 8, in order
    pub fn clean(&self, data: Dataset, settings: &CleaningSettings) -> Result<Dataset, DatasetError> {
        let pipeline: [(&str, Step); 6] = [
            ("normalize_columns", self.normalize_columns),
            ("drop_insignificant", self.drop_insignificant),
            ("deduplicate", self.deduplicate),
            ("correct_categoricals", self.correct_categoricals),
            ("format", self.format),
            ("handle_missing", self.handle_missing),
        ];

        pipeline.into_iter().try_fold(data, |data, (name, step)| {
            let out = step(data, settings)?;
            debug!(unit = self.unit_name, step = name, rows = out.len(), "Step complete");
            Ok(out)
        })
    }
}

/// Runs one template from the formatted zone into the trusted zone
pub struct TrustedUnit {
    template: TrustedTemplate,
    source: SharedStore,
    target: SharedStore,
    settings: CleaningSettings,
}

impl TrustedUnit {
    pub fn new(
        template: TrustedTemplate,
        source: SharedStore,
        target: SharedStore,
        settings: CleaningSettings,
    ) -> Self {
        Self {
            template,
            source,
            target,
            settings,
        }
    }

    /// Build a boxed unit for the registry
    pub fn boxed(
        template: TrustedTemplate,
        args: UnitArgs,
    ) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
        let (source, target, settings) = args.into_zone_to_zone(template.unit_name)?;
        Ok(Box::new(Self::new(template, source, target, settings)))
    }

    /// Run the full pipeline without persisting
    pub fn run_steps(&self) -> Result<Option<Dataset>> {
        let tables = self.template.list_source_tables(self.source.as_ref())?;
        if tables.is_empty() {
            return Ok(None);
        }
        debug!(unit = self.template.unit_name, tables = ?tables, "Source tables");

        let union = self.template.union_versions(self.source.as_ref(), &tables)?;
        let cleaned = self
            .template
            .clean(union, &self.settings)
            .with_context(|| format!("Cleaning {} failed", self.template.table_name))?;
        Ok(Some(cleaned))
    }
}

#[async_trait]
impl ProcessingUnit for TrustedUnit {
    fn name(&self) -> &str {
        self.template.unit_name
    }

    async fn execute(&self) -> Result<()> {
        let Some(cleaned) = self.run_steps()? else {
            warn!(
                unit = self.template.unit_name,
                "No source tables found, nothing to clean"
            );
            return Ok(());
        };

        self.target.replace_table(self.template.table_name, &cleaned)?;
        info!(
            unit = self.template.unit_name,
            table = self.template.table_name,
            rows = cleaned.len(),
            "Wrote trusted table"
        );
        Ok(())
    }
}
