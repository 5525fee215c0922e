//! Analytical sandbox: per-analysis slices of the exploitation zone.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::Dataset;
use crate::store::SharedStore;

use super::exploitation::{ACCIDENT_TABLE, BRAND_TABLE};
use super::ProcessingUnit;

pub const BRANDS_UNIT_NAME: &str = "brands_analytical_sandbox";
pub const ACCIDENT_UNIT_NAME: &str = "accident_analytical_sandbox";

const BRAND_COLUMNS: &[&str] = &["vehicle_make", "vehicle_year", "overall_rating"];

/// Shapes an exploitation table for one analysis
pub type Projection = fn(Dataset) -> Dataset;

pub fn brands(data: Dataset) -> Dataset {
    data.select(BRAND_COLUMNS)
}

pub fn accidents(data: Dataset) -> Dataset {
    data
}

/// Copies one exploitation table into the sandbox under the same name
pub struct SandboxUnit {
    name: &'static str,
    table: &'static str,
    project: Projection,
    source: SharedStore,
    target: SharedStore,
}

impl SandboxUnit {
    pub fn new(
        name: &'static str,
        table: &'static str,
        project: Projection,
        source: SharedStore,
        target: SharedStore,
    ) -> Self {
        Self {
            name,
            table,
            project,
            source,
            target,
        }
    }
}

pub fn build_brands(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (source, target, _) = args.into_zone_to_zone(BRANDS_UNIT_NAME)?;
    Ok(Box::new(SandboxUnit::new(
        BRANDS_UNIT_NAME,
        BRAND_TABLE,
        brands,
        source,
        target,
    )))
}

pub fn build_accident(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (source, target, _) = args.into_zone_to_zone(ACCIDENT_UNIT_NAME)?;
    Ok(Box::new(SandboxUnit::new(
        ACCIDENT_UNIT_NAME,
        ACCIDENT_TABLE,
        accidents,
        source,
        target,
    )))
}

#[async_trait]
impl ProcessingUnit for SandboxUnit {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self) -> Result<()> {
        let data = self
            .source
            .get_table(self.table)
            .with_context(|| format!("Reading {} from {}", self.table, self.source.label()))?;
        let data = (self.project)(data);
        self.target.replace_table(self.table, &data)?;
        info!(unit = self.name, table = self.table, rows = data.len(), "Wrote sandbox table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::Value;
    use crate::store::{MemoryTableStore, TableStore};

    fn exploitation() -> MemoryTableStore {
        MemoryTableStore::new("exploitation").with_table(
            BRAND_TABLE,
            Dataset::from_rows(
                vec![
                    "vehicle_id".into(),
                    "vehicle_make".into(),
                    "vehicle_year".into(),
                    "overall_rating".into(),
                ],
                vec![vec![
                    Value::Int(1),
                    "Ford".into(),
                    Value::Int(2020),
                    Value::Float(4.5),
                ]],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_brands_projection() {
        let target = Arc::new(MemoryTableStore::new("analytical_sandbox"));
        let unit = SandboxUnit::new(
            BRANDS_UNIT_NAME,
            BRAND_TABLE,
            brands,
            Arc::new(exploitation()),
            target.clone(),
        );
        unit.execute().await.unwrap();

        let out = target.get_table(BRAND_TABLE).unwrap();
        assert_eq!(out.columns(), BRAND_COLUMNS);
        assert_eq!(out.get(0, "vehicle_make"), Some(&Value::from("Ford")));
    }

    #[tokio::test]
    async fn test_missing_source_table_fails() {
        let unit = SandboxUnit::new(
            ACCIDENT_UNIT_NAME,
            ACCIDENT_TABLE,
            accidents,
            Arc::new(exploitation()),
            Arc::new(MemoryTableStore::new("analytical_sandbox")),
        );
        assert!(unit.execute().await.is_err());
    }
}
