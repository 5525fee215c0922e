//! Exploitation: join trusted datasets into analysis-ready tables.
//!
//! Both outputs attach the mean NHTSA overall rating of a vehicle's
//! (make, model year). Makes are compared case-insensitively; vehicles with no
//! rated counterpart keep a missing rating.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, Value};
use crate::store::{SharedStore, TableStore};
use crate::units::trusted::{person, safety_rating, vehicles};

use super::ProcessingUnit;

pub const BRAND_UNIT_NAME: &str = "brand_safety_exploitation";
pub const ACCIDENT_UNIT_NAME: &str = "accident_safety_exploitation";

pub const BRAND_TABLE: &str = "mvc_safety_rating_by_brand";
pub const ACCIDENT_TABLE: &str = "safety_rating_by_accidents";

/// Derives one exploitation table from the trusted zone
pub type Derive = fn(&dyn TableStore) -> Result<Dataset>;

/// Mean overall rating per (lower-cased make, model year)
pub struct RatingLookup {
    ratings: HashMap<(String, String), f64>,
}

impl RatingLookup {
    fn key(make: &Value, year: &Value) -> Option<(String, String)> {
        if make.is_null() || year.is_null() {
            return None;
        }
        Some((make.to_string().trim().to_lowercase(), year.key()))
    }

    /// Build from the trusted safety rating table
    pub fn from_ratings(ratings: &Dataset) -> Self {
        let mut sums: HashMap<(String, String), (f64, usize)> = HashMap::new();
        if let (Some(make), Some(year), Some(rating)) = (
            ratings.column_index("make"),
            ratings.column_index("model_year"),
            ratings.column_index("overall_rating"),
        ) {
            for row in ratings.rows() {
                let (Some(key), Some(value)) = (Self::key(&row[make], &row[year]), row[rating].as_f64())
                else {
                    continue;
                };
                let entry = sums.entry(key).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        Self {
            ratings: sums
                .into_iter()
                .map(|(k, (sum, n))| (k, sum / n as f64))
                .collect(),
        }
    }

    /// Rating for a vehicle, missing when unknown
    pub fn rating(&self, make: &Value, year: &Value) -> Value {
        Self::key(make, year)
            .and_then(|k| self.ratings.get(&k))
            .map(|r| Value::Float(*r))
            .unwrap_or(Value::Null)
    }
}

fn cell<'a>(data: &'a Dataset, row: usize, column: &str) -> &'a Value {
    data.get(row, column).unwrap_or(&Value::Null)
}

/// `vehicle_make, vehicle_year, overall_rating` per trusted vehicle
pub fn rating_by_brand(source: &dyn TableStore) -> Result<Dataset> {
    let vehicles = source.get_table(vehicles::TABLE_NAME)?;
    let lookup = RatingLookup::from_ratings(&source.get_table(safety_rating::TABLE_NAME)?);

    let mut out = Dataset::new(vec![
        "vehicle_make".into(),
        "vehicle_year".into(),
        "overall_rating".into(),
    ])?;
    for i in 0..vehicles.len() {
        let make = cell(&vehicles, i, "vehicle_make");
        let year = cell(&vehicles, i, "vehicle_year");
        out.push_row(vec![make.clone(), year.clone(), lookup.rating(make, year)])?;
    }
    Ok(out)
}

/// Persons joined to their vehicle and its rating
pub fn rating_by_accident(source: &dyn TableStore) -> Result<Dataset> {
    let persons = source.get_table(person::TABLE_NAME)?;
    let vehicles = source.get_table(vehicles::TABLE_NAME)?;
    let lookup = RatingLookup::from_ratings(&source.get_table(safety_rating::TABLE_NAME)?);

    // First vehicle row wins for a repeated vehicle_id
    let mut by_vehicle: HashMap<String, usize> = HashMap::new();
    for i in 0..vehicles.len() {
        let id = cell(&vehicles, i, "vehicle_id");
        if !id.is_null() {
            by_vehicle.entry(id.key()).or_insert(i);
        }
    }

    let mut out = Dataset::new(vec![
        "person_id".into(),
        "person_age".into(),
        "person_sex".into(),
        "vehicle_make".into(),
        "vehicle_year".into(),
        "overall_rating".into(),
    ])?;
    for i in 0..persons.len() {
        let vehicle_id = cell(&persons, i, "vehicle_id");
        let vehicle = if vehicle_id.is_null() {
            None
        } else {
            by_vehicle.get(&vehicle_id.key()).copied()
        };
        let (make, year) = match vehicle {
            Some(v) => (
                cell(&vehicles, v, "vehicle_make").clone(),
                cell(&vehicles, v, "vehicle_year").clone(),
            ),
            None => (Value::Null, Value::Null),
        };
        let rating = lookup.rating(&make, &year);
        out.push_row(vec![
            cell(&persons, i, "person_id").clone(),
            cell(&persons, i, "person_age").clone(),
            cell(&persons, i, "person_sex").clone(),
            make,
            year,
            rating,
        ])?;
    }
    Ok(out)
}

/// Writes one derived table into the exploitation zone
pub struct ExploitationUnit {
    name: &'static str,
    table: &'static str,
    derive: Derive,
    source: SharedStore,
    target: SharedStore,
}

impl ExploitationUnit {
    pub fn new(
        name: &'static str,
        table: &'static str,
        derive: Derive,
        source: SharedStore,
        target: SharedStore,
    ) -> Self {
        Self {
            name,
            table,
            derive,
            source,
            target,
        }
    }
}

/// Registry constructor for the by-brand table
pub fn build_brand(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (source, target, _) = args.into_zone_to_zone(BRAND_UNIT_NAME)?;
    Ok(Box::new(ExploitationUnit::new(
        BRAND_UNIT_NAME,
        BRAND_TABLE,
        rating_by_brand,
        source,
        target,
    )))
}

/// Registry constructor for the by-accident table
pub fn build_accident(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (source, target, _) = args.into_zone_to_zone(ACCIDENT_UNIT_NAME)?;
    Ok(Box::new(ExploitationUnit::new(
        ACCIDENT_UNIT_NAME,
        ACCIDENT_TABLE,
        rating_by_accident,
        source,
        target,
    )))
}

#[async_trait]
impl ProcessingUnit for ExploitationUnit {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self) -> Result<()> {
        let data = (self.derive)(self.source.as_ref())
            .with_context(|| format!("Failed to derive {}", self.table))?;
        self.target.replace_table(self.table, &data)?;
        info!(unit = self.name, table = self.table, rows = data.len(), "Wrote exploitation table");
        Ok(())
    }
}
