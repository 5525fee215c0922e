//! Feature engineering: model-ready features from the analytical sandbox.
//!
//! Each unit derives numeric features from one sandbox table and splits the
//! result 80/20 into `<table>_train` and `<table>_test`. A row's side of the
//! split depends only on its ordinal, so reruns over the same input produce
//! the same split.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::CleaningSettings;
use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, DatasetError, Value};
use crate::store::SharedStore;
use crate::units::trusted::{impute, steps};

use super::exploitation::{ACCIDENT_TABLE, BRAND_TABLE};
use super::ProcessingUnit;

pub const BRANDS_UNIT_NAME: &str = "brands_feature_engineering";
pub const ACCIDENT_UNIT_NAME: &str = "accident_feature_engineering";

/// Percentage of rows that land in the training split
pub const TRAIN_PERCENT: u64 = 80;

const MAX_RATING: f64 = 5.0;

/// Inputs shared by every feature derivation
#[derive(Debug, Clone, Copy)]
pub struct FeatureContext {
    /// Year vehicle ages are measured against
    pub reference_year: i32,
    pub settings: CleaningSettings,
}

/// Derives the feature table from one sandbox table
pub type Engineer = fn(Dataset, &FeatureContext) -> Result<Dataset, DatasetError>;

/// Append `vehicle_age` from `vehicle_year`
fn with_vehicle_age(data: Dataset, reference_year: i32) -> Result<Dataset, DatasetError> {
    let Some(years) = data.column("vehicle_year") else {
        return Ok(data);
    };
    let ages = years
        .iter()
        .map(|y| match y.as_f64() {
            Some(year) => Value::Int(reference_year as i64 - year.round() as i64),
            None => Value::Null,
        })
        .collect();
    data.with_column("vehicle_age", ages)
}

/// Clip a rating to the NHTSA scale and round to half stars
pub fn clip_rating(rating: f64) -> f64 {
    (rating.clamp(0.0, MAX_RATING) * 2.0).round() / 2.0
}

/// Brand features: one indicator per make, vehicle age and normalized rating
pub fn brands(data: Dataset, ctx: &FeatureContext) -> Result<Dataset, DatasetError> {
    let data = with_vehicle_age(data, ctx.reference_year)?;
    let data = match data.column("overall_rating") {
        Some(ratings) => {
            let normalized = ratings
                .iter()
                .map(|r| {
                    r.as_f64()
                        .map(|r| Value::Float(r / MAX_RATING))
                        .unwrap_or(Value::Null)
                })
                .collect();
            data.with_column("norm_overall_rating", normalized)?
        }
        None => data,
    };

    let data = steps::drop_missing(
        data,
        &["vehicle_make", "vehicle_age", "norm_overall_rating"],
    );
    let data = steps::one_hot_column(data, "vehicle_make", Some("make"), false)?;
    let data = data.drop_columns(&["vehicle_year", "overall_rating"]);

    // Indicators first, then the two numeric features
    let mut order: Vec<String> = data
        .columns()
        .iter()
        .filter(|c| c.starts_with("make_"))
        .cloned()
        .collect();
    order.push("vehicle_age".into());
    order.push("norm_overall_rating".into());
    let refs: Vec<&str> = order.iter().map(String::as_str).collect();
    Ok(data.select(&refs))
}

/// Accident features: person and vehicle attributes with ratings imputed
pub fn accidents(data: Dataset, ctx: &FeatureContext) -> Result<Dataset, DatasetError> {
    let data = with_vehicle_age(data, ctx.reference_year)?
        .drop_columns(&["vehicle_year", "person_id"])
        .map_column("person_age", |v| match v.as_f64() {
            Some(age) if age == 0.0 => Value::Null,
            _ => v.clone(),
        })
        .map_column("overall_rating", |v| {
            v.as_f64()
                .map(|r| Value::Float(clip_rating(r)))
                .unwrap_or(Value::Null)
        });

    let data = impute_person_and_rating(data, ctx.settings.knn_neighbors)?;
    let data = steps::one_hot_column(data, "person_sex", Some("person_sex"), false)?;
    Ok(data.drop_columns(&["vehicle_make"]))
}

fn restore_age(age: f64) -> Value {
    Value::Int(age.round() as i64)
}

fn restore_rating(rating: f64) -> Value {
    Value::Float(clip_rating(rating))
}

fn impute_person_and_rating(data: Dataset, k: usize) -> Result<Dataset, DatasetError> {
    if data.is_empty() {
        return Ok(data);
    }

    let features = steps::one_hot_column(data.clone(), "person_sex", Some("person_sex"), true)?;
    let columns = steps::numeric_columns(&features, &[]);
    let imputed = impute::KnnImputer::new(k).fit_transform(&impute::to_matrix(&features, &columns));
    debug!(features = ?columns, k, "Imputing accident features");

    let mut data = data;
    for (j, column) in columns.iter().enumerate() {
        let restore: fn(f64) -> Value = match column.as_str() {
            "person_age" => restore_age,
            "overall_rating" => restore_rating,
            _ => continue,
        };
        let values = imputed
            .iter()
            .map(|row| row[j].map(restore).unwrap_or(Value::Null))
            .collect();
        data = data.with_column(column, values)?;
    }
    Ok(data)
}

/// Whether row `ordinal` belongs to the training split
pub fn is_train(ordinal: usize) -> bool {
    let digest = Sha256::digest((ordinal as u64).to_le_bytes());
    let mut bucket = [0u8; 8];
    bucket.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bucket) % 100 < TRAIN_PERCENT
}

/// Split into (train, test) by row ordinal
pub fn split(data: Dataset) -> Result<(Dataset, Dataset), DatasetError> {
    let (columns, rows) = data.into_parts();
    let (train, test): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .enumerate()
        .partition(|(i, _)| is_train(*i));
    let strip = |rows: Vec<(usize, Vec<Value>)>| rows.into_iter().map(|(_, r)| r).collect();
    Ok((
        Dataset::from_rows(columns.clone(), strip(train))?,
        Dataset::from_rows(columns, strip(test))?,
    ))
}

/// Engineers one sandbox table and writes its train/test split
pub struct FeatureUnit {
    name: &'static str,
    table: &'static str,
    engineer: Engineer,
    context: FeatureContext,
    source: SharedStore,
    target: SharedStore,
}

impl FeatureUnit {
    pub fn new(
        name: &'static str,
        table: &'static str,
        engineer: Engineer,
        source: SharedStore,
        target: SharedStore,
        settings: CleaningSettings,
    ) -> Self {
        Self {
            name,
            table,
            engineer,
            context: FeatureContext {
                reference_year: Utc::now().year(),
                settings,
            },
            source,
            target,
        }
    }

    /// Pin the year ages are measured against
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.context.reference_year = year;
        self
    }

    pub fn train_table(&self) -> String {
        format!("{}_train", self.table)
    }

    pub fn test_table(&self) -> String {
        format!("{}_test", self.table)
    }
}

pub fn build_brands(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (source, target, settings) = args.into_zone_to_zone(BRANDS_UNIT_NAME)?;
    Ok(Box::new(FeatureUnit::new(
        BRANDS_UNIT_NAME,
        BRAND_TABLE,
        brands,
        source,
        target,
        settings,
    )))
}

pub fn build_accident(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (source, target, settings) = args.into_zone_to_zone(ACCIDENT_UNIT_NAME)?;
    Ok(Box::new(FeatureUnit::new(
        ACCIDENT_UNIT_NAME,
        ACCIDENT_TABLE,
        accidents,
        source,
        target,
        settings,
    )))
}

#[async_trait]
impl ProcessingUnit for FeatureUnit {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self) -> Result<()> {
        let data = self
            .source
            .get_table(self.table)
            .with_context(|| format!("Reading {} from {}", self.table, self.source.label()))?;
        let features = (self.engineer)(data, &self.context)
            .with_context(|| format!("Feature engineering for {} failed", self.table))?;
        let (train, test) = split(features)?;

        self.target.replace_table(&self.train_table(), &train)?;
        self.target.replace_table(&self.test_table(), &test)?;
        info!(
            unit = self.name,
            table = self.table,
            train = train.len(),
            test = test.len(),
            "Wrote feature split"
        );
        Ok(())
    }
}
