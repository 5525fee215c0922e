//! NHTSA safety ratings.
//!
//! Ratings arrive as camel-case API fields. Missing overall ratings are filled
//! hierarchically: the record's other ratings, then the (make, model) mean,
//! then the make mean.

use crate::config::CleaningSettings;
use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, DatasetError, Value};
use crate::units::ProcessingUnit;

use super::{steps, SourceFilter, TrustedTemplate, TrustedUnit};

pub const UNIT_NAME: &str = "nhtsa_safety_rating_trusted";
pub const TABLE_NAME: &str = "nhtsa_safety_rating";

const ID_COLUMNS: &[&str] = &["vehicle_id", "make", "model", "model_year"];
const OUTPUT: &[&str] = &["vehicle_id", "make", "model", "model_year", "overall_rating"];
const TARGET: &str = "overall_rating";

fn normalize_columns(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    data.rename_columns(steps::camel_to_snake)
}

fn rating_columns(data: &Dataset) -> Vec<String> {
    data.columns()
        .iter()
        .filter(|c| c.contains("rating"))
        .cloned()
        .collect()
}

fn drop_insignificant(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let mut keep: Vec<String> = ID_COLUMNS.iter().map(|c| c.to_string()).collect();
    keep.extend(rating_columns(&data));
    let refs: Vec<&str> = keep.iter().map(String::as_str).collect();
    Ok(data.select(&refs))
}

fn deduplicate(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.dedup_by(&["vehicle_id"]))
}

fn correct_categoricals(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(steps::null_sentinels(data, &["Not Rated"]))
}

fn format(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.move_to_front("vehicle_id"))
}

/// Fill missing targets from the mean of the target within each key group.
///
/// Rows whose key has a missing part are left alone.
fn fill_from_group(data: Dataset, keys: &[&str]) -> Result<Dataset, DatasetError> {
    let Some(target) = data.column_index(TARGET) else {
        return Ok(data);
    };
    let key_idx: Vec<usize> = keys.iter().filter_map(|k| data.column_index(k)).collect();
    if key_idx.len() != keys.len() {
        return Ok(data);
    }

    let means = data.group_means(keys, TARGET);
    let filled: Vec<Value> = data
        .rows()
        .iter()
        .map(|row| {
            if !row[target].is_null() || key_idx.iter().any(|&i| row[i].is_null()) {
                return row[target].clone();
            }
            let key: Vec<String> = key_idx.iter().map(|&i| row[i].key()).collect();
            means
                .get(&key)
                .map(|m| Value::Float(*m))
                .unwrap_or(Value::Null)
        })
        .collect();
    data.with_column(TARGET, filled)
}

/// Fill missing targets from the mean of the record's other rating columns
fn fill_from_other_ratings(data: Dataset) -> Result<Dataset, DatasetError> {
    let Some(target) = data.column_index(TARGET) else {
        return Ok(data);
    };
    let others: Vec<usize> = rating_columns(&data)
        .iter()
        .filter(|c| c.as_str() != TARGET)
        .filter_map(|c| data.column_index(c))
        .collect();

    let filled: Vec<Value> = data
        .rows()
        .iter()
        .map(|row| {
            if !row[target].is_null() {
                return row[target].clone();
            }
            let values: Vec<f64> = others.iter().filter_map(|&i| row[i].as_f64()).collect();
            if values.is_empty() {
                Value::Null
            } else {
                Value::Float(values.iter().sum::<f64>() / values.len() as f64)
            }
        })
        .collect();
    data.with_column(TARGET, filled)
}

fn handle_missing(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    if !data.has_column(TARGET) {
        return Ok(data.select(OUTPUT));
    }
    let data = steps::to_float(data, TARGET);
    let data = fill_from_other_ratings(data)?;
    let data = fill_from_group(data, &["make", "model"])?;
    let data = fill_from_group(data, &["make"])?;
    Ok(data.select(OUTPUT))
}

/// Cleaning pipeline for NHTSA safety ratings
pub fn template() -> TrustedTemplate {
    TrustedTemplate::new(
        UNIT_NAME,
        TABLE_NAME,
        SourceFilter::Prefix("nhtsa_safety_rating_"),
    )
    .normalize_columns(normalize_columns)
    .drop_insignificant(drop_insignificant)
    .deduplicate(deduplicate)
    .correct_categoricals(correct_categoricals)
    .format(format)
    .handle_missing(handle_missing)
}

/// Registry constructor
pub fn build(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    TrustedUnit::boxed(template(), args)
}
