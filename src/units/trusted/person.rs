//! Motor vehicle collisions: persons involved.

use crate::config::CleaningSettings;
use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, DatasetError, Value};
use crate::units::ProcessingUnit;

use super::{impute, steps, SourceFilter, TrustedTemplate, TrustedUnit};

pub const UNIT_NAME: &str = "mvc_person_trusted";
pub const TABLE_NAME: &str = "mvc_person";

const KEEP: &[&str] = &[
    "unique_id",
    "collision_id",
    "person_id",
    "person_type",
    "person_injury",
    "vehicle_id",
    "person_age",
    "person_sex",
    "contributing_factor_1",
    "contributing_factor_2",
];

const SENTINELS: &[&str] = &["Does Not Apply", "Unknown", "None", "Unspecified"];

/// Identifiers never used as imputation features
const ID_COLUMNS: &[&str] = &["unique_id", "collision_id", "person_id", "vehicle_id"];

fn drop_insignificant(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.select(KEEP))
}

fn deduplicate(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.dedup_by(&["unique_id"]))
}

fn correct_categoricals(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(steps::null_sentinels(data, SENTINELS))
}

fn format(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let data = steps::one_hot_union(
        data,
        &["contributing_factor_1", "contributing_factor_2"],
        Some("factor"),
    )?;
    let data = steps::one_hot_column(data, "person_type", Some("person_type"), false)?;

    let injured: Option<Vec<Value>> = data.column("person_injury").map(|injury| {
        injury
            .iter()
            .map(|v| Value::Int(i64::from(!v.is_null())))
            .collect()
    });
    let data = match injured {
        Some(injured) => data
            .with_column("person_injured", injured)?
            .drop_columns(&["person_injury"]),
        None => data,
    };

    Ok(steps::to_integer(data, "person_age"))
}

fn handle_missing(data: Dataset, settings: &CleaningSettings) -> Result<Dataset, DatasetError> {
    if !data.has_column("person_age") || data.is_empty() {
        return Ok(data);
    }

    // Features: every numeric non-id column plus person_sex indicators
    let features = steps::one_hot_column(data.clone(), "person_sex", Some("person_sex"), true)?;
    let columns = steps::numeric_columns(&features, ID_COLUMNS);
    let Some(age_idx) = columns.iter().position(|c| c == "person_age") else {
        return Ok(data);
    };

    let imputed = impute::KnnImputer::new(settings.knn_neighbors)
        .fit_transform(&impute::to_matrix(&features, &columns));
    let ages = imputed
        .iter()
        .map(|row| row[age_idx].map(|a| Value::Int(a.round() as i64)).unwrap_or(Value::Null))
        .collect();

    data.with_column("person_age", ages)
}

/// Cleaning pipeline for person records
pub fn template() -> TrustedTemplate {
    TrustedTemplate::new(
        UNIT_NAME,
        TABLE_NAME,
        SourceFilter::Prefix("motor_vehicle_collisions_person_"),
    )
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
