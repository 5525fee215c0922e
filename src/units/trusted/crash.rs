//! Motor vehicle collisions: crashes.

use crate::config::CleaningSettings;
use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, DatasetError, Value};
use crate::units::ProcessingUnit;

use super::{impute, steps, SourceFilter, TrustedTemplate, TrustedUnit};

pub const UNIT_NAME: &str = "mvc_crash_trusted";
pub const TABLE_NAME: &str = "mvc_crash";

const FACTOR_COLUMNS: [&str; 5] = [
    "contributing_factor_vehicle_1",
    "contributing_factor_vehicle_2",
    "contributing_factor_vehicle_3",
    "contributing_factor_vehicle_4",
    "contributing_factor_vehicle_5",
];

const KEEP: &[&str] = &[
    "crash_date",
    "crash_time",
    "number_of_persons_injured",
    "number_of_persons_killed",
    "number_of_pedestrians_injured",
    "number_of_pedestrians_killed",
    "number_of_cyclist_injured",
    "number_of_cyclist_killed",
    "number_of_motorist_injured",
    "number_of_motorist_killed",
    "contributing_factor_vehicle_1",
    "contributing_factor_vehicle_2",
    "contributing_factor_vehicle_3",
    "contributing_factor_vehicle_4",
    "contributing_factor_vehicle_5",
    "collision_id",
];

const CORRECTIONS: &[(&str, Option<&str>)] = &[
    ("1", None),
    ("80", None),
    ("Unspecified", None),
    ("Cell Phone (hand-Held)", Some("Cell Phone (hand-held)")),
    ("Drugs (Illegal)", Some("Drugs (illegal)")),
    ("Illnes", Some("Illness")),
    (
        "Reaction to Other Uninvolved Vehicle",
        Some("Reaction to Uninvolved Vehicle"),
    ),
];

const REQUIRED: &[&str] = &["collision_id", "crash_datetime"];

fn drop_insignificant(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.select(KEEP))
}

fn deduplicate(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data.dedup_by(&["collision_id"]))
}

fn correct_categoricals(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let data = steps::correct_values(data, &FACTOR_COLUMNS, CORRECTIONS);
    Ok(FACTOR_COLUMNS.iter().fold(data, |data, column| {
        data.map_column(column, |v| {
            if steps::is_digit_noise(v) {
                Value::Null
            } else {
                v.clone()
            }
        })
    }))
}

fn format(data: Dataset, _: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let data = steps::one_hot_union(data, &FACTOR_COLUMNS, None)?;
    steps::combine_datetime(data, "crash_date", "crash_time", "crash_datetime")
}

fn handle_missing(data: Dataset, settings: &CleaningSettings) -> Result<Dataset, DatasetError> {
    let data = steps::drop_missing(data, REQUIRED);
    let columns = steps::numeric_columns(&data, REQUIRED);
    impute::impute_columns(data, &columns, settings.knn_neighbors)
}

/// Cleaning pipeline for crash records
pub fn template() -> TrustedTemplate {
    TrustedTemplate::new(
        UNIT_NAME,
        TABLE_NAME,
        SourceFilter::Prefix("motor_vehicle_collisions_crashes_"),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> Dataset {
        let columns = [
            "CRASH DATE",
            "CRASH TIME",
            "BOROUGH",
            "NUMBER OF PERSONS INJURED",
            "CONTRIBUTING FACTOR VEHICLE 1",
            "CONTRIBUTING FACTOR VEHICLE 2",
            "COLLISION_ID",
        ];
        Dataset::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            vec![
                vec![
                    "01/15/2024".into(),
                    "9:30".into(),
                    "BROOKLYN".into(),
                    2i64.into(),
                    "Illnes".into(),
                    "Unspecified".into(),
                    100i64.into(),
                ],
                vec![
                    "01/15/2024".into(),
                    "9:30".into(),
                    "BROOKLYN".into(),
                    2i64.into(),
                    "Illnes".into(),
                    Value::Null,
                    100i64.into(),
                ],
                vec![
                    "01/16/2024".into(),
                    "14:00".into(),
                    "QUEENS".into(),
                    Value::Null,
                    80i64.into(),
                    "Driver Inattention/Distraction".into(),
                    101i64.into(),
                ],
                vec![
                    "not a date".into(),
                    "14:00".into(),
                    "QUEENS".into(),
                    1i64.into(),
                    Value::Null,
                    Value::Null,
                    102i64.into(),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_crash_pipeline() {
        let out = template().clean(raw(), &CleaningSettings::default()).unwrap();

        assert_eq!(
            out.columns(),
            &[
                "number_of_persons_injured",
                "collision_id",
                "driver_inattention/distraction",
                "illness",
                "crash_datetime"
            ]
        );
        // Duplicate collision 100 removed, unparseable date dropped
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, "illness"), Some(&Value::Int(1)));
        assert_eq!(out.get(1, "driver_inattention/distraction"), Some(&Value::Int(1)));
        // Injured count imputed from the only other row
        assert_eq!(out.get(1, "number_of_persons_injured"), Some(&Value::Float(2.0)));
    }
}
