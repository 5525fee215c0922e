//! Trusted Pipeline Integration Tests
//!
//! Tests for version union, de-duplication under row reordering, categorical
//! fallbacks, and hierarchical rating fill, run through the trusted units.

use std::sync::Arc;

use dataops::config::CleaningSettings;
use dataops::domain::{Dataset, Value};
use dataops::store::{MemoryTableStore, TableStore};
use dataops::units::trusted::fuzzy::weighted_ratio;
use dataops::units::trusted::{crash, person, safety_rating, vehicles, TrustedUnit};
use dataops::units::ProcessingUnit;

fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
    Dataset::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
}

fn crash_row(date: &str, injured: i64, factor: &str, id: i64) -> Vec<Value> {
    vec![
        date.into(),
        "10:15".into(),
        Value::Int(injured),
        factor.into(),
        Value::Int(id),
    ]
}

const CRASH_COLUMNS: &[&str] = &[
    "CRASH DATE",
    "CRASH TIME",
    "NUMBER OF PERSONS INJURED",
    "CONTRIBUTING FACTOR VEHICLE 1",
    "COLLISION_ID",
];

#[tokio::test]
async fn test_crash_versions_are_unioned_and_deduplicated() {
    let v1 = dataset(
        CRASH_COLUMNS,
        vec![
            crash_row("01/15/2024", 0, "Unspecified", 100),
            crash_row("01/15/2024", 1, "Illnes", 101),
        ],
    );
    // Later snapshot repeats collision 101 and carries an extra column
    let mut v2_columns = CRASH_COLUMNS.to_vec();
    v2_columns.push("BOROUGH");
    let v2 = dataset(
        &v2_columns,
        vec![
            {
                let mut row = crash_row("01/15/2024", 1, "Illnes", 101);
                row.push("QUEENS".into());
                row
            },
            {
                let mut row = crash_row("02/01/2024", 2, "Glare", 102);
                row.push("BRONX".into());
                row
            },
        ],
    );

    let formatted = Arc::new(
        MemoryTableStore::new("formatted")
            .with_table("motor_vehicle_collisions_crashes_20240115", v1)
            .with_table("motor_vehicle_collisions_crashes_20240201", v2)
            .with_table("motor_vehicle_collisions_person_20240115", dataset(&["X"], vec![])),
    );
    let trusted = Arc::new(MemoryTableStore::new("trusted"));
    let unit = TrustedUnit::new(
        crash::template(),
        formatted,
        trusted.clone(),
        CleaningSettings::default(),
    );
    unit.execute().await.unwrap();

    let out = trusted.get_table(crash::TABLE_NAME).unwrap();
    assert_eq!(out.len(), 3);
    assert!(!out.has_column("borough"));
    assert!(out.has_column("crash_datetime"));
    assert!(out.has_column("illness"));
    assert!(out.has_column("glare"));
    assert!(!out.has_column("unspecified"));

    let ids: Vec<&Value> = out.column("collision_id").unwrap();
    assert_eq!(ids, vec![&Value::Int(100), &Value::Int(101), &Value::Int(102)]);
}

#[tokio::test]
async fn test_rerun_replaces_trusted_table() {
    let formatted = Arc::new(MemoryTableStore::new("formatted").with_table(
        "motor_vehicle_collisions_crashes_20240115",
        dataset(CRASH_COLUMNS, vec![crash_row("01/15/2024", 0, "Glare", 100)]),
    ));
    let trusted = Arc::new(MemoryTableStore::new("trusted"));
    let unit = TrustedUnit::new(
        crash::template(),
        formatted,
        trusted.clone(),
        CleaningSettings::default(),
    );

    unit.execute().await.unwrap();
    unit.execute().await.unwrap();
    assert_eq!(trusted.get_table(crash::TABLE_NAME).unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_sources_is_not_an_error() {
    let trusted = Arc::new(MemoryTableStore::new("trusted"));
    let unit = TrustedUnit::new(
        person::template(),
        Arc::new(MemoryTableStore::new("formatted")),
        trusted.clone(),
        CleaningSettings::default(),
    );
    unit.execute().await.unwrap();
    assert!(trusted.list_tables().unwrap().is_empty());
}

fn person_rows() -> Vec<Vec<Value>> {
    let row = |uid: i64, age: Value, sex: &str| {
        vec![
            Value::Int(uid),
            Value::Int(500 + uid),
            format!("p{}", uid).into(),
            "Occupant".into(),
            Value::Null,
            Value::Int(7),
            age,
            sex.into(),
            "Unspecified".into(),
            Value::Null,
        ]
    };
    vec![
        row(1, Value::Int(30), "M"),
        row(2, Value::Int(41), "F"),
        row(1, Value::Int(30), "M"),
        row(3, Value::Null, "F"),
        row(4, Value::Int(25), "M"),
        row(2, Value::Int(41), "F"),
    ]
}

const PERSON_COLUMNS: &[&str] = &[
    "UNIQUE_ID",
    "COLLISION_ID",
    "PERSON_ID",
    "PERSON_TYPE",
    "PERSON_INJURY",
    "VEHICLE_ID",
    "PERSON_AGE",
    "PERSON_SEX",
    "CONTRIBUTING_FACTOR_1",
    "CONTRIBUTING_FACTOR_2",
];

fn sorted_keys(data: &Dataset, column: &str) -> Vec<String> {
    let mut keys: Vec<String> = data
        .column(column)
        .unwrap()
        .into_iter()
        .map(Value::key)
        .collect();
    keys.sort();
    keys
}

#[test]
fn test_row_order_does_not_change_deduplicated_output() {
    let settings = CleaningSettings::default();
    let forward = dataset(PERSON_COLUMNS, person_rows());
    let mut reversed_rows = person_rows();
    reversed_rows.reverse();
    let reversed = dataset(PERSON_COLUMNS, reversed_rows);

    let a = person::template().clean(forward, &settings).unwrap();
    let b = person::template().clean(reversed, &settings).unwrap();

    assert_eq!(a.len(), 4);
    assert_eq!(a.len(), b.len());
    assert_eq!(sorted_keys(&a, "unique_id"), sorted_keys(&b, "unique_id"));
    assert_eq!(a.columns(), b.columns());
}

fn vehicle_data(types: &[&str], makes: &[&str]) -> Dataset {
    let rows = types
        .iter()
        .zip(makes)
        .enumerate()
        .map(|(i, (t, m))| {
            vec![
                Value::Int(i as i64),
                "03/01/2024".into(),
                "7:45".into(),
                Value::Int(1000 + i as i64),
                (*t).into(),
                (*m).into(),
                Value::Int(2018),
            ]
        })
        .collect();
    dataset(
        &[
            "COLLISION_ID",
            "CRASH_DATE",
            "CRASH_TIME",
            "VEHICLE_ID",
            "VEHICLE_TYPE",
            "VEHICLE_MAKE",
            "VEHICLE_YEAR",
        ],
        rows,
    )
}

#[test]
fn test_low_confidence_match_falls_back_to_unknown() {
    // Nearest entry is a poor match
    assert!(weighted_ratio("sedxyz", "sedan") < 80.0);

    let out = vehicles::template()
        .clean(
            vehicle_data(&["sedxyz", "Ambulnce"], &["zzzzzz", "Toyot"]),
            &CleaningSettings::default(),
        )
        .unwrap();

    assert_eq!(out.get(0, "vehicle_type"), Some(&Value::from(vehicles::UNKNOWN_TYPE)));
    assert_eq!(out.get(0, "vehicle_make"), Some(&Value::from(vehicles::UNKNOWN_MAKE)));
    assert_eq!(out.get(1, "vehicle_type"), Some(&Value::from("Ambulance")));
    assert_eq!(out.get(1, "vehicle_make"), Some(&Value::from("Toyota")));
}

#[test]
fn test_cutoff_is_configurable() {
    let permissive = CleaningSettings {
        fuzzy_cutoff: 0.0,
        ..CleaningSettings::default()
    };
    let out = vehicles::template()
        .clean(vehicle_data(&["sedxyz"], &["zzzzzz"]), &permissive)
        .unwrap();
    assert_ne!(out.get(0, "vehicle_type"), Some(&Value::from(vehicles::UNKNOWN_TYPE)));
}

#[tokio::test]
async fn test_safety_rating_group_fill() {
    let columns = &["VehicleId", "Make", "Model", "ModelYear", "OverallRating", "RolloverRating"];
    let rows = vec![
        vec![Value::Int(1), "FORD".into(), "F150".into(), Value::Int(2020), "4".into(), Value::Null],
        vec![Value::Int(2), "FORD".into(), "F150".into(), Value::Int(2020), "5".into(), Value::Null],
        vec![
            Value::Int(3),
            "FORD".into(),
            "F150".into(),
            Value::Int(2020),
            "Not Rated".into(),
            "Not Rated".into(),
        ],
        vec![Value::Int(3), "FORD".into(), "F150".into(), Value::Int(2020), "1".into(), Value::Null],
    ];
    let formatted = Arc::new(
        MemoryTableStore::new("formatted")
            .with_table("nhtsa_safety_rating_20240115", dataset(columns, rows)),
    );
    let trusted = Arc::new(MemoryTableStore::new("trusted"));
    TrustedUnit::new(
        safety_rating::template(),
        formatted,
        trusted.clone(),
        CleaningSettings::default(),
    )
    .execute()
    .await
    .unwrap();

    let out = trusted.get_table(safety_rating::TABLE_NAME).unwrap();
    assert_eq!(
        out.columns(),
        &["vehicle_id", "make", "model", "model_year", "overall_rating"]
    );
    // Duplicate vehicle 3 dropped; its missing rating comes from (FORD, F150)
    assert_eq!(out.len(), 3);
    assert_eq!(out.get(2, "overall_rating"), Some(&Value::Float(4.5)));
}

#[test]
fn test_factor_case_variants_share_one_indicator() {
    let mut rows = person_rows();
    rows.truncate(2);
    rows[0][8] = "Cell Phone (hand-Held)".into();
    rows[1][8] = "Cell Phone (hand-held)".into();

    let out = person::template()
        .clean(dataset(PERSON_COLUMNS, rows), &CleaningSettings::default())
        .unwrap();

    let factors: Vec<&String> = out
        .columns()
        .iter()
        .filter(|c| c.starts_with("factor_"))
        .collect();
    assert_eq!(factors, vec!["factor_cell_phone_(hand-held)"]);
    assert_eq!(out.get(0, "factor_cell_phone_(hand-held)"), Some(&Value::Int(1)));
    assert_eq!(out.get(1, "factor_cell_phone_(hand-held)"), Some(&Value::Int(1)));
}
