//! Formatted Stage Integration Tests
//!
//! Tests for landing classification, table naming, and idempotent
//! materialization of landed files.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dataops::domain::{Dataset, Value};
use dataops::store::{MemoryTableStore, SqliteTableStore, StoreError, TableStore};
use dataops::units::formatted::{
    colliding_sibling, FormattedUnit, SourceFormat, CSV_UNIT_NAME, JSON_UNIT_NAME,
};
use dataops::units::landing::LandingUnit;
use dataops::units::ProcessingUnit;
use tempfile::TempDir;

/// Wraps a memory store and counts table creations
struct CountingStore {
    inner: MemoryTableStore,
    inserts: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryTableStore::new("formatted"),
            inserts: AtomicUsize::new(0),
        }
    }

    fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

impl TableStore for CountingStore {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn exists_table(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.exists_table(name)
    }

    fn get_table(&self, name: &str) -> Result<Dataset, StoreError> {
        self.inner.get_table(name)
    }

    fn insert_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_table(name, data)
    }

    fn replace_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError> {
        self.inner.replace_table(name, data)
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_tables()
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

const CRASHES_CSV: &str = "CRASH DATE,CRASH TIME,COLLISION_ID\n01/15/2024,9:30,100\n01/16/2024,14:00,101\n";

#[tokio::test]
async fn test_materialization_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let persistent = temp.path().join("persistent");
    write(
        &persistent.join("motor_vehicle_collisions/crashes/20240115.csv"),
        CRASHES_CSV,
    );

    let store = Arc::new(CountingStore::new());
    let unit = FormattedUnit::new(CSV_UNIT_NAME, SourceFormat::Csv, persistent.clone(), store.clone());

    unit.execute().await.unwrap();
    assert_eq!(store.inserts(), 1);

    // Second run over the same files creates nothing
    unit.execute().await.unwrap();
    assert_eq!(store.inserts(), 1);

    // Only the new file is picked up
    write(
        &persistent.join("motor_vehicle_collisions/crashes/20240201.csv"),
        CRASHES_CSV,
    );
    unit.execute().await.unwrap();
    assert_eq!(store.inserts(), 2);

    assert_eq!(
        store.list_tables().unwrap(),
        vec![
            "motor_vehicle_collisions_crashes_20240115",
            "motor_vehicle_collisions_crashes_20240201"
        ]
    );
    let table = store
        .get_table("motor_vehicle_collisions_crashes_20240115")
        .unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "COLLISION_ID"), Some(&Value::Int(100)));
}

#[tokio::test]
async fn test_json_results_layout() {
    let temp = TempDir::new().unwrap();
    let persistent = temp.path().join("persistent");
    write(
        &persistent.join("nhtsa/safety_rating/20240115.json"),
        r#"[{"Count": 1, "Results": [{"VehicleId": 7, "Make": "FORD", "OverallRating": "5"}]}]"#,
    );
    // CSV files are invisible to the JSON reader
    write(&persistent.join("other/file.csv"), CRASHES_CSV);

    let store = Arc::new(MemoryTableStore::new("formatted"));
    FormattedUnit::new(JSON_UNIT_NAME, SourceFormat::Json, persistent, store.clone())
        .execute()
        .await
        .unwrap();

    assert_eq!(store.list_tables().unwrap(), vec!["nhtsa_safety_rating_20240115"]);
    let table = store.get_table("nhtsa_safety_rating_20240115").unwrap();
    assert_eq!(table.get(0, "VehicleId"), Some(&Value::Int(7)));
    assert_eq!(table.get(0, "OverallRating"), Some(&Value::from("5")));
}

#[tokio::test]
async fn test_landing_then_formatted_on_sqlite() {
    let temp = TempDir::new().unwrap();
    let temporal = temp.path().join("temporal");
    let persistent = temp.path().join("persistent");
    write(
        &temporal.join("Motor_Vehicle_Collisions_-_Crashes_20240115.csv"),
        CRASHES_CSV,
    );
    write(&temporal.join("notes.txt"), "not data");

    LandingUnit::new(temporal.clone(), persistent.clone())
        .execute()
        .await
        .unwrap();
    assert!(persistent
        .join("motor_vehicle_collisions/crashes/20240115.csv")
        .exists());
    assert!(temporal.join("notes.txt").exists());

    let store = Arc::new(SqliteTableStore::open("formatted", &temp.path().join("formatted.db")).unwrap());
    FormattedUnit::new(CSV_UNIT_NAME, SourceFormat::Csv, persistent, store.clone())
        .execute()
        .await
        .unwrap();

    let table = store
        .get_table("motor_vehicle_collisions_crashes_20240115")
        .unwrap();
    assert_eq!(table.columns(), &["CRASH DATE", "CRASH TIME", "COLLISION_ID"]);
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn test_csv_and_json_with_same_stem_keep_first_table() {
    let temp = TempDir::new().unwrap();
    let persistent = temp.path().join("persistent");
    let csv = persistent.join("nhtsa/safety_rating/20240115.csv");
    let json = persistent.join("nhtsa/safety_rating/20240115.json");
    write(&csv, "VehicleId,Make\n1,FORD\n2,KIA\n");
    write(&json, r#"[{"VehicleId": 9, "Make": "BMW"}]"#);

    assert_eq!(colliding_sibling(&csv, SourceFormat::Csv), Some(json.clone()));
    assert_eq!(colliding_sibling(&json, SourceFormat::Json), Some(csv.clone()));

    let store = Arc::new(CountingStore::new());
    FormattedUnit::new(CSV_UNIT_NAME, SourceFormat::Csv, persistent.clone(), store.clone())
        .execute()
        .await
        .unwrap();
    FormattedUnit::new(JSON_UNIT_NAME, SourceFormat::Json, persistent, store.clone())
        .execute()
        .await
        .unwrap();

    assert_eq!(store.inserts(), 1);
    let table = store.get_table("nhtsa_safety_rating_20240115").unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "Make"), Some(&Value::from("FORD")));

    std::fs::remove_file(&json).unwrap();
    assert_eq!(colliding_sibling(&csv, SourceFormat::Csv), None);
}
