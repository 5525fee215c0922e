//! Status Ledger Integration Tests
//!
//! Tests for upsert semantics, persistence across reopen, and listing order.

use dataops::core::StatusLedger;
use dataops::domain::UnitStatus;
use tempfile::TempDir;

#[test]
fn test_last_write_wins() {
    let ledger = StatusLedger::in_memory().unwrap();

    ledger
        .update_status("mvc_crash_trusted", UnitStatus::Executing, None)
        .unwrap();
    ledger
        .update_status("mvc_crash_trusted", UnitStatus::Failed, Some("boom"))
        .unwrap();

    let record = ledger.get_status("mvc_crash_trusted").unwrap().unwrap();
    assert_eq!(record.status, UnitStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("boom"));

    ledger
        .update_status("mvc_crash_trusted", UnitStatus::Done, None)
        .unwrap();
    let record = ledger.get_status("mvc_crash_trusted").unwrap().unwrap();
    assert_eq!(record.status, UnitStatus::Done);
    assert_eq!(record.error_message, None);

    // One record per unit
    assert_eq!(ledger.get_all_statuses().unwrap().len(), 1);
}

#[test]
fn test_unknown_unit_has_no_record() {
    let ledger = StatusLedger::in_memory().unwrap();
    assert!(ledger.get_status("never_ran").unwrap().is_none());
    assert!(ledger.get_all_statuses().unwrap().is_empty());
}

#[test]
fn test_records_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state").join("execution_log.db");

    {
        let ledger = StatusLedger::open(&path).unwrap();
        ledger.update_status("landing", UnitStatus::Done, None).unwrap();
        ledger
            .update_status("csv_formatted", UnitStatus::Failed, Some("bad csv"))
            .unwrap();
    }

    let reopened = StatusLedger::open(&path).unwrap();
    let records = reopened.get_all_statuses().unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.unit_name.as_str()).collect();
    assert_eq!(names, vec!["landing", "csv_formatted"]);
    assert!(records[0].is_done());
    assert_eq!(records[1].error_message.as_deref(), Some("bad csv"));
}

#[test]
fn test_timestamps_advance() {
    let ledger = StatusLedger::in_memory().unwrap();
    ledger.update_status("landing", UnitStatus::Executing, None).unwrap();
    let first = ledger.get_status("landing").unwrap().unwrap().last_execution;

    ledger.update_status("landing", UnitStatus::Done, None).unwrap();
    let second = ledger.get_status("landing").unwrap().unwrap().last_execution;

    assert!(second >= first);
}
