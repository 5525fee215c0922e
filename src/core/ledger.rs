//! Persistent execution-status ledger.
//!
//! One SQLite table, one row per processing unit. Every status update is an
//! upsert, so the ledger reflects only the most recent run of each unit.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::warn;

use crate::domain::{ExecutionRecord, UnitStatus};

/// Errors that can occur reading or writing the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger lock poisoned")]
    Poisoned,

    #[error("Corrupt ledger row for '{unit}': {reason}")]
    Corrupt { unit: String, reason: String },
}

/// SQLite-backed status ledger
pub struct StatusLedger {
    conn: Mutex<Connection>,
}

impl StatusLedger {
    /// Open (or create) the ledger database and ensure its schema
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let ledger = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    /// Open the ledger at `path`, degrading to an in-memory ledger when the
    /// file cannot be opened. Statuses are then lost at exit, but data
    /// processing goes ahead.
    pub fn open_or_in_memory(path: &Path) -> Result<Self, LedgerError> {
        match Self::open(path) {
            Ok(ledger) => Ok(ledger),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Status ledger unavailable, keeping statuses in memory");
                Self::in_memory()
            }
        }
    }

    /// Open a throwaway in-memory ledger
    pub fn in_memory() -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    /// Create the ledger table if it does not exist yet
    pub fn ensure_schema(&self) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS execution_log (
                unit_name TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                last_execution TEXT NOT NULL,
                error_message TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Upsert the record for `unit_name`; last write wins
    pub fn update_status(
        &self,
        unit_name: &str,
        status: UnitStatus,
        error_message: Option<&str>,
    ) -> Result<(), LedgerError> {
        let record = ExecutionRecord::new(unit_name, status, error_message.map(String::from));
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        conn.execute(
            "INSERT INTO execution_log (unit_name, status, last_execution, error_message)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (unit_name) DO UPDATE SET
                status = excluded.status,
                last_execution = excluded.last_execution,
                error_message = excluded.error_message",
            params![
                record.unit_name,
                record.status.as_str(),
                record.last_execution.to_rfc3339(),
                record.error_message,
            ],
        )?;
        Ok(())
    }

    /// Latest record for a unit, if it ever ran
    pub fn get_status(&self, unit_name: &str) -> Result<Option<ExecutionRecord>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let raw = conn
            .query_row(
                "SELECT unit_name, status, last_execution, error_message
                 FROM execution_log WHERE unit_name = ?1",
                params![unit_name],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Every record, in insertion order
    pub fn get_all_statuses(&self) -> Result<Vec<ExecutionRecord>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT unit_name, status, last_execution, error_message
             FROM execution_log ORDER BY rowid",
        )?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }
}

/// Row as stored, before parsing status and timestamp
struct RawRecord {
    unit_name: String,
    status: String,
    last_execution: String,
    error_message: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            unit_name: row.get(0)?,
            status: row.get(1)?,
            last_execution: row.get(2)?,
            error_message: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, LedgerError> {
        let status = self.status.parse::<UnitStatus>().map_err(|reason| LedgerError::Corrupt {
            unit: self.unit_name.clone(),
            reason,
        })?;
        let last_execution = DateTime::parse_from_rfc3339(&self.last_execution)
            .map_err(|e| LedgerError::Corrupt {
                unit: self.unit_name.clone(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        Ok(ExecutionRecord {
            unit_name: self.unit_name,
            status,
            last_execution,
            error_message: self.error_message,
        })
    }
}
