//! Execution records kept in the status ledger.
//!
//! The ledger holds one record per processing unit and reflects only the
//! latest run of that unit, never its history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest known status of a processing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Registered but not started in this run
    Pending,

    /// Currently executing
    Executing,

    /// Finished successfully
    Done,

    /// Raised an error (message recorded alongside)
    Failed,
}

impl UnitStatus {
    /// Storage form used in the ledger table
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "executing" => Ok(Self::Executing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown unit status '{}'", other)),
        }
    }
}

/// The ledger row for one processing unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unit name (unique key)
    pub unit_name: String,

    /// Status set by the most recent update
    pub status: UnitStatus,

    /// When the status last changed
    pub last_execution: DateTime<Utc>,

    /// Error message, present only when `status` is `Failed`
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// Build a record stamped with the current time.
    ///
    /// Any error message is discarded unless the status is `Failed`.
    pub fn new(unit_name: impl Into<String>, status: UnitStatus, error: Option<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            status,
            last_execution: Utc::now(),
            error_message: error.filter(|_| status == UnitStatus::Failed),
        }
    }

    /// Whether the unit finished successfully
    pub fn is_done(&self) -> bool {
        self.status == UnitStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_storage_form() {
        for status in [
            UnitStatus::Pending,
            UnitStatus::Executing,
            UnitStatus::Done,
            UnitStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<UnitStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<UnitStatus>().is_err());
    }

    #[test]
    fn test_error_message_only_kept_for_failures() {
        let done = ExecutionRecord::new("unit", UnitStatus::Done, Some("ignored".into()));
        assert_eq!(done.error_message, None);

        let failed = ExecutionRecord::new("unit", UnitStatus::Failed, Some("boom".into()));
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }
}
