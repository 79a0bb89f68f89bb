//! # Migration State Tracking
//!
//! Every script execution leaves one row in the version log
//! (`database_version_logs`): inserted as `START` before the script runs,
//! updated to `SUCCESS` or `FAILED` afterwards. The most recent row tells
//! which version the database is at.

use super::errors::MigrationResult;
use crate::version::DatabaseVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the version log table
pub const VERSION_LOG_TABLE: &str = "database_version_logs";

/// Run status of one logged script execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Start,
    Success,
    Failed,
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Start => "START",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized values map to [`RunStatus::Unknown`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "START" => RunStatus::Start,
            "SUCCESS" => RunStatus::Success,
            "FAILED" => RunStatus::Failed,
            _ => RunStatus::Unknown,
        })
    }
}

/// One row of the version log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Version the script brings the database to
    pub version: String,

    /// Script name
    pub module_name: String,

    pub run_status: RunStatus,

    pub run_status_timestamp: DateTime<Utc>,

    /// Full script text, kept for audit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_code: Option<String>,

    /// Full error text, only for `FAILED` rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_exception: Option<String>,
}

impl LogEntry {
    /// The logged version, validated
    pub fn database_version(&self) -> MigrationResult<DatabaseVersion> {
        Ok(DatabaseVersion::parse(&self.version)?)
    }
}

/// Persistent store of the version log
pub trait VersionLogStore: Send + Sync {
    /// Whether the log table can be queried.
    ///
    /// `false` means the database or the log table does not exist, or the
    /// server cannot be reached. Any other failure is an error.
    fn can_connect(&self) -> MigrationResult<bool>;

    /// Row with the latest timestamp, `None` if the log is empty
    fn last_entry(&self) -> MigrationResult<Option<LogEntry>>;

    /// Latest `SUCCESS` row
    fn last_successful_entry(&self) -> MigrationResult<Option<LogEntry>>;

    /// All rows, oldest first
    fn entries(&self) -> MigrationResult<Vec<LogEntry>>;

    /// Insert a `START` row stamped with the current time
    fn log_start(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        module_code: &str,
    ) -> MigrationResult<()>;

    /// Mark the latest row for `(version, module_name)` as `SUCCESS`
    fn log_success(&self, version: &DatabaseVersion, module_name: &str) -> MigrationResult<()>;

    /// Mark the latest row for `(version, module_name)` as `FAILED`
    fn log_failure(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        failure: &str,
    ) -> MigrationResult<()>;
}

/// States of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// No usable database yet
    NotProvisioned,
    /// Database is at the target version
    UpToDate,
    /// Database is behind the target version
    NeedsMigration,
    /// Migration scripts are being applied
    Migrating,
    /// The run was aborted
    Failed,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationState::NotProvisioned => "not provisioned",
            MigrationState::UpToDate => "up to date",
            MigrationState::NeedsMigration => "needs migration",
            MigrationState::Migrating => "migrating",
            MigrationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trip_names() {
        for status in [RunStatus::Start, RunStatus::Success, RunStatus::Failed, RunStatus::Unknown] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert_eq!("garbage".parse::<RunStatus>().unwrap(), RunStatus::Unknown);
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry {
            version: "003".to_string(),
            module_name: "sql/postgresql/migration/migration-002-003.sql".to_string(),
            run_status: RunStatus::Success,
            run_status_timestamp: Utc::now(),
            module_code: None,
            run_exception: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["run_status"], "SUCCESS");
        assert!(json.get("run_exception").is_none());
        assert_eq!(
            entry.database_version().unwrap(),
            DatabaseVersion::parse("003").unwrap()
        );
    }
}
