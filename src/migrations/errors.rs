//! # Migration Errors
//!
//! Every fatal condition of a migration run is one variant of
//! [`MigrationError`], carrying the version, script, table or database
//! involved. Conditions that are safe to ignore ("owner already exists",
//! "database does not exist" on drop) never reach this type.

use crate::core::DbError;
use crate::tables::TableGraphError;
use crate::version::VersionError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Coarse classification of a [`MigrationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Wrong or incomplete setup; retrying without changes will fail again
    Configuration,
    /// The database is not in a state the engine can work with
    Environment,
    /// A script or backend call failed; a later run may resume
    Execution,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "CONFIGURATION"),
            ErrorCategory::Environment => write!(f, "ENVIRONMENT"),
            ErrorCategory::Execution => write!(f, "EXECUTION"),
        }
    }
}

/// Migration error types
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("No schema script found for version {version}")]
    NoSchemaScript { version: String },

    #[error("Missing migration script from version {from} to version {to}")]
    MissingMigrationScript { from: String, to: String },

    #[error("Undefined database engine '{code}' (known engines: {known})")]
    UndefinedEngine { code: String, known: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] VersionError),

    #[error("Invalid configuration:\n{details}")]
    InvalidConfiguration { details: String },

    #[error("Migration script {path:?} already exists")]
    ScriptExists { path: PathBuf },

    #[error(
        "Cannot revert database '{database}' from version {current} to earlier version {target}"
    )]
    DowngradeAttempted {
        database: String,
        current: String,
        target: String,
    },

    #[error("Inconsistent database '{database}': {reason}")]
    InconsistentDatabase { database: String, reason: String },

    #[error("Database '{database}' is unreachable: {source}")]
    DatabaseUnreachable {
        database: String,
        #[source]
        source: DbError,
    },

    #[error("Script '{script}' failed: {source}{}", statement_context(.statement, .previous_statement))]
    ScriptFailed {
        script: String,
        statement: Option<String>,
        previous_statement: Option<String>,
        #[source]
        source: DbError,
    },

    #[error("Failed to {operation} database '{database}': {source}")]
    AdminFailed {
        operation: &'static str,
        database: String,
        #[source]
        source: DbError,
    },

    #[error("Version log {operation} failed on database '{database}': {source}")]
    VersionLogFailed {
        operation: &'static str,
        database: String,
        #[source]
        source: DbError,
    },

    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid dump folder {path:?}: {reason}")]
    InvalidDump { path: PathBuf, reason: String },

    #[error(transparent)]
    TableGraph(#[from] TableGraphError),

    #[error("Internal migration error: {message}")]
    Internal { message: String },
}

fn statement_context(statement: &Option<String>, previous: &Option<String>) -> String {
    let mut context = String::new();
    if let Some(statement) = statement {
        context.push_str(&format!("\n  failing statement: {}", statement));
    }
    if let Some(previous) = previous {
        context.push_str(&format!("\n  previous statement: {}", previous));
    }
    context
}

impl MigrationError {
    /// Which part of the error taxonomy this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoSchemaScript { .. }
            | Self::MissingMigrationScript { .. }
            | Self::UndefinedEngine { .. }
            | Self::InvalidVersion(_)
            | Self::InvalidConfiguration { .. }
            | Self::ScriptExists { .. }
            | Self::InvalidDump { .. } => ErrorCategory::Configuration,
            Self::DowngradeAttempted { .. }
            | Self::InconsistentDatabase { .. }
            | Self::DatabaseUnreachable { .. } => ErrorCategory::Environment,
            Self::ScriptFailed { .. }
            | Self::AdminFailed { .. }
            | Self::VersionLogFailed { .. }
            | Self::FileRead { .. }
            | Self::FileWrite { .. }
            | Self::TableGraph(_)
            | Self::Internal { .. } => ErrorCategory::Execution,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Failed admin call; a lost connection makes the database unreachable
    pub fn admin(operation: &'static str, database: impl Into<String>, source: DbError) -> Self {
        if source.is_connection_failure() {
            Self::DatabaseUnreachable {
                database: database.into(),
                source,
            }
        } else {
            Self::AdminFailed {
                operation,
                database: database.into(),
                source,
            }
        }
    }

    /// Failed version log call; a lost connection makes the database unreachable
    pub fn version_log(
        operation: &'static str,
        database: impl Into<String>,
        source: DbError,
    ) -> Self {
        if source.is_connection_failure() {
            Self::DatabaseUnreachable {
                database: database.into(),
                source,
            }
        } else {
            Self::VersionLogFailed {
                operation,
                database: database.into(),
                source,
            }
        }
    }
}

/// Full text of an error: its message followed by every underlying cause.
///
/// This is what gets stored in the version log for a failed script.
pub fn error_report(error: &(dyn std::error::Error + 'static)) -> String {
    let mut report = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        report.push_str("\nCaused by: ");
        report.push_str(&cause.to_string());
        source = cause.source();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_failed_message() {
        let err = MigrationError::ScriptFailed {
            script: "sql/postgresql/migration/migration-001-002.sql".to_string(),
            statement: Some("ALTER TABLE samples ADD COLUMN x".to_string()),
            previous_statement: Some("CREATE TABLE samples (id BIGINT)".to_string()),
            source: DbError::statement("42601", "syntax error at end of input"),
        };

        let msg = err.to_string();
        assert!(msg.contains("migration-001-002.sql"));
        assert!(msg.contains("failing statement: ALTER TABLE samples ADD COLUMN x"));
        assert!(msg.contains("previous statement: CREATE TABLE samples"));
        assert!(msg.contains("42601"));
        assert_eq!(err.category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_error_report_includes_causes() {
        let err = MigrationError::DatabaseUnreachable {
            database: "openbis_dev".to_string(),
            source: DbError::connection("connection refused"),
        };

        let report = error_report(&err);
        assert!(report.starts_with("Database 'openbis_dev' is unreachable"));
        assert!(report.contains("Caused by: Cannot connect to database: connection refused"));
        assert_eq!(err.category(), ErrorCategory::Environment);
    }

    #[test]
    fn test_configuration_category() {
        let err = MigrationError::MissingMigrationScript {
            from: "002".to_string(),
            to: "003".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(
            err.to_string(),
            "Missing migration script from version 002 to version 003"
        );
    }
}
