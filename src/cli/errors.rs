//! CLI error type and exit codes.

use crate::migrations::{ErrorCategory, MigrationError};
use std::io;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code: 2 configuration, 3 environment, 4 execution, 1 other
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Migration(e) => match e.category() {
                ErrorCategory::Configuration => 2,
                ErrorCategory::Environment => 3,
                ErrorCategory::Execution => 4,
            },
            CliError::Output(_) | CliError::Serialize(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_categories() {
        let err = CliError::from(MigrationError::NoSchemaScript {
            version: "001".to_string(),
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "No schema script found for version 001");

        let err = CliError::from(MigrationError::DowngradeAttempted {
            database: "db".to_string(),
            current: "002".to_string(),
            target: "001".to_string(),
        });
        assert_eq!(err.exit_code(), 3);

        let err = CliError::from(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert_eq!(err.exit_code(), 1);
    }
}
