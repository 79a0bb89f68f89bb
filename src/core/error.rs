//! Backend Error Types
//!
//! Every database backend reports failures as [`DbError`]. The engine never
//! looks at driver-specific errors; backend-specific meaning is recovered
//! from the SQLSTATE code by an [`ErrorClassifier`](crate::admin::ErrorClassifier).

use thiserror::Error;

/// Result type for raw backend calls
pub type DbResult<T> = Result<T, DbError>;

/// A failure reported by a database backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// The server could not be reached or the connection broke
    #[error("Cannot connect to database: {message}")]
    Connection { message: String },

    /// The server rejected a statement
    #[error("{message}{}", sql_state_suffix(.sql_state))]
    Statement {
        sql_state: Option<String>,
        message: String,
    },
}

fn sql_state_suffix(sql_state: &Option<String>) -> String {
    match sql_state {
        Some(code) => format!(" (SQLSTATE {})", code),
        None => String::new(),
    }
}

impl DbError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a statement error carrying a SQLSTATE code
    pub fn statement(sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Statement {
            sql_state: Some(sql_state.into()),
            message: message.into(),
        }
    }

    /// Create a statement error without SQLSTATE code
    pub fn other(message: impl Into<String>) -> Self {
        Self::Statement {
            sql_state: None,
            message: message.into(),
        }
    }

    /// SQLSTATE code, if the backend reported one
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Statement { sql_state, .. } => sql_state.as_deref(),
            Self::Connection { .. } => None,
        }
    }

    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
