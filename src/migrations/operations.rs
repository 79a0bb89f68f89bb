//! # Script Execution
//!
//! [`SqlScriptExecutor`] runs a [`Script`] against a backend connection in
//! one of two modes:
//!
//! - **batch**: the whole script goes to the backend as one unit
//! - **single-step**: comments are stripped, the script is split into
//!   statements and each one is executed in textual order; a failure names
//!   the failing statement and the one before it
//!
//! The first failing statement aborts the script in both modes.

use super::errors::{MigrationError, MigrationResult};
use crate::core::DbError;
use crate::script::splitter::split_statements;
use crate::script::Script;
use std::sync::Arc;
use tracing::debug;

/// A statement that failed in a sequence run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFailure {
    /// Position of the failing statement
    pub index: usize,
    pub error: DbError,
}

/// Raw SQL access of a backend.
///
/// Each call acquires its own connection and releases it before returning.
pub trait SqlConnection: Send + Sync {
    /// Send `sql`, possibly holding many statements, as one unit
    fn execute_batch(&self, sql: &str) -> Result<(), DbError>;

    /// Execute `statements` one by one on one connection, stopping at the
    /// first failure
    fn execute_each(&self, statements: &[String]) -> Result<(), StatementFailure>;
}

/// Executes scripts
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, script: &Script) -> MigrationResult<()>;
}

/// [`ScriptExecutor`] on top of a [`SqlConnection`]
#[derive(Clone)]
pub struct SqlScriptExecutor {
    connection: Arc<dyn SqlConnection>,
    single_step_mode: bool,
}

impl SqlScriptExecutor {
    pub fn new(connection: Arc<dyn SqlConnection>, single_step_mode: bool) -> Self {
        Self {
            connection,
            single_step_mode,
        }
    }

    pub fn is_single_step_mode(&self) -> bool {
        self.single_step_mode
    }

    fn execute_single_step(&self, script: &Script) -> MigrationResult<()> {
        let statements = split_statements(script.code());
        debug!(script = script.name(), statements = statements.len(), "executing script step by step");

        self.connection
            .execute_each(&statements)
            .map_err(|failure| MigrationError::ScriptFailed {
                script: script.name().to_string(),
                statement: statements.get(failure.index).cloned(),
                previous_statement: failure
                    .index
                    .checked_sub(1)
                    .and_then(|i| statements.get(i).cloned()),
                source: failure.error,
            })
    }
}

impl std::fmt::Debug for SqlScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlScriptExecutor")
            .field("single_step_mode", &self.single_step_mode)
            .finish_non_exhaustive()
    }
}

impl ScriptExecutor for SqlScriptExecutor {
    fn execute(&self, script: &Script) -> MigrationResult<()> {
        if self.single_step_mode {
            return self.execute_single_step(script);
        }

        debug!(script = script.name(), "executing script as batch");
        self.connection
            .execute_batch(script.code())
            .map_err(|e| MigrationError::ScriptFailed {
                script: script.name().to_string(),
                statement: None,
                previous_statement: None,
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::DatabaseVersion;
    use std::sync::Mutex;

    /// Records what it is asked to run; fails statements containing "BROKEN"
    #[derive(Default)]
    struct RecordingConnection {
        batches: Mutex<Vec<String>>,
        statements: Mutex<Vec<String>>,
    }

    impl SqlConnection for RecordingConnection {
        fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
            self.batches.lock().unwrap().push(sql.to_string());
            if sql.contains("BROKEN") {
                return Err(DbError::statement("42601", "syntax error"));
            }
            Ok(())
        }

        fn execute_each(&self, statements: &[String]) -> Result<(), StatementFailure> {
            for (index, statement) in statements.iter().enumerate() {
                if statement.contains("BROKEN") {
                    return Err(StatementFailure {
                        index,
                        error: DbError::statement("42601", "syntax error"),
                    });
                }
                self.statements.lock().unwrap().push(statement.clone());
            }
            Ok(())
        }
    }

    fn script(code: &str) -> Script {
        Script::new("sql/generic/001/schema-001.sql", code, DatabaseVersion::parse("001").unwrap())
    }

    #[test]
    fn test_batch_mode_sends_whole_script() {
        let connection = Arc::new(RecordingConnection::default());
        let executor = SqlScriptExecutor::new(connection.clone(), false);

        executor.execute(&script("CREATE TABLE a (id INT); -- x\nCREATE TABLE b (id INT);")).unwrap();

        let batches = connection.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].contains("-- x"));
        assert!(connection.statements.lock().unwrap().is_empty());
    }

    #[test]
    fn test_single_step_mode_runs_statements_in_order() {
        let connection = Arc::new(RecordingConnection::default());
        let executor = SqlScriptExecutor::new(connection.clone(), true);

        executor
            .execute(&script("-- comment\nCREATE TABLE a (id INT);\nINSERT INTO a VALUES (1);\n"))
            .unwrap();

        assert_eq!(
            *connection.statements.lock().unwrap(),
            vec!["CREATE TABLE a (id INT)", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn test_single_step_failure_reports_statement_and_predecessor() {
        let connection = Arc::new(RecordingConnection::default());
        let executor = SqlScriptExecutor::new(connection.clone(), true);

        let err = executor
            .execute(&script("CREATE TABLE a (id INT);\nBROKEN STATEMENT;\nCREATE TABLE c (id INT);"))
            .unwrap_err();

        match err {
            MigrationError::ScriptFailed {
                script,
                statement,
                previous_statement,
                source,
            } => {
                assert_eq!(script, "sql/generic/001/schema-001.sql");
                assert_eq!(statement.as_deref(), Some("BROKEN STATEMENT"));
                assert_eq!(previous_statement.as_deref(), Some("CREATE TABLE a (id INT)"));
                assert_eq!(source.sql_state(), Some("42601"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The statement after the failure never ran.
        assert_eq!(connection.statements.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_single_step_failure_on_first_statement_has_no_predecessor() {
        let connection = Arc::new(RecordingConnection::default());
        let executor = SqlScriptExecutor::new(connection, true);

        let err = executor.execute(&script("BROKEN;")).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::ScriptFailed { previous_statement: None, .. }
        ));
    }

    #[test]
    fn test_batch_failure_names_script() {
        let connection = Arc::new(RecordingConnection::default());
        let executor = SqlScriptExecutor::new(connection, false);

        let err = executor.execute(&script("BROKEN;")).unwrap_err();
        assert!(err.to_string().contains("schema-001.sql"));
    }
}
