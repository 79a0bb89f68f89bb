//! Version log in the `database_version_logs` table.

use super::connection::{close, map_sqlx_error, PgSession};
use crate::admin::{ErrorClassifier, SqlStateClassifier};
use crate::core::{DbError, DbResult};
use crate::migrations::{
    LogEntry, MigrationError, MigrationResult, RunStatus, VersionLogStore, VERSION_LOG_TABLE,
};
use crate::version::DatabaseVersion;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

type LogRow = (
    String,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<Vec<u8>>,
    Option<String>,
);

fn select_sql(filter: &str, order: &str, limit: &str) -> String {
    format!(
        "SELECT db_version, module_name, run_status, run_status_timestamp, module_code, run_exception \
         FROM {} {} ORDER BY run_status_timestamp {} {}",
        VERSION_LOG_TABLE, filter, order, limit
    )
}

fn entry_from_row(row: LogRow) -> LogEntry {
    let (version, module_name, run_status, timestamp, module_code, run_exception) = row;
    LogEntry {
        version,
        module_name: module_name.unwrap_or_default(),
        run_status: run_status
            .as_deref()
            .map(|s| s.parse().unwrap_or(RunStatus::Unknown))
            .unwrap_or(RunStatus::Unknown),
        run_status_timestamp: timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC),
        module_code: module_code.map(|code| String::from_utf8_lossy(&code).into_owned()),
        run_exception,
    }
}

/// [`VersionLogStore`] for PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresVersionLog {
    session: PgSession,
    classifier: SqlStateClassifier,
}

impl PostgresVersionLog {
    pub fn new(session: PgSession) -> Self {
        Self {
            session,
            classifier: SqlStateClassifier,
        }
    }

    /// Run `work` on a fresh owner connection
    fn with_connection<T>(
        &self,
        work: impl for<'c> FnOnce(
            &'c mut PgConnection,
        ) -> Pin<Box<dyn Future<Output = DbResult<T>> + 'c>>,
    ) -> DbResult<T> {
        self.session.block_on(async {
            let mut connection = self.session.connect_owner().await?;
            let result = work(&mut connection).await;
            close(connection).await;
            result
        })
    }

    fn fetch_entries(&self, sql: String) -> MigrationResult<Vec<LogEntry>> {
        self.with_connection(move |connection| {
            Box::pin(async move {
                let rows: Vec<LogRow> = sqlx::query_as(&sql)
                    .fetch_all(connection)
                    .await
                    .map_err(map_sqlx_error)?;
                Ok(rows.into_iter().map(entry_from_row).collect())
            })
        })
        .map_err(|e| MigrationError::version_log("read", self.session.database(), e))
    }

    fn update_latest(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        run_status: RunStatus,
        run_exception: Option<&str>,
    ) -> MigrationResult<()> {
        let sql = format!(
            "UPDATE {table} SET run_status = $1, run_status_timestamp = clock_timestamp(), \
             run_exception = $2 \
             WHERE ctid = (SELECT ctid FROM {table} WHERE db_version = $3 AND module_name = $4 \
             ORDER BY run_status_timestamp DESC LIMIT 1)",
            table = VERSION_LOG_TABLE
        );
        let version = version.to_string();
        let module = module_name.to_string();
        let exception = run_exception.map(str::to_string);

        self.with_connection(move |connection| {
            Box::pin(async move {
                let result = sqlx::query(&sql)
                    .bind(run_status.as_str())
                    .bind(exception)
                    .bind(&version)
                    .bind(&module)
                    .execute(connection)
                    .await
                    .map_err(map_sqlx_error)?;
                if result.rows_affected() == 0 {
                    return Err(DbError::other(format!(
                        "no log entry for module '{}' at version {}",
                        module, version
                    )));
                }
                Ok(())
            })
        })
        .map_err(|e| MigrationError::version_log("update", self.session.database(), e))
    }
}

impl VersionLogStore for PostgresVersionLog {
    fn can_connect(&self) -> MigrationResult<bool> {
        let sql = format!("SELECT 1 FROM {} LIMIT 1", VERSION_LOG_TABLE);
        let result = self.with_connection(move |connection| {
            Box::pin(async move {
                sqlx::raw_sql(&sql)
                    .execute(connection)
                    .await
                    .map(|_| ())
                    .map_err(map_sqlx_error)
            })
        });

        match result {
            Ok(()) => Ok(true),
            // Class 28: the owner role does not exist yet.
            Err(e)
                if e.is_connection_failure()
                    || e.sql_state().map_or(false, |s| s.starts_with("28"))
                    || self.classifier.is_database_missing(&e)
                    || self.classifier.is_relation_missing(&e) =>
            {
                debug!(database = self.session.database(), error = %e, "version log not reachable");
                Ok(false)
            }
            Err(e) => Err(MigrationError::version_log("query", self.session.database(), e)),
        }
    }

    fn last_entry(&self) -> MigrationResult<Option<LogEntry>> {
        Ok(self
            .fetch_entries(select_sql("", "DESC", "LIMIT 1"))?
            .into_iter()
            .next())
    }

    fn last_successful_entry(&self) -> MigrationResult<Option<LogEntry>> {
        Ok(self
            .fetch_entries(select_sql("WHERE run_status = 'SUCCESS'", "DESC", "LIMIT 1"))?
            .into_iter()
            .next())
    }

    fn entries(&self) -> MigrationResult<Vec<LogEntry>> {
        self.fetch_entries(select_sql("", "ASC", ""))
    }

    fn log_start(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        module_code: &str,
    ) -> MigrationResult<()> {
        let sql = format!(
            "INSERT INTO {} (db_version, module_name, run_status, run_status_timestamp, module_code) \
             VALUES ($1, $2, $3, clock_timestamp(), $4)",
            VERSION_LOG_TABLE
        );
        let version = version.to_string();
        let module = module_name.to_string();
        let code = module_code.as_bytes().to_vec();

        self.with_connection(move |connection| {
            Box::pin(async move {
                sqlx::query(&sql)
                    .bind(version)
                    .bind(module)
                    .bind(RunStatus::Start.as_str())
                    .bind(code)
                    .execute(connection)
                    .await
                    .map(|_| ())
                    .map_err(map_sqlx_error)
            })
        })
        .map_err(|e| MigrationError::version_log("insert", self.session.database(), e))
    }

    fn log_success(&self, version: &DatabaseVersion, module_name: &str) -> MigrationResult<()> {
        self.update_latest(version, module_name, RunStatus::Success, None)
    }

    fn log_failure(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        failure: &str,
    ) -> MigrationResult<()> {
        self.update_latest(version, module_name, RunStatus::Failed, Some(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql() {
        let sql = select_sql("WHERE run_status = 'SUCCESS'", "DESC", "LIMIT 1");
        assert!(sql.starts_with("SELECT db_version, module_name"));
        assert!(sql.contains("FROM database_version_logs WHERE run_status = 'SUCCESS'"));
        assert!(sql.ends_with("ORDER BY run_status_timestamp DESC LIMIT 1"));
    }

    #[test]
    fn test_entry_from_row() {
        let timestamp = Utc::now();
        let entry = entry_from_row((
            "002".to_string(),
            Some("migration-001-002.sql".to_string()),
            Some("FAILED".to_string()),
            Some(timestamp),
            Some(b"ALTER TABLE x".to_vec()),
            Some("boom".to_string()),
        ));
        assert_eq!(entry.version, "002");
        assert_eq!(entry.run_status, RunStatus::Failed);
        assert_eq!(entry.run_status_timestamp, timestamp);
        assert_eq!(entry.module_code.as_deref(), Some("ALTER TABLE x"));
        assert_eq!(entry.run_exception.as_deref(), Some("boom"));
    }

    #[test]
    fn test_entry_from_row_with_nulls() {
        let entry = entry_from_row(("001".to_string(), None, Some("weird".to_string()), None, None, None));
        assert_eq!(entry.run_status, RunStatus::Unknown);
        assert_eq!(entry.module_name, "");
        assert_eq!(entry.run_status_timestamp, DateTime::<Utc>::MIN_UTC);
    }
}
