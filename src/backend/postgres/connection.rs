//! Blocking access to a PostgreSQL server.
//!
//! Every unit of work opens one connection, runs to completion and closes
//! it again. The async `sqlx` calls are driven by a private current-thread
//! runtime so that the rest of the crate stays synchronous.

use crate::config::DatabaseConfigurationContext;
use crate::core::{DbError, DbResult};
use crate::migrations::{MigrationError, MigrationResult, SqlConnection, StatementFailure};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// Map a driver error onto [`DbError`], keeping the SQLSTATE code
pub fn map_sqlx_error(error: sqlx::Error) -> DbError {
    match error {
        sqlx::Error::Database(db_error) => match db_error.code() {
            Some(code) => DbError::statement(code.into_owned(), db_error.message()),
            None => DbError::other(db_error.message()),
        },
        sqlx::Error::Io(e) => DbError::connection(e.to_string()),
        sqlx::Error::Tls(e) => DbError::connection(e.to_string()),
        e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed) => {
            DbError::connection(e.to_string())
        }
        sqlx::Error::Protocol(message) => DbError::connection(message),
        other => DbError::other(other.to_string()),
    }
}

/// Connection settings of one database plus the runtime driving them
#[derive(Clone)]
pub struct PgSession {
    runtime: Arc<Runtime>,
    host: String,
    port: u16,
    database: String,
    owner: String,
    password: Option<String>,
    admin_user: String,
    admin_password: Option<String>,
    admin_database: String,
    connect_timeout: Duration,
}

impl PgSession {
    pub fn new(context: &DatabaseConfigurationContext) -> MigrationResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MigrationError::internal(format!("cannot start runtime: {}", e)))?;

        Ok(Self {
            runtime: Arc::new(runtime),
            host: context.host.clone(),
            port: context.port,
            database: context.database_name(),
            owner: context.owner.clone(),
            password: context.password.clone(),
            admin_user: context.admin_user.clone(),
            admin_password: context.admin_password.clone(),
            admin_database: context.admin_database.clone(),
            connect_timeout: Duration::from_secs(context.connect_timeout_secs),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn owner_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn url(&self) -> String {
        format!("postgresql://{}:{}/{}", self.host, self.port, self.database)
    }

    fn base_options(&self) -> PgConnectOptions {
        PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
    }

    /// Admin role on the admin database, for role and database management
    fn admin_options(&self) -> PgConnectOptions {
        let options = self
            .base_options()
            .username(&self.admin_user)
            .database(&self.admin_database);
        match &self.admin_password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    /// Owner role on the managed database
    fn owner_options(&self) -> PgConnectOptions {
        let options = self
            .base_options()
            .username(&self.owner)
            .database(&self.database);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    async fn connect(&self, options: PgConnectOptions) -> DbResult<PgConnection> {
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options)).await
        {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(DbError::connection(format!(
                "timed out after {}s connecting to {}:{}",
                self.connect_timeout.as_secs(),
                self.host,
                self.port
            ))),
        }
    }

    pub async fn connect_admin(&self) -> DbResult<PgConnection> {
        debug!(user = %self.admin_user, database = %self.admin_database, "connecting as admin");
        self.connect(self.admin_options()).await
    }

    pub async fn connect_owner(&self) -> DbResult<PgConnection> {
        debug!(user = %self.owner, database = %self.database, "connecting as owner");
        self.connect(self.owner_options()).await
    }

    /// Run `sql` on a fresh owner connection
    pub fn execute_as_owner(&self, sql: &str) -> DbResult<()> {
        self.block_on(async {
            let mut connection = self.connect_owner().await?;
            let result = sqlx::raw_sql(sql)
                .execute(&mut connection)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error);
            close(connection).await;
            result
        })
    }

    /// Run `sql` on a fresh admin connection
    pub fn execute_as_admin(&self, sql: &str) -> DbResult<()> {
        self.block_on(async {
            let mut connection = self.connect_admin().await?;
            let result = sqlx::raw_sql(sql)
                .execute(&mut connection)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error);
            close(connection).await;
            result
        })
    }
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("url", &self.url())
            .field("owner", &self.owner)
            .field("admin_user", &self.admin_user)
            .finish_non_exhaustive()
    }
}

/// Close `connection`, ignoring failures of the goodbye message
pub async fn close(connection: PgConnection) {
    if let Err(e) = connection.close().await {
        debug!(error = %e, "closing connection failed");
    }
}

/// [`SqlConnection`] executing scripts as the database owner
#[derive(Debug, Clone)]
pub struct PgSqlConnection {
    session: PgSession,
}

impl PgSqlConnection {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }
}

impl SqlConnection for PgSqlConnection {
    fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.session.execute_as_owner(sql)
    }

    fn execute_each(&self, statements: &[String]) -> Result<(), StatementFailure> {
        self.session.block_on(async {
            let mut connection = self
                .session
                .connect_owner()
                .await
                .map_err(|error| StatementFailure { index: 0, error })?;

            let mut outcome = Ok(());
            for (index, statement) in statements.iter().enumerate() {
                if let Err(e) = sqlx::raw_sql(statement).execute(&mut connection).await {
                    outcome = Err(StatementFailure {
                        index,
                        error: map_sqlx_error(e),
                    });
                    break;
                }
            }
            close(connection).await;
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url_and_names() {
        let mut context = DatabaseConfigurationContext::new("openbis");
        context.database_kind = Some("dev".to_string());
        context.host = "db.example.org".to_string();
        context.port = 6543;
        context.owner = "openbis".to_string();

        let session = PgSession::new(&context).unwrap();
        assert_eq!(session.url(), "postgresql://db.example.org:6543/openbis_dev");
        assert_eq!(session.database(), "openbis_dev");
        assert_eq!(session.owner(), "openbis");
        assert!(session.owner_password().is_none());
    }

    #[test]
    fn test_io_errors_are_connection_failures() {
        let error = map_sqlx_error(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(error.is_connection_failure());

        let error = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(!error.is_connection_failure());
        assert_eq!(error.sql_state(), None);
    }

    #[test]
    fn test_unreachable_server_is_connection_failure() {
        let mut context = DatabaseConfigurationContext::new("openbis");
        // Nothing listens on port 1 of the loopback interface.
        context.host = "127.0.0.1".to_string();
        context.port = 1;
        context.connect_timeout_secs = 2;

        let session = PgSession::new(&context).unwrap();
        let error = session.execute_as_admin("SELECT 1").unwrap_err();
        assert!(error.is_connection_failure());
    }
}
