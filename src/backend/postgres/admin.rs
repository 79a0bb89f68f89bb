//! Role and database management on PostgreSQL.

use super::connection::{close, map_sqlx_error, PgSession};
use super::metadata;
use crate::admin::{
    discard_failed_restore, tolerate_existing_owner, tolerate_missing_database, DatabaseAdmin,
    SqlStateClassifier,
};
use crate::backend::dump::{DumpContents, TableDump};
use crate::core::{DbError, DbResult};
use crate::migrations::{MigrationError, MigrationResult, VERSION_LOG_TABLE};
use crate::script::Script;
use crate::tables::DatabaseDefinition;
use crate::version::DatabaseVersion;
use pg_escape::{quote_identifier, quote_literal};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// DDL of the version log table
pub fn version_log_table_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    db_version VARCHAR(20) NOT NULL,
    module_name VARCHAR(250),
    run_status VARCHAR(10),
    run_status_timestamp TIMESTAMP WITH TIME ZONE,
    module_code BYTEA,
    run_exception TEXT
)",
        VERSION_LOG_TABLE
    )
}

pub fn create_owner_sql(owner: &str, password: Option<&str>) -> String {
    let mut sql = format!("CREATE ROLE {} LOGIN", quote_identifier(owner));
    if let Some(password) = password {
        sql.push_str(&format!(" PASSWORD {}", quote_literal(password)));
    }
    sql
}

pub fn create_database_sql(database: &str, owner: &str) -> String {
    format!(
        "CREATE DATABASE {} WITH OWNER = {} ENCODING = 'UTF8' TEMPLATE = template0",
        quote_identifier(database),
        quote_identifier(owner)
    )
}

pub fn drop_database_sql(database: &str) -> String {
    format!("DROP DATABASE {}", quote_identifier(database))
}

/// Copy statement loading tab-separated text into `table`
pub fn copy_table_sql(table: &str) -> String {
    format!("COPY {} FROM STDIN", quote_identifier(table))
}

/// [`DatabaseAdmin`] for PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresAdmin {
    session: PgSession,
    classifier: SqlStateClassifier,
}

impl PostgresAdmin {
    pub fn new(session: PgSession) -> Self {
        Self {
            session,
            classifier: SqlStateClassifier,
        }
    }

    fn create_bare_database(&self) -> MigrationResult<()> {
        let database = self.session.database();
        self.session
            .execute_as_admin(&create_database_sql(database, self.session.owner()))
            .map_err(|e| MigrationError::admin("create", database, e))?;
        info!(database, owner = self.session.owner(), "created database");
        Ok(())
    }

    fn create_version_log_table(&self) -> MigrationResult<()> {
        self.session
            .execute_as_owner(&version_log_table_ddl())
            .map_err(|e| MigrationError::admin("create version log of", self.session.database(), e))
    }

    fn run_dump_script(&self, script: &Script) -> MigrationResult<()> {
        debug!(script = script.name(), "running dump script");
        self.session
            .execute_as_owner(script.code())
            .map_err(|e| MigrationError::ScriptFailed {
                script: script.name().to_string(),
                statement: None,
                previous_statement: None,
                source: e,
            })
    }

    /// Restore steps after the bare database exists
    fn load_dump(&self, dump: &DumpContents) -> MigrationResult<()> {
        self.run_dump_script(&dump.schema)?;
        if let Some(function) = &dump.function {
            self.run_dump_script(function)?;
        }
        self.load_tables(&dump.tables)?;
        if let Some(finish) = &dump.finish {
            self.run_dump_script(finish)?;
        }
        // Dumps usually carry the log table already.
        self.create_version_log_table()
    }

    fn load_tables(&self, tables: &[TableDump]) -> MigrationResult<()> {
        let mut contents = Vec::with_capacity(tables.len());
        for table in tables {
            let data = fs::read(&table.path).map_err(|e| MigrationError::FileRead {
                path: table.path.clone(),
                source: e,
            })?;
            contents.push((table, data));
        }

        let result: DbResult<()> = self.session.block_on(async {
            let mut connection = self.session.connect_owner().await?;
            let mut outcome = Ok(());
            for (table, data) in &contents {
                match copy_table(&mut connection, &table.table, data).await {
                    Ok(rows) => debug!(table = %table.table, rows, "loaded table data"),
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            close(connection).await;
            outcome
        });
        result.map_err(|e| MigrationError::admin("restore", self.session.database(), e))
    }
}

async fn copy_table(
    connection: &mut sqlx::PgConnection,
    table: &str,
    data: &[u8],
) -> DbResult<u64> {
    let mut copy = connection
        .copy_in_raw(&copy_table_sql(table))
        .await
        .map_err(map_sqlx_error)?;
    if let Err(e) = copy.send(data).await {
        let error = map_sqlx_error(e);
        if let Err(abort_error) = copy.abort(error.to_string()).await {
            debug!(error = %abort_error, "aborting copy failed");
        }
        return Err(error);
    }
    copy.finish().await.map_err(map_sqlx_error)
}

impl DatabaseAdmin for PostgresAdmin {
    fn database_name(&self) -> &str {
        self.session.database()
    }

    fn database_url(&self) -> String {
        self.session.url()
    }

    fn create_owner(&self) -> MigrationResult<()> {
        let owner = self.session.owner();
        let result = self
            .session
            .execute_as_admin(&create_owner_sql(owner, self.session.owner_password()));
        tolerate_existing_owner(result, &self.classifier, owner, self.session.database())
    }

    fn create_database(&self) -> MigrationResult<()> {
        self.create_bare_database()?;
        self.create_version_log_table()
    }

    fn drop_database(&self) -> MigrationResult<()> {
        let database = self.session.database();
        let result: DbResult<()> = self.session.block_on(async {
            let mut connection = self.session.connect_admin().await?;
            let terminated = sqlx::query(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = $1 AND pid <> pg_backend_pid()",
            )
            .bind(database)
            .execute(&mut connection)
            .await;
            if let Err(e) = terminated {
                debug!(database, error = %e, "terminating sessions failed");
            }
            let dropped = sqlx::raw_sql(&drop_database_sql(database))
                .execute(&mut connection)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error);
            close(connection).await;
            dropped
        });
        tolerate_missing_database(result, &self.classifier, database)
    }

    fn restore_from_dump(
        &self,
        dump_folder: &Path,
        version: &DatabaseVersion,
    ) -> MigrationResult<()> {
        let dump = DumpContents::read(dump_folder, version)?;
        info!(
            database = self.session.database(),
            folder = %dump_folder.display(),
            tables = dump.tables.len(),
            "restoring database from dump"
        );

        self.create_bare_database()?;
        self.load_dump(&dump)
            .map_err(|e| discard_failed_restore(self, e))
    }

    fn database_definition(&self) -> MigrationResult<DatabaseDefinition> {
        let database = self.session.database();
        let result: Result<DatabaseDefinition, DbError> = self.session.block_on(async {
            let mut connection = self.session.connect_owner().await?;
            let definition = metadata::introspect(&mut connection).await;
            close(connection).await;
            definition
        });
        result.map_err(|e| MigrationError::admin("introspect", database, e))
    }
}
