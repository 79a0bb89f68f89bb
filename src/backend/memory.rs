//! In-process backend.
//!
//! [`InMemoryServer`] plays the part of a database server: it knows roles,
//! databases, their version logs and every SQL text sent to them. SQL is
//! recorded, not interpreted. Tests inject failures with
//! [`InMemoryServer::fail_statements_containing`] and take the server down
//! with [`InMemoryServer::set_unreachable`].

use super::dump::DumpContents;
use super::{DaoFactory, DatabaseEngine};
use crate::admin::{
    discard_failed_restore, tolerate_existing_owner, tolerate_missing_database, DatabaseAdmin,
    SqlStateClassifier, DUPLICATE_OBJECT, INVALID_CATALOG_NAME,
};
use crate::config::DatabaseConfigurationContext;
use crate::core::{DbError, DbResult};
use crate::migrations::{
    LogEntry, MigrationError, MigrationResult, RunStatus, ScriptExecutor, SqlConnection,
    SqlScriptExecutor, StatementFailure, VersionLogStore,
};
use crate::script::Script;
use crate::tables::DatabaseDefinition;
use crate::version::DatabaseVersion;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Engine code of the in-memory backend
pub const MEMORY_ENGINE_CODE: &str = "memory";

/// SQLSTATE reported for injected statement failures (syntax_error)
pub const INJECTED_FAILURE: &str = "42601";

/// SQLSTATE: duplicate_database
const DUPLICATE_DATABASE: &str = "42P04";

#[derive(Debug, Default)]
struct DatabaseState {
    owner: String,
    version_log: Vec<LogEntry>,
    executed_sql: Vec<String>,
    log_writes: usize,
    restored_from: Option<PathBuf>,
    restored_rows: BTreeMap<String, usize>,
    definition: DatabaseDefinition,
}

#[derive(Debug, Default)]
struct ServerState {
    owners: BTreeSet<String>,
    databases: BTreeMap<String, DatabaseState>,
    failing_patterns: Vec<String>,
    unreachable: bool,
}

impl ServerState {
    fn check_reachable(&self) -> DbResult<()> {
        if self.unreachable {
            Err(DbError::connection("in-memory server is down"))
        } else {
            Ok(())
        }
    }

    fn database(&self, name: &str) -> DbResult<&DatabaseState> {
        self.check_reachable()?;
        self.databases.get(name).ok_or_else(|| missing_database(name))
    }

    fn database_mut(&mut self, name: &str) -> DbResult<&mut DatabaseState> {
        self.check_reachable()?;
        self.databases
            .get_mut(name)
            .ok_or_else(|| missing_database(name))
    }

    fn injected_failure(&self, sql: &str) -> Option<DbError> {
        self.failing_patterns
            .iter()
            .find(|pattern| sql.contains(pattern.as_str()))
            .map(|pattern| {
                DbError::statement(
                    INJECTED_FAILURE,
                    format!("injected failure on statement containing '{}'", pattern),
                )
            })
    }
}

fn missing_database(name: &str) -> DbError {
    DbError::statement(
        INVALID_CATALOG_NAME,
        format!("database \"{}\" does not exist", name),
    )
}

/// Shared state of an in-memory "server"; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryServer {
    state: Arc<RwLock<ServerState>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ServerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every SQL text containing `pattern` fail
    pub fn fail_statements_containing(&self, pattern: impl Into<String>) {
        self.write().failing_patterns.push(pattern.into());
    }

    pub fn clear_failures(&self) {
        self.write().failing_patterns.clear();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.write().unreachable = unreachable;
    }

    pub fn has_owner(&self, owner: &str) -> bool {
        self.read().owners.contains(owner)
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.read().databases.contains_key(database)
    }

    pub fn database_owner(&self, database: &str) -> Option<String> {
        self.read().databases.get(database).map(|db| db.owner.clone())
    }

    /// Version log rows in insertion order
    pub fn version_log(&self, database: &str) -> Vec<LogEntry> {
        self.read()
            .databases
            .get(database)
            .map(|db| db.version_log.clone())
            .unwrap_or_default()
    }

    /// SQL texts that ran successfully, in order
    pub fn executed_sql(&self, database: &str) -> Vec<String> {
        self.read()
            .databases
            .get(database)
            .map(|db| db.executed_sql.clone())
            .unwrap_or_default()
    }

    /// Number of inserts and updates on the version log
    pub fn log_writes(&self, database: &str) -> usize {
        self.read()
            .databases
            .get(database)
            .map(|db| db.log_writes)
            .unwrap_or(0)
    }

    pub fn restored_from(&self, database: &str) -> Option<PathBuf> {
        self.read()
            .databases
            .get(database)
            .and_then(|db| db.restored_from.clone())
    }

    /// Rows loaded per table by a dump restore
    pub fn restored_rows(&self, database: &str) -> BTreeMap<String, usize> {
        self.read()
            .databases
            .get(database)
            .map(|db| db.restored_rows.clone())
            .unwrap_or_default()
    }

    /// Table graph returned by introspection of `database`
    pub fn set_database_definition(&self, database: &str, definition: DatabaseDefinition) {
        if let Some(db) = self.write().databases.get_mut(database) {
            db.definition = definition;
        }
    }
}

/// Engine backed by an [`InMemoryServer`]
#[derive(Debug, Clone)]
pub struct InMemoryEngine {
    server: InMemoryServer,
}

impl InMemoryEngine {
    pub fn new(server: InMemoryServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &InMemoryServer {
        &self.server
    }
}

impl DatabaseEngine for InMemoryEngine {
    fn code(&self) -> &str {
        MEMORY_ENGINE_CODE
    }

    fn dao_factory(
        &self,
        context: &DatabaseConfigurationContext,
    ) -> MigrationResult<Box<dyn DaoFactory>> {
        Ok(Box::new(InMemoryDaoFactory::new(
            self.server.clone(),
            context,
        )))
    }
}

/// DAOs of one in-memory database
pub struct InMemoryDaoFactory {
    admin: InMemoryAdmin,
    version_log: InMemoryVersionLog,
    executor: SqlScriptExecutor,
}

impl InMemoryDaoFactory {
    pub fn new(server: InMemoryServer, context: &DatabaseConfigurationContext) -> Self {
        let database = context.database_name();
        let connection = Arc::new(InMemoryConnection {
            server: server.clone(),
            database: database.clone(),
        });
        Self {
            admin: InMemoryAdmin {
                server: server.clone(),
                database: database.clone(),
                owner: context.owner.clone(),
                connection: connection.clone(),
                classifier: SqlStateClassifier,
            },
            version_log: InMemoryVersionLog { server, database },
            executor: SqlScriptExecutor::new(connection, context.script_single_step_mode),
        }
    }
}

impl DaoFactory for InMemoryDaoFactory {
    fn admin(&self) -> &dyn DatabaseAdmin {
        &self.admin
    }

    fn version_log(&self) -> &dyn VersionLogStore {
        &self.version_log
    }

    fn script_executor(&self) -> &dyn ScriptExecutor {
        &self.executor
    }
}

/// Raw SQL access to one in-memory database
#[derive(Debug, Clone)]
pub struct InMemoryConnection {
    server: InMemoryServer,
    database: String,
}

impl SqlConnection for InMemoryConnection {
    fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        let mut state = self.server.write();
        if let Some(error) = state.injected_failure(sql) {
            state.database(&self.database)?;
            return Err(error);
        }
        state.database_mut(&self.database)?.executed_sql.push(sql.to_string());
        Ok(())
    }

    fn execute_each(&self, statements: &[String]) -> Result<(), StatementFailure> {
        for (index, statement) in statements.iter().enumerate() {
            self.execute_batch(statement)
                .map_err(|error| StatementFailure { index, error })?;
        }
        Ok(())
    }
}

struct InMemoryAdmin {
    server: InMemoryServer,
    database: String,
    owner: String,
    connection: Arc<InMemoryConnection>,
    classifier: SqlStateClassifier,
}

impl InMemoryAdmin {
    fn insert_owner(&self) -> DbResult<()> {
        let mut state = self.server.write();
        state.check_reachable()?;
        if !state.owners.insert(self.owner.clone()) {
            return Err(DbError::statement(
                DUPLICATE_OBJECT,
                format!("role \"{}\" already exists", self.owner),
            ));
        }
        Ok(())
    }

    fn insert_database(&self) -> DbResult<()> {
        let mut state = self.server.write();
        state.check_reachable()?;
        if state.databases.contains_key(&self.database) {
            return Err(DbError::statement(
                DUPLICATE_DATABASE,
                format!("database \"{}\" already exists", self.database),
            ));
        }
        state.databases.insert(
            self.database.clone(),
            DatabaseState {
                owner: self.owner.clone(),
                ..DatabaseState::default()
            },
        );
        Ok(())
    }

    fn remove_database(&self) -> DbResult<()> {
        let mut state = self.server.write();
        state.check_reachable()?;
        state
            .databases
            .remove(&self.database)
            .map(|_| ())
            .ok_or_else(|| missing_database(&self.database))
    }

    fn run_dump_script(&self, script: &Script) -> MigrationResult<()> {
        self.connection
            .execute_batch(script.code())
            .map_err(|e| MigrationError::ScriptFailed {
                script: script.name().to_string(),
                statement: None,
                previous_statement: None,
                source: e,
            })
    }

    /// Everything after database creation; the caller drops the database on failure
    fn load_dump(&self, dump: &DumpContents, dump_folder: &Path) -> MigrationResult<()> {
        self.run_dump_script(&dump.schema)?;
        if let Some(function) = &dump.function {
            self.run_dump_script(function)?;
        }

        let mut rows = BTreeMap::new();
        for table in &dump.tables {
            let content = fs::read_to_string(&table.path).map_err(|e| MigrationError::FileRead {
                path: table.path.clone(),
                source: e,
            })?;
            let count = content.lines().filter(|line| !line.is_empty()).count();
            debug!(table = %table.table, rows = count, "loaded table data");
            rows.insert(table.table.clone(), count);
        }

        if let Some(finish) = &dump.finish {
            self.run_dump_script(finish)?;
        }

        let mut state = self.server.write();
        let db = state
            .database_mut(&self.database)
            .map_err(|e| MigrationError::admin("restore", self.database.clone(), e))?;
        db.restored_from = Some(dump_folder.to_path_buf());
        db.restored_rows = rows;
        Ok(())
    }
}

impl DatabaseAdmin for InMemoryAdmin {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn database_url(&self) -> String {
        format!("memory://{}", self.database)
    }

    fn create_owner(&self) -> MigrationResult<()> {
        tolerate_existing_owner(
            self.insert_owner(),
            &self.classifier,
            &self.owner,
            &self.database,
        )
    }

    fn create_database(&self) -> MigrationResult<()> {
        self.insert_database()
            .map_err(|e| MigrationError::admin("create", self.database.clone(), e))?;
        info!(database = %self.database, owner = %self.owner, "created database");
        Ok(())
    }

    fn drop_database(&self) -> MigrationResult<()> {
        tolerate_missing_database(self.remove_database(), &self.classifier, &self.database)
    }

    fn restore_from_dump(
        &self,
        dump_folder: &Path,
        version: &DatabaseVersion,
    ) -> MigrationResult<()> {
        let dump = DumpContents::read(dump_folder, version)?;
        self.create_database()?;
        self.load_dump(&dump, dump_folder)
            .map_err(|e| discard_failed_restore(self, e))
    }

    fn database_definition(&self) -> MigrationResult<DatabaseDefinition> {
        let state = self.server.read();
        state
            .database(&self.database)
            .map(|db| db.definition.clone())
            .map_err(|e| MigrationError::admin("introspect", self.database.clone(), e))
    }
}

struct InMemoryVersionLog {
    server: InMemoryServer,
    database: String,
}

impl InMemoryVersionLog {
    fn read_log<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&[LogEntry]) -> T,
    ) -> MigrationResult<T> {
        let state = self.server.read();
        state
            .database(&self.database)
            .map(|db| f(db.version_log.as_slice()))
            .map_err(|e| MigrationError::version_log(operation, self.database.clone(), e))
    }

    fn write_log(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Vec<LogEntry>) -> DbResult<()>,
    ) -> MigrationResult<()> {
        let mut state = self.server.write();
        let db = state
            .database_mut(&self.database)
            .map_err(|e| MigrationError::version_log(operation, self.database.clone(), e))?;
        f(&mut db.version_log)
            .map_err(|e| MigrationError::version_log(operation, self.database.clone(), e))?;
        db.log_writes += 1;
        Ok(())
    }

    fn update_latest(
        &self,
        operation: &'static str,
        version: &DatabaseVersion,
        module_name: &str,
        run_status: RunStatus,
        run_exception: Option<String>,
    ) -> MigrationResult<()> {
        self.write_log(operation, |log| {
            let timestamp = next_timestamp(log);
            let entry = log
                .iter_mut()
                .rev()
                .find(|e| e.version == version.as_str() && e.module_name == module_name)
                .ok_or_else(|| {
                    DbError::other(format!(
                        "no log entry for module '{}' at version {}",
                        module_name, version
                    ))
                })?;
            entry.run_status = run_status;
            entry.run_status_timestamp = timestamp;
            entry.run_exception = run_exception;
            Ok(())
        })
    }
}

/// Wall-clock time, never earlier than any logged timestamp
fn next_timestamp(log: &[LogEntry]) -> DateTime<Utc> {
    let now = Utc::now();
    log.iter()
        .map(|e| e.run_status_timestamp)
        .max()
        .map_or(now, |latest| latest.max(now))
}

impl VersionLogStore for InMemoryVersionLog {
    fn can_connect(&self) -> MigrationResult<bool> {
        let state = self.server.read();
        Ok(state.database(&self.database).is_ok())
    }

    fn last_entry(&self) -> MigrationResult<Option<LogEntry>> {
        self.read_log("read", |log| {
            log.iter().max_by_key(|e| e.run_status_timestamp).cloned()
        })
    }

    fn last_successful_entry(&self) -> MigrationResult<Option<LogEntry>> {
        self.read_log("read", |log| {
            log.iter()
                .filter(|e| e.run_status == RunStatus::Success)
                .max_by_key(|e| e.run_status_timestamp)
                .cloned()
        })
    }

    fn entries(&self) -> MigrationResult<Vec<LogEntry>> {
        self.read_log("read", |log| {
            let mut entries = log.to_vec();
            entries.sort_by_key(|e| e.run_status_timestamp);
            entries
        })
    }

    fn log_start(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        module_code: &str,
    ) -> MigrationResult<()> {
        self.write_log("insert", |log| {
            let timestamp = next_timestamp(log);
            log.push(LogEntry {
                version: version.to_string(),
                module_name: module_name.to_string(),
                run_status: RunStatus::Start,
                run_status_timestamp: timestamp,
                module_code: Some(module_code.to_string()),
                run_exception: None,
            });
            Ok(())
        })
    }

    fn log_success(&self, version: &DatabaseVersion, module_name: &str) -> MigrationResult<()> {
        self.update_latest("update", version, module_name, RunStatus::Success, None)
    }

    fn log_failure(
        &self,
        version: &DatabaseVersion,
        module_name: &str,
        failure: &str,
    ) -> MigrationResult<()> {
        self.update_latest(
            "update",
            version,
            module_name,
            RunStatus::Failed,
            Some(failure.to_string()),
        )
    }
}
