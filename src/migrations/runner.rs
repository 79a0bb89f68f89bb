//! # Migration Engine
//!
//! [`MigrationEngine::migrate_to`] brings one database to a target version:
//!
//! 1. With `create_from_scratch`, the database is dropped first.
//! 2. If the version log cannot be queried the database is provisioned:
//!    owner, database and version log, then the schema, function, data and
//!    finish scripts of the target version, or a dump restore instead.
//! 3. Otherwise the current version is read from the version log and every
//!    `migration-<v>-<v+1>.sql` script up to the target is applied in order.
//!
//! Every script run is logged `START` before and `SUCCESS` or `FAILED`
//! after it runs. The first failure aborts the call; running it again
//! resumes after the last successful script. Migrations never go backwards.

use super::errors::{error_report, MigrationError, MigrationResult};
use super::state::{MigrationState, RunStatus};
use crate::backend::{DaoFactory, EngineRegistry};
use crate::config::DatabaseConfigurationContext;
use crate::script::{Script, ScriptProvider, SqlScriptProvider};
use crate::version::DatabaseVersion;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{error, info, warn};

/// Module code stored for the log entry of a dump restore
const DUMP_RESTORE_CODE: &str = "-- restored from dump";

/// A script that ran successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedScript {
    pub name: String,
    pub version: String,
    pub duration_ms: u64,
}

/// Outcome of a successful [`MigrationEngine::migrate_to`] call
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub database: String,
    pub initial_state: MigrationState,
    pub final_state: MigrationState,
    /// Version found in the version log; `None` for a fresh database
    pub from_version: Option<String>,
    pub to_version: String,
    pub restored_from_dump: bool,
    pub applied: Vec<AppliedScript>,
}

impl MigrationReport {
    fn new(database: &str, target: &DatabaseVersion) -> Self {
        Self {
            database: database.to_string(),
            initial_state: MigrationState::NotProvisioned,
            final_state: MigrationState::NotProvisioned,
            from_version: None,
            to_version: target.to_string(),
            restored_from_dump: false,
            applied: Vec::new(),
        }
    }
}

/// Drives one database through provisioning and migration
pub struct MigrationEngine {
    daos: Box<dyn DaoFactory>,
    scripts: Arc<dyn ScriptProvider>,
    create_from_scratch: bool,
    state: RwLock<MigrationState>,
}

impl MigrationEngine {
    pub fn new(
        daos: Box<dyn DaoFactory>,
        scripts: Arc<dyn ScriptProvider>,
        create_from_scratch: bool,
    ) -> Self {
        Self {
            daos,
            scripts,
            create_from_scratch,
            state: RwLock::new(MigrationState::NotProvisioned),
        }
    }

    /// State reached by the last (or running) migration
    pub fn state(&self) -> MigrationState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn daos(&self) -> &dyn DaoFactory {
        self.daos.as_ref()
    }

    fn database(&self) -> &str {
        self.daos.admin().database_name()
    }

    fn set_state(&self, next: MigrationState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous != next {
            info!(database = self.database(), from = %previous, to = %next, "migration state changed");
            *state = next;
        }
    }

    /// Create or migrate the database to `target`
    pub fn migrate_to(&self, target: &DatabaseVersion) -> MigrationResult<MigrationReport> {
        let mut report = MigrationReport::new(self.database(), target);
        match self.run(target, &mut report) {
            Ok(()) => {
                self.set_state(MigrationState::UpToDate);
                report.final_state = MigrationState::UpToDate;
                info!(
                    database = self.database(),
                    version = %target,
                    applied = report.applied.len(),
                    "database is up to date"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(MigrationState::Failed);
                error!(
                    database = self.database(),
                    version = %target,
                    category = %e.category(),
                    error = %e,
                    "migration failed"
                );
                Err(e)
            }
        }
    }

    fn run(&self, target: &DatabaseVersion, report: &mut MigrationReport) -> MigrationResult<()> {
        if self.create_from_scratch {
            info!(database = self.database(), "recreating database from scratch");
            self.daos.admin().drop_database()?;
        }

        if !self.daos.version_log().can_connect()? {
            self.set_state(MigrationState::NotProvisioned);
            report.initial_state = MigrationState::NotProvisioned;
            return self.setup_database(target, report);
        }

        let current = self.current_version()?;
        current.ensure_same_width(target)?;
        report.from_version = Some(current.to_string());

        match current.cmp(target) {
            Ordering::Equal => {
                self.set_state(MigrationState::UpToDate);
                report.initial_state = MigrationState::UpToDate;
                info!(database = self.database(), version = %current, "no migration needed");
                Ok(())
            }
            Ordering::Less => {
                self.set_state(MigrationState::NeedsMigration);
                report.initial_state = MigrationState::NeedsMigration;
                self.set_state(MigrationState::Migrating);
                self.migrate(&current, target, report)
            }
            Ordering::Greater => Err(MigrationError::DowngradeAttempted {
                database: self.database().to_string(),
                current: current.to_string(),
                target: target.to_string(),
            }),
        }
    }

    /// Version of the last successfully completed script
    fn current_version(&self) -> MigrationResult<DatabaseVersion> {
        let log = self.daos.version_log();
        let last = log
            .last_entry()?
            .ok_or_else(|| MigrationError::InconsistentDatabase {
                database: self.database().to_string(),
                reason: "the version log is empty".to_string(),
            })?;
        if last.run_status == RunStatus::Success {
            return last.database_version();
        }

        warn!(
            database = self.database(),
            module = %last.module_name,
            version = %last.version,
            status = %last.run_status,
            "last script run did not succeed, resuming after the last successful one"
        );
        let successful = log
            .last_successful_entry()?
            .ok_or_else(|| MigrationError::InconsistentDatabase {
                database: self.database().to_string(),
                reason: format!(
                    "no successful script run recorded, last entry is '{}' at version {} ({}); \
                     recreate the database from scratch",
                    last.module_name, last.version, last.run_status
                ),
            })?
            .database_version()?;

        // Setup scripts share one version, so a failure among them leaves a
        // SUCCESS row at the very version that is incomplete.
        let unfinished = last.database_version()?;
        if successful >= unfinished {
            return Err(MigrationError::InconsistentDatabase {
                database: self.database().to_string(),
                reason: format!(
                    "'{}' at version {} did not succeed after earlier scripts of the same version; \
                     recreate the database from scratch",
                    last.module_name, last.version
                ),
            });
        }
        Ok(successful)
    }

    fn setup_database(
        &self,
        target: &DatabaseVersion,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        let admin = self.daos.admin();
        info!(database = self.database(), version = %target, "setting up database");

        if self.scripts.is_dump_restore(target) {
            admin.create_owner()?;
            return self.restore_from_dump(target, report);
        }

        let schema = self
            .scripts
            .schema_script(target)
            .ok_or_else(|| MigrationError::NoSchemaScript {
                version: target.to_string(),
            })?;

        admin.create_owner()?;
        admin.create_database()?;

        self.execute_script(&schema, report)?;
        let optional = [
            self.scripts.function_script(target),
            self.scripts.data_script(target),
            self.scripts.finish_script(target),
        ];
        for script in optional.iter().flatten() {
            self.execute_script(script, report)?;
        }
        Ok(())
    }

    fn restore_from_dump(
        &self,
        target: &DatabaseVersion,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        let folder = self.scripts.dump_folder(target);
        let module = folder.display().to_string();
        info!(database = self.database(), folder = %module, "restoring database from dump");

        let started = Instant::now();
        self.daos.admin().restore_from_dump(&folder, target)?;

        let log = self.daos.version_log();
        log.log_start(target, &module, DUMP_RESTORE_CODE)?;
        log.log_success(target, &module)?;

        report.restored_from_dump = true;
        report.applied.push(AppliedScript {
            name: module,
            version: target.to_string(),
            duration_ms: elapsed_ms(started),
        });
        Ok(())
    }

    fn migrate(
        &self,
        current: &DatabaseVersion,
        target: &DatabaseVersion,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        info!(database = self.database(), from = %current, to = %target, "migrating database");
        for (from, to) in current.chain_to(target)? {
            let script = self.scripts.migration_script(&from, &to).ok_or_else(|| {
                MigrationError::MissingMigrationScript {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            })?;
            self.execute_script(&script, report)?;
        }
        Ok(())
    }

    /// Run one script between a `START` and a `SUCCESS`/`FAILED` log entry
    fn execute_script(&self, script: &Script, report: &mut MigrationReport) -> MigrationResult<()> {
        let log = self.daos.version_log();
        let version = script.version();
        info!(script = script.name(), version = %version, "executing script");

        let started = Instant::now();
        log.log_start(version, script.name(), script.code())?;
        match self.daos.script_executor().execute(script) {
            Ok(()) => {
                log.log_success(version, script.name())?;
                let duration_ms = elapsed_ms(started);
                info!(script = script.name(), duration_ms, "script succeeded");
                report.applied.push(AppliedScript {
                    name: script.name().to_string(),
                    version: version.to_string(),
                    duration_ms,
                });
                Ok(())
            }
            Err(e) => {
                error!(script = script.name(), error = %e, "script failed");
                if let Err(log_error) = log.log_failure(version, script.name(), &error_report(&e)) {
                    error!(script = script.name(), error = %log_error, "cannot record script failure");
                }
                Err(e)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("database", &self.database())
            .field("create_from_scratch", &self.create_from_scratch)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Build the engine for `context` from `registry` and migrate to `version`,
/// reading scripts from the configured script folder
pub fn create_or_migrate_database(
    context: &DatabaseConfigurationContext,
    registry: &EngineRegistry,
    version: &DatabaseVersion,
) -> MigrationResult<MigrationReport> {
    let scripts = Arc::new(SqlScriptProvider::from_context(context));
    create_or_migrate_database_with(context, registry, scripts, version)
}

/// [`create_or_migrate_database`] with a custom script provider
pub fn create_or_migrate_database_with(
    context: &DatabaseConfigurationContext,
    registry: &EngineRegistry,
    scripts: Arc<dyn ScriptProvider>,
    version: &DatabaseVersion,
) -> MigrationResult<MigrationReport> {
    context.validate()?;
    let daos = registry.dao_factory(context)?;
    let engine = MigrationEngine::new(daos, scripts, context.create_from_scratch);
    engine.migrate_to(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{InMemoryEngine, InMemoryServer, MEMORY_ENGINE_CODE};
    use crate::migrations::ErrorCategory;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const DB: &str = "lims_test";

    fn v(s: &str) -> DatabaseVersion {
        DatabaseVersion::parse(s).unwrap()
    }

    fn write(root: &Path, relative: &str, sql: &str) {
        let path = root.join("sql").join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, sql).unwrap();
    }

    fn context(dir: &TempDir) -> DatabaseConfigurationContext {
        let mut context = DatabaseConfigurationContext::new("lims");
        context.database_engine_code = MEMORY_ENGINE_CODE.to_string();
        context.database_kind = Some("test".to_string());
        context.owner = "lims".to_string();
        context.working_directory = dir.path().to_path_buf();
        context
    }

    fn registry(server: &InMemoryServer) -> EngineRegistry {
        EngineRegistry::new().with(Arc::new(InMemoryEngine::new(server.clone())))
    }

    fn engine(
        server: &InMemoryServer,
        dir: &TempDir,
        create_from_scratch: bool,
    ) -> MigrationEngine {
        let context = context(dir);
        let daos = registry(server).dao_factory(&context).unwrap();
        let scripts = Arc::new(SqlScriptProvider::from_context(&context));
        MigrationEngine::new(daos, scripts, create_from_scratch)
    }

    fn statuses(server: &InMemoryServer) -> Vec<(String, RunStatus)> {
        server
            .version_log(DB)
            .into_iter()
            .map(|e| (e.version, e.run_status))
            .collect()
    }

    /// Database at version 001 with migrations up to 003 on disk
    fn database_at_001(server: &InMemoryServer, dir: &TempDir) {
        write(dir.path(), "generic/001/schema-001.sql", "CREATE TABLE samples (id BIGINT);");
        engine(server, dir, false).migrate_to(&v("001")).unwrap();
    }

    #[test]
    fn test_fresh_database() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        write(dir.path(), "generic/001/schema-001.sql", "CREATE TABLE samples (id BIGINT);");

        let engine = engine(&server, &dir, false);
        let report = engine.migrate_to(&v("001")).unwrap();

        assert_eq!(report.initial_state, MigrationState::NotProvisioned);
        assert_eq!(report.final_state, MigrationState::UpToDate);
        assert_eq!(engine.state(), MigrationState::UpToDate);
        assert!(server.has_owner("lims"));
        assert_eq!(server.database_owner(DB).as_deref(), Some("lims"));

        let log = server.version_log(DB);
        assert_eq!(log.len(), 1);
        assert!(log[0].module_name.ends_with("schema-001.sql"));
        assert_eq!(log[0].run_status, RunStatus::Success);
        assert_eq!(log[0].module_code.as_deref(), Some("CREATE TABLE samples (id BIGINT);"));
    }

    #[test]
    fn test_fresh_database_runs_all_setup_scripts_in_order() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        write(dir.path(), "generic/001/schema-001.sql", "SCHEMA");
        write(dir.path(), "generic/001/function-001.sql", "FUNCTION");
        write(dir.path(), "generic/001/data-001.sql", "DATA");
        write(dir.path(), "memory/001/finish-001.sql", "FINISH");

        let report = engine(&server, &dir, false).migrate_to(&v("001")).unwrap();

        assert_eq!(server.executed_sql(DB), vec!["SCHEMA", "FUNCTION", "DATA", "FINISH"]);
        assert_eq!(report.applied.len(), 4);
        assert!(report.applied[3].name.starts_with("sql/memory/"));
    }

    #[test]
    fn test_missing_schema_script_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();

        let engine = engine(&server, &dir, false);
        let err = engine.migrate_to(&v("001")).unwrap_err();

        assert!(matches!(err, MigrationError::NoSchemaScript { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(engine.state(), MigrationState::Failed);
        assert!(!server.has_database(DB));
    }

    #[test]
    fn test_migrates_through_every_version() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        write(dir.path(), "generic/migration/migration-001-002.sql", "ALTER 2");
        write(dir.path(), "generic/migration/migration-002-003.sql", "ALTER 3");

        let report = engine(&server, &dir, false).migrate_to(&v("003")).unwrap();

        assert_eq!(report.initial_state, MigrationState::NeedsMigration);
        assert_eq!(report.from_version.as_deref(), Some("001"));
        let names: Vec<_> = report.applied.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "sql/generic/migration/migration-001-002.sql",
                "sql/generic/migration/migration-002-003.sql"
            ]
        );
        assert_eq!(
            statuses(&server),
            vec![
                ("001".to_string(), RunStatus::Success),
                ("002".to_string(), RunStatus::Success),
                ("003".to_string(), RunStatus::Success),
            ]
        );
        // One START insert and one SUCCESS update per script.
        assert_eq!(server.log_writes(DB), 6);
    }

    #[test]
    fn test_missing_migration_script_stops_before_logging() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        write(dir.path(), "generic/migration/migration-001-002.sql", "ALTER 2");
        let writes_before = server.log_writes(DB);

        let err = engine(&server, &dir, false).migrate_to(&v("003")).unwrap_err();

        match &err {
            MigrationError::MissingMigrationScript { from, to } => {
                assert_eq!(from, "002");
                assert_eq!(to, "003");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(server.log_writes(DB) - writes_before, 2);
        assert!(server.version_log(DB).iter().all(|e| e.version != "003"));
        assert_eq!(
            statuses(&server).last(),
            Some(&("002".to_string(), RunStatus::Success))
        );
    }

    #[test]
    fn test_up_to_date_database_is_untouched() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        let writes_before = server.log_writes(DB);
        let executed_before = server.executed_sql(DB).len();

        let report = engine(&server, &dir, false).migrate_to(&v("001")).unwrap();

        assert_eq!(report.initial_state, MigrationState::UpToDate);
        assert!(report.applied.is_empty());
        assert_eq!(server.log_writes(DB), writes_before);
        assert_eq!(server.executed_sql(DB).len(), executed_before);
    }

    #[test]
    fn test_failed_script_is_logged_and_resumable() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        write(dir.path(), "generic/migration/migration-001-002.sql", "ALTER 2");
        write(dir.path(), "generic/migration/migration-002-003.sql", "BROKEN 3");
        server.fail_statements_containing("BROKEN");

        let engine = engine(&server, &dir, false);
        let err = engine.migrate_to(&v("003")).unwrap_err();
        assert!(matches!(err, MigrationError::ScriptFailed { .. }));
        assert_eq!(err.category(), ErrorCategory::Execution);
        assert_eq!(engine.state(), MigrationState::Failed);

        let log = server.version_log(DB);
        let failed: Vec<_> = log.iter().filter(|e| e.run_status == RunStatus::Failed).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].version, "003");
        let exception = failed[0].run_exception.as_deref().unwrap();
        assert!(exception.contains("migration-002-003.sql"));
        assert!(exception.contains("Caused by:"));

        // The fixed script is picked up from the last successful version.
        server.clear_failures();
        let report = engine.migrate_to(&v("003")).unwrap();
        assert_eq!(report.from_version.as_deref(), Some("002"));
        assert_eq!(report.applied.len(), 1);
        assert_eq!(engine.state(), MigrationState::UpToDate);
    }

    #[test]
    fn test_downgrade_is_refused() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        write(dir.path(), "generic/migration/migration-001-002.sql", "ALTER 2");
        engine(&server, &dir, false).migrate_to(&v("002")).unwrap();

        let err = engine(&server, &dir, false).migrate_to(&v("001")).unwrap_err();
        assert!(matches!(err, MigrationError::DowngradeAttempted { .. }));
        assert_eq!(err.category(), ErrorCategory::Environment);
    }

    #[test]
    fn test_create_from_scratch_drops_existing_database() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        write(dir.path(), "generic/migration/migration-001-002.sql", "ALTER 2");
        engine(&server, &dir, false).migrate_to(&v("002")).unwrap();
        write(dir.path(), "generic/002/schema-002.sql", "CREATE TABLE samples_v2 (id BIGINT);");

        let report = engine(&server, &dir, true).migrate_to(&v("002")).unwrap();

        assert_eq!(report.initial_state, MigrationState::NotProvisioned);
        let log = server.version_log(DB);
        assert_eq!(log.len(), 1);
        assert!(log[0].module_name.ends_with("schema-002.sql"));
    }

    #[test]
    fn test_unreachable_server() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);
        server.set_unreachable(true);

        let err = engine(&server, &dir, false).migrate_to(&v("001")).unwrap_err();
        assert!(matches!(err, MigrationError::DatabaseUnreachable { .. }));
        assert_eq!(err.category(), ErrorCategory::Environment);
    }

    #[test]
    fn test_interrupted_first_script_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        write(dir.path(), "generic/001/schema-001.sql", "BROKEN schema");
        server.fail_statements_containing("BROKEN");
        assert!(engine(&server, &dir, false).migrate_to(&v("001")).is_err());

        let err = engine(&server, &dir, false).migrate_to(&v("001")).unwrap_err();
        assert!(matches!(err, MigrationError::InconsistentDatabase { .. }));
    }

    #[test]
    fn test_failed_setup_script_is_not_up_to_date() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        write(dir.path(), "generic/001/schema-001.sql", "CREATE TABLE samples (id BIGINT);");
        write(dir.path(), "generic/001/data-001.sql", "BROKEN data");
        server.fail_statements_containing("BROKEN");
        assert!(engine(&server, &dir, false).migrate_to(&v("001")).is_err());

        let err = engine(&server, &dir, false).migrate_to(&v("001")).unwrap_err();
        assert!(matches!(err, MigrationError::InconsistentDatabase { .. }));
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert_eq!(server.executed_sql(DB), vec!["CREATE TABLE samples (id BIGINT);"]);

        server.clear_failures();
        let report = engine(&server, &dir, true).migrate_to(&v("001")).unwrap();
        assert_eq!(report.applied.len(), 2);
    }

    #[test]
    fn test_failed_dump_restore_leaves_no_database() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        let dump = dir.path().join("sql").join("memory").join("005");
        fs::create_dir_all(&dump).unwrap();
        fs::write(dump.join("schema-005.sql"), "BROKEN dump schema").unwrap();

        let context = context(&dir);
        let scripts = Arc::new(SqlScriptProvider::from_context(&context));
        scripts.mark_as_dump_restorable(&v("005")).unwrap();
        server.fail_statements_containing("BROKEN");

        let err = engine(&server, &dir, false).migrate_to(&v("005")).unwrap_err();
        assert!(matches!(err, MigrationError::ScriptFailed { .. }));
        assert!(!server.has_database(DB));

        // Nothing is left behind, so the next run restores again.
        server.clear_failures();
        let report = engine(&server, &dir, false).migrate_to(&v("005")).unwrap();
        assert!(report.restored_from_dump);
        assert_eq!(statuses(&server), vec![("005".to_string(), RunStatus::Success)]);
    }

    #[test]
    fn test_version_width_mismatch() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        database_at_001(&server, &dir);

        let err = engine(&server, &dir, false).migrate_to(&v("0002")).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidVersion(_)));
    }

    #[test]
    fn test_dump_restore() {
        let dir = TempDir::new().unwrap();
        let server = InMemoryServer::new();
        let dump = dir.path().join("sql").join("memory").join("005");
        fs::create_dir_all(&dump).unwrap();
        fs::write(dump.join("schema-005.sql"), "CREATE TABLE samples (id BIGINT);").unwrap();
        fs::write(dump.join("001=samples.tsv"), "1\n2\n").unwrap();

        let context = context(&dir);
        let scripts = Arc::new(SqlScriptProvider::from_context(&context));
        scripts.mark_as_dump_restorable(&v("005")).unwrap();

        let report =
            create_or_migrate_database_with(&context, &registry(&server), scripts, &v("005"))
                .unwrap();

        assert!(report.restored_from_dump);
        assert_eq!(server.restored_from(DB).as_deref(), Some(dump.as_path()));
        assert_eq!(server.restored_rows(DB).get("samples"), Some(&2));
        assert_eq!(statuses(&server), vec![("005".to_string(), RunStatus::Success)]);

        // Later runs see the restored version.
        let report = engine(&server, &dir, false).migrate_to(&v("005")).unwrap();
        assert_eq!(report.initial_state, MigrationState::UpToDate);
    }

    #[test]
    fn test_create_or_migrate_unknown_engine() {
        let dir = TempDir::new().unwrap();
        let mut context = context(&dir);
        context.database_engine_code = "oracle".to_string();

        let err = create_or_migrate_database(&context, &EngineRegistry::with_defaults(), &v("001"))
            .unwrap_err();
        assert!(matches!(err, MigrationError::UndefinedEngine { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
