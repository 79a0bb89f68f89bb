//! # Database Migrations Module
//!
//! Versioned, forward-only schema evolution driven by SQL scripts.
//!
//! # Design Principles
//!
//! 1. **Ordered**: migration scripts run one version step at a time, in
//!    increasing version order
//! 2. **Logged**: every script run leaves a `START` row in the version log
//!    that becomes `SUCCESS` or `FAILED`
//! 3. **Fail-fast**: the first failing script aborts the run
//! 4. **Resumable**: a new run continues after the last successful script
//! 5. **Forward-only**: a database is never migrated to an earlier version
//!
//! # Script Layout
//!
//! ```text
//! sql/postgresql/001/schema-001.sql
//! sql/generic/001/data-001.sql
//! sql/generic/migration/migration-001-002.sql
//! ```
//!
//! # Usage
//!
//! ```bash
//! dbmigration migrate --config db.toml --version 002
//! dbmigration new-migration --config db.toml
//! dbmigration status --config db.toml
//! ```

pub mod errors;
pub mod generator;
pub mod operations;
pub mod runner;
pub mod state;

pub use errors::{error_report, ErrorCategory, MigrationError, MigrationResult};
pub use generator::MigrationGenerator;
pub use operations::{ScriptExecutor, SqlConnection, SqlScriptExecutor, StatementFailure};
pub use runner::{
    create_or_migrate_database, create_or_migrate_database_with, AppliedScript, MigrationEngine,
    MigrationReport,
};
pub use state::{LogEntry, MigrationState, RunStatus, VersionLogStore, VERSION_LOG_TABLE};
