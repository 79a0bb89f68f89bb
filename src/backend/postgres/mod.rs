//! # PostgreSQL Backend
//!
//! Roles and databases are managed through the admin role connected to the
//! admin database; scripts, the version log and introspection run as the
//! owner on the managed database. No connection outlives the call that
//! opened it.

pub mod admin;
pub mod connection;
pub mod metadata;
pub mod version_log;

pub use admin::PostgresAdmin;
pub use connection::{PgSession, PgSqlConnection};
pub use version_log::PostgresVersionLog;

use super::{DaoFactory, DatabaseEngine};
use crate::admin::DatabaseAdmin;
use crate::config::DatabaseConfigurationContext;
use crate::migrations::{MigrationResult, ScriptExecutor, SqlScriptExecutor, VersionLogStore};
use std::sync::Arc;

/// Engine code of the PostgreSQL backend
pub const POSTGRES_ENGINE_CODE: &str = "postgresql";

/// The PostgreSQL [`DatabaseEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresEngine;

impl DatabaseEngine for PostgresEngine {
    fn code(&self) -> &str {
        POSTGRES_ENGINE_CODE
    }

    fn dao_factory(
        &self,
        context: &DatabaseConfigurationContext,
    ) -> MigrationResult<Box<dyn DaoFactory>> {
        Ok(Box::new(PostgresDaoFactory::new(context)?))
    }
}

/// DAOs of one PostgreSQL database, sharing one [`PgSession`]
#[derive(Debug)]
pub struct PostgresDaoFactory {
    admin: PostgresAdmin,
    version_log: PostgresVersionLog,
    executor: SqlScriptExecutor,
}

impl PostgresDaoFactory {
    pub fn new(context: &DatabaseConfigurationContext) -> MigrationResult<Self> {
        let session = PgSession::new(context)?;
        let connection = Arc::new(PgSqlConnection::new(session.clone()));
        Ok(Self {
            admin: PostgresAdmin::new(session.clone()),
            version_log: PostgresVersionLog::new(session),
            executor: SqlScriptExecutor::new(connection, context.script_single_step_mode),
        })
    }
}

impl DaoFactory for PostgresDaoFactory {
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
