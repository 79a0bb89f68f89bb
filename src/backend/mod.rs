//! # Database Backends
//!
//! A backend is a [`DatabaseEngine`]: it turns a configuration into a
//! [`DaoFactory`] handing out the admin interface, the version log store and
//! the script executor for one database. Engines are looked up by code in
//! an [`EngineRegistry`] that the caller builds and passes in.

pub mod dump;
pub mod memory;
pub mod postgres;

use crate::admin::DatabaseAdmin;
use crate::config::DatabaseConfigurationContext;
use crate::migrations::{MigrationError, MigrationResult, ScriptExecutor, VersionLogStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Data access objects of one database
pub trait DaoFactory: Send + Sync {
    fn admin(&self) -> &dyn DatabaseAdmin;

    fn version_log(&self) -> &dyn VersionLogStore;

    fn script_executor(&self) -> &dyn ScriptExecutor;
}

/// A database backend
pub trait DatabaseEngine: Send + Sync {
    /// Code used in configuration and as engine-specific script root
    fn code(&self) -> &str;

    fn dao_factory(
        &self,
        context: &DatabaseConfigurationContext,
    ) -> MigrationResult<Box<dyn DaoFactory>>;
}

/// Engines available to a process, keyed by code
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn DatabaseEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in PostgreSQL engine
    pub fn with_defaults() -> Self {
        Self::new().with(Arc::new(postgres::PostgresEngine))
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, engine: Arc<dyn DatabaseEngine>) -> Self {
        self.register(engine);
        self
    }

    /// Register `engine`, replacing any engine with the same code
    pub fn register(&mut self, engine: Arc<dyn DatabaseEngine>) {
        self.engines.insert(engine.code().to_string(), engine);
    }

    pub fn get(&self, code: &str) -> MigrationResult<Arc<dyn DatabaseEngine>> {
        self.engines
            .get(code)
            .cloned()
            .ok_or_else(|| MigrationError::UndefinedEngine {
                code: code.to_string(),
                known: self.codes().join(", "),
            })
    }

    pub fn codes(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    /// DAO factory for the engine named in `context`
    pub fn dao_factory(
        &self,
        context: &DatabaseConfigurationContext,
    ) -> MigrationResult<Box<dyn DaoFactory>> {
        self.get(&context.database_engine_code)?.dao_factory(context)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.codes())
            .finish()
    }
}
