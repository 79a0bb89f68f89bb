//! # Database Administration
//!
//! [`DatabaseAdmin`] creates and drops the database and its owning role.
//! `create_owner` and `drop_database` are idempotent: "role already exists"
//! and "database does not exist" are recognized through an
//! [`ErrorClassifier`] and swallowed. This classification is the only place
//! where backend-specific knowledge reaches the engine.

use crate::core::DbError;
use crate::migrations::{MigrationError, MigrationResult};
use crate::tables::DatabaseDefinition;
use crate::version::DatabaseVersion;
use std::path::Path;
use tracing::{error, info, warn};

/// SQLSTATE: duplicate_object
pub const DUPLICATE_OBJECT: &str = "42710";
/// SQLSTATE: invalid_catalog_name
pub const INVALID_CATALOG_NAME: &str = "3D000";
/// SQLSTATE: undefined_table
pub const UNDEFINED_TABLE: &str = "42P01";

/// Backend-specific interpretation of [`DbError`]s
pub trait ErrorClassifier: Send + Sync {
    /// The object (role) to create exists already
    fn is_duplicate_object(&self, error: &DbError) -> bool;

    /// The database does not exist
    fn is_database_missing(&self, error: &DbError) -> bool;

    /// The queried table does not exist
    fn is_relation_missing(&self, error: &DbError) -> bool;
}

/// Classifier based on standard SQLSTATE codes
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlStateClassifier;

impl ErrorClassifier for SqlStateClassifier {
    fn is_duplicate_object(&self, error: &DbError) -> bool {
        error.sql_state() == Some(DUPLICATE_OBJECT)
    }

    fn is_database_missing(&self, error: &DbError) -> bool {
        error.sql_state() == Some(INVALID_CATALOG_NAME)
    }

    fn is_relation_missing(&self, error: &DbError) -> bool {
        error.sql_state() == Some(UNDEFINED_TABLE)
    }
}

/// Administrative access to one database
pub trait DatabaseAdmin: Send + Sync {
    fn database_name(&self) -> &str;

    fn database_url(&self) -> String;

    /// Create the owner role; succeeds if it exists already
    fn create_owner(&self) -> MigrationResult<()>;

    /// Create the database, owned by the owner, with an empty version log
    fn create_database(&self) -> MigrationResult<()>;

    /// Drop the database; succeeds if it does not exist
    fn drop_database(&self) -> MigrationResult<()>;

    /// Create the database from the dump of `version` in `dump_folder`
    fn restore_from_dump(&self, dump_folder: &Path, version: &DatabaseVersion)
        -> MigrationResult<()>;

    /// Introspect tables, keys and foreign keys of the live database
    fn database_definition(&self) -> MigrationResult<DatabaseDefinition>;
}

/// Turn the result of a role creation into success if the role exists
pub fn tolerate_existing_owner(
    result: Result<(), DbError>,
    classifier: &dyn ErrorClassifier,
    owner: &str,
    database: &str,
) -> MigrationResult<()> {
    match result {
        Ok(()) => {
            info!(owner, "created database owner");
            Ok(())
        }
        Err(e) if classifier.is_duplicate_object(&e) => {
            warn!(owner, "owner already exists, continuing");
            Ok(())
        }
        Err(e) => Err(MigrationError::admin("create owner of", database, e)),
    }
}

/// Turn the result of a database drop into success if it was missing
pub fn tolerate_missing_database(
    result: Result<(), DbError>,
    classifier: &dyn ErrorClassifier,
    database: &str,
) -> MigrationResult<()> {
    match result {
        Ok(()) => {
            info!(database, "dropped database");
            Ok(())
        }
        Err(e) if classifier.is_database_missing(&e) => {
            info!(database, "database does not exist, nothing to drop");
            Ok(())
        }
        Err(e) => Err(MigrationError::admin("drop", database, e)),
    }
}

/// Drop a database whose restore failed part way and hand back the restore
/// error, so the next run starts from a missing database again
pub fn discard_failed_restore(
    admin: &dyn DatabaseAdmin,
    restore_error: MigrationError,
) -> MigrationError {
    let database = admin.database_name();
    warn!(database, error = %restore_error, "restore failed, dropping the partly restored database");
    if let Err(e) = admin.drop_database() {
        error!(database, error = %e, "cannot drop the partly restored database");
    }
    restore_error
}
