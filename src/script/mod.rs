//! # SQL Scripts
//!
//! Scripts are located by version through a [`ScriptProvider`]. The file
//! layout below a script folder is:
//!
//! ```text
//! <script_folder>/<root>/<version>/schema-<version>.sql
//! <script_folder>/<root>/<version>/function-<version>.sql
//! <script_folder>/<root>/<version>/data-<version>.sql
//! <script_folder>/<root>/<version>/finish-<version>.sql
//! <script_folder>/<root>/migration/migration-<from>-<to>.sql
//! ```
//!
//! where `<root>` is first the database engine code (e.g. `postgresql`) and
//! then `generic`.

pub mod bundle;
pub mod formatter;
pub mod provider;
pub mod splitter;

pub use bundle::ScriptBundle;
pub use formatter::ScriptFormatter;
pub use provider::SqlScriptProvider;

use crate::migrations::MigrationResult;
use crate::version::DatabaseVersion;
use std::fmt;
use std::path::PathBuf;

/// Name of the root searched after the engine-specific one
pub const GENERIC_ROOT: &str = "generic";

/// Name of the folder holding migration scripts inside a root
pub const MIGRATION_FOLDER: &str = "migration";

/// Sentinel file marking a dump folder as restorable
pub const DUMP_RESTORABLE_MARKER: &str = ".DUMP_RESTORABLE";

/// An immutable SQL script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: String,
    code: String,
    version: DatabaseVersion,
}

impl Script {
    pub fn new(name: impl Into<String>, code: impl Into<String>, version: DatabaseVersion) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            version,
        }
    }

    /// Path-like identifier of the script
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full SQL text
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Version this script brings the database to
    pub fn version(&self) -> &DatabaseVersion {
        &self.version
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (version {})", self.name, self.version)
    }
}

/// Kinds of per-version scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Schema,
    Function,
    Data,
    Finish,
}

impl ScriptKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ScriptKind::Schema => "schema",
            ScriptKind::Function => "function",
            ScriptKind::Data => "data",
            ScriptKind::Finish => "finish",
        }
    }

    /// File name of this kind of script for `version`
    pub fn file_name(&self, version: &DatabaseVersion) -> String {
        format!("{}-{}.sql", self.prefix(), version)
    }
}

/// File name of the migration script from `from` to `to`
pub fn migration_file_name(from: &DatabaseVersion, to: &DatabaseVersion) -> String {
    format!("migration-{}-{}.sql", from, to)
}

/// Resolves scripts by version.
///
/// An absent script is `None`, not an error. Whether absence is fatal is up
/// to the caller.
pub trait ScriptProvider: Send + Sync {
    fn schema_script(&self, version: &DatabaseVersion) -> Option<Script>;

    fn function_script(&self, version: &DatabaseVersion) -> Option<Script>;

    fn data_script(&self, version: &DatabaseVersion) -> Option<Script>;

    fn finish_script(&self, version: &DatabaseVersion) -> Option<Script>;

    fn migration_script(&self, from: &DatabaseVersion, to: &DatabaseVersion) -> Option<Script>;

    /// Whether `version` should be restored from a dump instead of scripted
    fn is_dump_restore(&self, version: &DatabaseVersion) -> bool;

    /// Folder holding the dump of `version`
    fn dump_folder(&self, version: &DatabaseVersion) -> PathBuf;

    /// Touch the dump-restore marker in the dump folder of `version`
    fn mark_as_dump_restorable(&self, version: &DatabaseVersion) -> MigrationResult<()>;
}
