//! # Migration Generator
//!
//! Creates the skeleton of the next `migration-<from>-<to>.sql` script in
//! the engine-specific migration folder.

use super::errors::{MigrationError, MigrationResult};
use crate::config::DatabaseConfigurationContext;
use crate::script::{migration_file_name, GENERIC_ROOT, MIGRATION_FOLDER};
use crate::version::DatabaseVersion;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Migration script generator
#[derive(Debug, Clone)]
pub struct MigrationGenerator {
    script_root: PathBuf,
    engine_code: String,
}

impl MigrationGenerator {
    /// `script_root` is the script folder resolved against the working directory
    pub fn new(script_root: impl Into<PathBuf>, engine_code: impl Into<String>) -> Self {
        Self {
            script_root: script_root.into(),
            engine_code: engine_code.into(),
        }
    }

    pub fn from_context(context: &DatabaseConfigurationContext) -> Self {
        Self::new(context.script_root(), context.database_engine_code.clone())
    }

    /// Folder new migration scripts are written to
    pub fn migration_folder(&self) -> PathBuf {
        self.script_root
            .join(&self.engine_code)
            .join(MIGRATION_FOLDER)
    }

    /// Highest version that has a version folder or is the target of a
    /// migration script, in the engine or the generic root. Versions of
    /// different widths are a configuration error.
    pub fn latest_version(&self) -> MigrationResult<Option<DatabaseVersion>> {
        let mut found = Vec::new();
        for root in [self.engine_code.as_str(), GENERIC_ROOT] {
            let root = self.script_root.join(root);
            found.extend(
                entry_names(&root)?
                    .iter()
                    .filter_map(|name| DatabaseVersion::parse(name).ok()),
            );
            found.extend(
                entry_names(&root.join(MIGRATION_FOLDER))?
                    .iter()
                    .filter_map(|name| migration_target(name)),
            );
        }

        let mut latest: Option<DatabaseVersion> = None;
        for version in found {
            if let Some(current) = &latest {
                current.ensure_same_width(&version)?;
            }
            latest = latest.max(Some(version));
        }
        Ok(latest)
    }

    /// Create `migration-<from>-<from + 1>.sql`; `from` defaults to the
    /// latest known version
    pub fn create(&self, from: Option<&DatabaseVersion>) -> MigrationResult<PathBuf> {
        let from = match from {
            Some(from) => from.clone(),
            None => self
                .latest_version()?
                .ok_or_else(|| MigrationError::InvalidConfiguration {
                    details: format!(
                        "  - no versions found below {:?}, pass the version to migrate from",
                        self.script_root
                    ),
                })?,
        };
        let to = from.next()?;

        let folder = self.migration_folder();
        fs::create_dir_all(&folder).map_err(|e| MigrationError::FileWrite {
            path: folder.clone(),
            source: e,
        })?;

        let path = folder.join(migration_file_name(&from, &to));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(MigrationError::ScriptExists { path });
            }
            Err(e) => return Err(MigrationError::FileWrite { path, source: e }),
        };

        file.write_all(skeleton(&from, &to).as_bytes())
            .map_err(|e| MigrationError::FileWrite {
                path: path.clone(),
                source: e,
            })?;

        info!(path = %path.display(), from = %from, to = %to, "created migration script");
        Ok(path)
    }
}

fn skeleton(from: &DatabaseVersion, to: &DatabaseVersion) -> String {
    format!(
        "-- Migration from version {from} to version {to}\n\
         -- Created: {}\n\
         --\n\
         -- Statements run in order. The first failing statement aborts the migration.\n\n",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// File names in `dir`; a missing directory has none
fn entry_names(dir: &Path) -> MigrationResult<Vec<String>> {
    let read_error = |e: io::Error| MigrationError::FileRead {
        path: dir.to_path_buf(),
        source: e,
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_error(e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(read_error)?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// `migration-003-004.sql` -> `004`
fn migration_target(file_name: &str) -> Option<DatabaseVersion> {
    let versions = file_name.strip_prefix("migration-")?.strip_suffix(".sql")?;
    let (_, to) = versions.split_once('-')?;
    DatabaseVersion::parse(to).ok()
}
