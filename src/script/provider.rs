//! # Script Repository
//!
//! Resolution order for a script at relative path `p`:
//!
//! 1. `<script_folder>/<engine>/p` as packaged resource, then as file
//! 2. `<script_folder>/generic/p` as packaged resource, then as file
//!
//! Files are read relative to the configured working directory.

use super::bundle::normalize;
use super::{
    migration_file_name, Script, ScriptBundle, ScriptKind, ScriptProvider,
    DUMP_RESTORABLE_MARKER, GENERIC_ROOT, MIGRATION_FOLDER,
};
use crate::config::DatabaseConfigurationContext;
use crate::migrations::{MigrationError, MigrationResult};
use crate::version::DatabaseVersion;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File- and resource-backed [`ScriptProvider`]
#[derive(Debug, Clone)]
pub struct SqlScriptProvider {
    script_folder: PathBuf,
    engine_code: String,
    working_directory: PathBuf,
    bundle: ScriptBundle,
}

impl SqlScriptProvider {
    pub fn new(script_folder: impl Into<PathBuf>, engine_code: impl Into<String>) -> Self {
        Self {
            script_folder: script_folder.into(),
            engine_code: engine_code.into(),
            working_directory: PathBuf::from("."),
            bundle: ScriptBundle::new(),
        }
    }

    /// Provider for the script folder and engine of a configuration
    pub fn from_context(context: &DatabaseConfigurationContext) -> Self {
        Self::new(context.script_folder.clone(), context.database_engine_code.clone())
            .with_working_directory(context.working_directory.clone())
    }

    pub fn with_working_directory(mut self, working_directory: impl Into<PathBuf>) -> Self {
        self.working_directory = working_directory.into();
        self
    }

    pub fn with_bundle(mut self, bundle: ScriptBundle) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn engine_code(&self) -> &str {
        &self.engine_code
    }

    /// Engine-specific root first, generic root second
    fn roots(&self) -> Vec<&str> {
        if self.engine_code == GENERIC_ROOT {
            vec![GENERIC_ROOT]
        } else {
            vec![self.engine_code.as_str(), GENERIC_ROOT]
        }
    }

    fn resolve(&self, relative: &Path, version: &DatabaseVersion) -> Option<Script> {
        for root in self.roots() {
            let candidate = self.script_folder.join(root).join(relative);
            let name = normalize(&candidate);

            if let Some(code) = self.bundle.get(&candidate) {
                debug!(script = %name, "resolved packaged script");
                return Some(Script::new(name, code, version.clone()));
            }

            let file = self.working_directory.join(&candidate);
            match fs::read_to_string(&file) {
                Ok(code) => {
                    debug!(script = %name, "resolved script file");
                    return Some(Script::new(name, code, version.clone()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "cannot read script file, skipping");
                }
            }
        }
        debug!(script = %relative.display(), "no script found");
        None
    }

    fn version_script(&self, kind: ScriptKind, version: &DatabaseVersion) -> Option<Script> {
        let relative = Path::new(version.as_str()).join(kind.file_name(version));
        self.resolve(&relative, version)
    }
}

impl ScriptProvider for SqlScriptProvider {
    fn schema_script(&self, version: &DatabaseVersion) -> Option<Script> {
        self.version_script(ScriptKind::Schema, version)
    }

    fn function_script(&self, version: &DatabaseVersion) -> Option<Script> {
        self.version_script(ScriptKind::Function, version)
    }

    fn data_script(&self, version: &DatabaseVersion) -> Option<Script> {
        self.version_script(ScriptKind::Data, version)
    }

    fn finish_script(&self, version: &DatabaseVersion) -> Option<Script> {
        self.version_script(ScriptKind::Finish, version)
    }

    fn migration_script(&self, from: &DatabaseVersion, to: &DatabaseVersion) -> Option<Script> {
        let relative = Path::new(MIGRATION_FOLDER).join(migration_file_name(from, to));
        self.resolve(&relative, to)
    }

    fn is_dump_restore(&self, version: &DatabaseVersion) -> bool {
        self.dump_folder(version).join(DUMP_RESTORABLE_MARKER).is_file()
    }

    fn dump_folder(&self, version: &DatabaseVersion) -> PathBuf {
        self.working_directory
            .join(&self.script_folder)
            .join(&self.engine_code)
            .join(version.as_str())
    }

    fn mark_as_dump_restorable(&self, version: &DatabaseVersion) -> MigrationResult<()> {
        let folder = self.dump_folder(version);
        fs::create_dir_all(&folder).map_err(|e| MigrationError::FileWrite {
            path: folder.clone(),
            source: e,
        })?;
        let marker = folder.join(DUMP_RESTORABLE_MARKER);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)
            .map_err(|e| MigrationError::FileWrite {
                path: marker.clone(),
                source: e,
            })?;
        info!(marker = %marker.display(), "marked version {} as dump restorable", version);
        Ok(())
    }
}
