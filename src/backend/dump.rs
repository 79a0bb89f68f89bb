//! Dump folder layout shared by all backends.
//!
//! ```text
//! <dump_folder>/.DUMP_RESTORABLE
//! <dump_folder>/schema-<version>.sql      required
//! <dump_folder>/function-<version>.sql    optional
//! <dump_folder>/finish-<version>.sql      optional
//! <dump_folder>/<order>=<table>.tsv       table data, loaded in file name order
//! ```

use crate::migrations::{MigrationError, MigrationResult};
use crate::script::{Script, ScriptKind};
use crate::version::DatabaseVersion;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of table data files
pub const TABLE_DATA_EXTENSION: &str = "tsv";

/// Tab-separated contents of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDump {
    pub table: String,
    pub path: PathBuf,
}

/// Everything a dump folder provides for one version
#[derive(Debug, Clone)]
pub struct DumpContents {
    pub schema: Script,
    pub function: Option<Script>,
    pub finish: Option<Script>,
    pub tables: Vec<TableDump>,
}

impl DumpContents {
    pub fn read(folder: &Path, version: &DatabaseVersion) -> MigrationResult<Self> {
        if !folder.is_dir() {
            return Err(MigrationError::InvalidDump {
                path: folder.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let schema = read_script(folder, ScriptKind::Schema, version)?.ok_or_else(|| {
            MigrationError::InvalidDump {
                path: folder.to_path_buf(),
                reason: format!("missing {}", ScriptKind::Schema.file_name(version)),
            }
        })?;
        let function = read_script(folder, ScriptKind::Function, version)?;
        let finish = read_script(folder, ScriptKind::Finish, version)?;

        let read_dir_error = |e: io::Error| MigrationError::FileRead {
            path: folder.to_path_buf(),
            source: e,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(folder).map_err(read_dir_error)? {
            let path = entry.map_err(read_dir_error)?.path();
            if path.extension().map(|e| e == TABLE_DATA_EXTENSION).unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let tables = paths
            .into_iter()
            .map(|path| {
                let table = table_name_of(&path).ok_or_else(|| MigrationError::InvalidDump {
                    path: path.clone(),
                    reason: "table data files must be named <order>=<table>.tsv".to_string(),
                })?;
                Ok(TableDump { table, path })
            })
            .collect::<MigrationResult<Vec<_>>>()?;

        Ok(Self {
            schema,
            function,
            finish,
            tables,
        })
    }
}

fn read_script(
    folder: &Path,
    kind: ScriptKind,
    version: &DatabaseVersion,
) -> MigrationResult<Option<Script>> {
    let path = folder.join(kind.file_name(version));
    match fs::read_to_string(&path) {
        Ok(code) => Ok(Some(Script::new(
            path.to_string_lossy().into_owned(),
            code,
            version.clone(),
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MigrationError::FileRead { path, source: e }),
    }
}

/// `001=samples.tsv` -> `samples`
fn table_name_of(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (_, table) = stem.split_once('=')?;
    if table.is_empty() {
        None
    } else {
        Some(table.to_string())
    }
}
