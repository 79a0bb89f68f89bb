//! Database configuration.
//!
//! Loaded from a JSON or TOML file (chosen by extension):
//!
//! ```toml
//! database_engine_code = "postgresql"
//! host = "localhost"
//! port = 5432
//! basic_database_name = "openbis"
//! database_kind = "dev"
//! owner = "openbis"
//! admin_user = "postgres"
//! script_folder = "sql"
//! create_from_scratch = false
//! script_single_step_mode = false
//! ```

use crate::config_validator::{format_validation_errors, ConfigValidator};
use crate::migrations::{MigrationError, MigrationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_engine_code() -> String {
    "postgresql".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_owner() -> String {
    whoami::username()
}

fn default_admin_user() -> String {
    "postgres".to_string()
}

fn default_admin_database() -> String {
    "postgres".to_string()
}

fn default_script_folder() -> PathBuf {
    PathBuf::from("sql")
}

fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Everything needed to reach, create and migrate one database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfigurationContext {
    /// Registered engine to use, e.g. "postgresql"
    #[serde(default = "default_engine_code")]
    pub database_engine_code: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name without kind suffix (required)
    pub basic_database_name: String,

    /// Optional suffix distinguishing e.g. "dev" from "productive"
    #[serde(default)]
    pub database_kind: Option<String>,

    /// Role owning the database and its objects (default: OS user)
    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Role allowed to create roles and databases
    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    #[serde(default)]
    pub admin_password: Option<String>,

    /// Database the admin connects to for create/drop
    #[serde(default = "default_admin_database")]
    pub admin_database: String,

    #[serde(default = "default_script_folder")]
    pub script_folder: PathBuf,

    /// Base for relative script and dump paths
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Drop and recreate the database on every run
    #[serde(default)]
    pub create_from_scratch: bool,

    /// Execute scripts statement by statement
    #[serde(default)]
    pub script_single_step_mode: bool,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl DatabaseConfigurationContext {
    /// Minimal configuration with defaults for everything else
    pub fn new(basic_database_name: impl Into<String>) -> Self {
        Self {
            database_engine_code: default_engine_code(),
            host: default_host(),
            port: default_port(),
            basic_database_name: basic_database_name.into(),
            database_kind: None,
            owner: default_owner(),
            password: None,
            admin_user: default_admin_user(),
            admin_password: None,
            admin_database: default_admin_database(),
            script_folder: default_script_folder(),
            working_directory: default_working_directory(),
            create_from_scratch: false,
            script_single_step_mode: false,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Load configuration from a `.json` or `.toml` file
    pub fn load(path: &Path) -> MigrationResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| MigrationError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_toml = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config: Self = if is_toml {
            toml::from_str(&content).map_err(|e| MigrationError::InvalidConfiguration {
                details: format!("  - {:?}: {}", path, e),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| MigrationError::InvalidConfiguration {
                details: format!("  - {:?}: {}", path, e),
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, reporting every problem at once
    pub fn validate(&self) -> MigrationResult<()> {
        let mut validator = ConfigValidator::new();
        validator
            .validate_non_empty("database_engine_code", &self.database_engine_code)
            .validate_non_empty("host", &self.host)
            .validate_port("port", self.port)
            .validate_identifier("basic_database_name", &self.basic_database_name)
            .validate_identifier("database_name", &self.database_name())
            .validate_identifier("owner", &self.owner)
            .validate_identifier("admin_user", &self.admin_user)
            .validate_identifier("admin_database", &self.admin_database)
            .validate_is_directory("working_directory", &self.working_directory)
            .validate_range(
                "connect_timeout_secs",
                i64::try_from(self.connect_timeout_secs).unwrap_or(i64::MAX),
                1,
                3600,
            );
        if let Some(kind) = &self.database_kind {
            validator.validate_identifier("database_kind", kind);
        }

        validator
            .finish()
            .map_err(|errors| MigrationError::InvalidConfiguration {
                details: format_validation_errors(&errors),
            })
    }

    /// `<basic_database_name>_<database_kind>`, or just the basic name
    pub fn database_name(&self) -> String {
        match &self.database_kind {
            Some(kind) if !kind.is_empty() => format!("{}_{}", self.basic_database_name, kind),
            _ => self.basic_database_name.clone(),
        }
    }

    /// Folder that script paths are resolved against
    pub fn script_root(&self) -> PathBuf {
        self.working_directory.join(&self.script_folder)
    }
}
