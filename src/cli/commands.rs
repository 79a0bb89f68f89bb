//! CLI command implementations
//!
//! Every command prints one JSON document to stdout. Failures are returned
//! to `main`, which prints them to stderr and exits non-zero.

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use crate::backend::EngineRegistry;
use crate::config::DatabaseConfigurationContext;
use crate::migrations::{
    create_or_migrate_database, LogEntry, MigrationError, MigrationGenerator, MigrationResult,
};
use crate::script::{ScriptFormatter, ScriptProvider, SqlScriptProvider};
use crate::version::DatabaseVersion;

use super::args::{Cli, Command};
use super::errors::CliResult;

/// Run a parsed command line against the built-in engines
pub fn run(cli: Cli) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with(cli.command, &EngineRegistry::with_defaults(), &mut out)
}

/// Run `command` with the engines in `registry`, writing JSON to `out`
pub fn run_with(command: Command, registry: &EngineRegistry, out: &mut dyn Write) -> CliResult<()> {
    let response = match command {
        Command::Migrate {
            config,
            version,
            create_from_scratch,
            single_step,
        } => {
            let mut context = load(&config)?;
            context.create_from_scratch |= create_from_scratch;
            context.script_single_step_mode |= single_step;
            let version = parse_version(&version)?;
            serde_json::to_value(create_or_migrate_database(&context, registry, &version)?)?
        }
        Command::Status { config } => status(&load(&config)?, registry)?,
        Command::Drop { config } => {
            let context = load(&config)?;
            let daos = registry.dao_factory(&context)?;
            daos.admin().drop_database()?;
            json!({ "database": daos.admin().database_name(), "dropped": true })
        }
        Command::Dependents { config, tables } => {
            let context = load(&config)?;
            let daos = registry.dao_factory(&context)?;
            let definition = daos.admin().database_definition()?;
            let roots: Vec<&str> = tables.iter().map(String::as_str).collect();
            let dependents: Vec<&str> = definition
                .tables_depending_on(&roots)
                .map_err(MigrationError::from)?
                .into_iter()
                .map(|table| table.table_name())
                .collect();
            json!({ "tables": tables, "dependents": dependents })
        }
        Command::MarkDump { config, version } => {
            let context = load(&config)?;
            let version = parse_version(&version)?;
            let scripts = SqlScriptProvider::from_context(&context);
            scripts.mark_as_dump_restorable(&version)?;
            json!({
                "version": version,
                "dump_folder": scripts.dump_folder(&version),
            })
        }
        Command::NewMigration { config, from } => {
            let context = load(&config)?;
            let from = from.as_deref().map(parse_version).transpose()?;
            let path = MigrationGenerator::from_context(&context).create(from.as_ref())?;
            json!({ "created": path })
        }
        Command::FormatScript { path } => {
            let formatted = ScriptFormatter::new()?.format_file(&path)?;
            json!({ "formatted": formatted })
        }
    };

    write_response(out, &response)
}

fn load(config: &Path) -> MigrationResult<DatabaseConfigurationContext> {
    DatabaseConfigurationContext::load(config)
}

fn parse_version(version: &str) -> MigrationResult<DatabaseVersion> {
    Ok(DatabaseVersion::parse(version)?)
}

#[derive(Serialize)]
struct StatusReport {
    database: String,
    url: String,
    provisioned: bool,
    current_version: Option<String>,
    entries: Vec<LogEntry>,
}

fn status(
    context: &DatabaseConfigurationContext,
    registry: &EngineRegistry,
) -> CliResult<Value> {
    let daos = registry.dao_factory(context)?;
    let log = daos.version_log();
    let provisioned = log.can_connect()?;

    let (current_version, entries) = if provisioned {
        let current = log.last_successful_entry()?.map(|e| e.version);
        // Script texts would drown the listing.
        let entries = log
            .entries()?
            .into_iter()
            .map(|entry| LogEntry {
                module_code: None,
                ..entry
            })
            .collect();
        (current, entries)
    } else {
        (None, Vec::new())
    };

    Ok(serde_json::to_value(StatusReport {
        database: daos.admin().database_name().to_string(),
        url: daos.admin().database_url(),
        provisioned,
        current_version,
        entries,
    })?)
}

fn write_response(out: &mut dyn Write, response: &Value) -> CliResult<()> {
    serde_json::to_writer_pretty(&mut *out, response)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{InMemoryEngine, InMemoryServer};
    use crate::tables::{DatabaseDefinition, TableColumnDefinition, TableDefinition};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        config: PathBuf,
        server: InMemoryServer,
        registry: EngineRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = dir.path().join("db.json");
            let content = json!({
                "database_engine_code": "memory",
                "basic_database_name": "lims",
                "database_kind": "cli",
                "owner": "lims",
                "working_directory": dir.path(),
            });
            fs::write(&config, content.to_string()).unwrap();

            let schema = dir.path().join("sql/generic/001/schema-001.sql");
            fs::create_dir_all(schema.parent().unwrap()).unwrap();
            fs::write(&schema, "CREATE TABLE samples (id BIGINT PRIMARY KEY);").unwrap();

            let server = InMemoryServer::new();
            let registry = EngineRegistry::new().with(Arc::new(InMemoryEngine::new(server.clone())));
            Self {
                dir,
                config,
                server,
                registry,
            }
        }

        fn run(&self, command: Command) -> CliResult<Value> {
            let mut out = Vec::new();
            run_with(command, &self.registry, &mut out)?;
            Ok(serde_json::from_slice(&out).unwrap())
        }

        fn migrate(&self, version: &str) -> CliResult<Value> {
            self.run(Command::Migrate {
                config: self.config.clone(),
                version: version.to_string(),
                create_from_scratch: false,
                single_step: false,
            })
        }
    }

    #[test]
    fn test_migrate_and_status() {
        let fixture = Fixture::new();

        let report = fixture.migrate("001").unwrap();
        assert_eq!(report["final_state"], "up_to_date");
        assert_eq!(report["applied"].as_array().unwrap().len(), 1);

        let status = fixture
            .run(Command::Status {
                config: fixture.config.clone(),
            })
            .unwrap();
        assert_eq!(status["database"], "lims_cli");
        assert_eq!(status["provisioned"], true);
        assert_eq!(status["current_version"], "001");
        assert_eq!(status["entries"][0]["run_status"], "SUCCESS");
        assert!(status["entries"][0].get("module_code").is_none());
    }

    #[test]
    fn test_status_of_missing_database() {
        let fixture = Fixture::new();
        let status = fixture
            .run(Command::Status {
                config: fixture.config.clone(),
            })
            .unwrap();
        assert_eq!(status["provisioned"], false);
        assert!(status["current_version"].is_null());
    }

    #[test]
    fn test_invalid_version_is_configuration_error() {
        let fixture = Fixture::new();
        let err = fixture.migrate("1a").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_dependents_and_drop() {
        let fixture = Fixture::new();
        fixture.migrate("001").unwrap();

        let mut definition = DatabaseDefinition::new();
        let mut samples = TableDefinition::new("samples");
        samples
            .add_column(TableColumnDefinition::new("samples", "id", "bigint").primary_key())
            .unwrap();
        let mut data_sets = TableDefinition::new("data_sets");
        data_sets
            .add_column(TableColumnDefinition::new("data_sets", "samp_id", "bigint"))
            .unwrap();
        definition.add_table(samples);
        definition.add_table(data_sets);
        definition.connect("samples", "id", "data_sets", "samp_id").unwrap();
        fixture.server.set_database_definition("lims_cli", definition);

        let response = fixture
            .run(Command::Dependents {
                config: fixture.config.clone(),
                tables: vec!["samples".to_string()],
            })
            .unwrap();
        assert_eq!(response["dependents"], json!(["data_sets"]));

        let response = fixture
            .run(Command::Drop {
                config: fixture.config.clone(),
            })
            .unwrap();
        assert_eq!(response["dropped"], true);
        assert!(!fixture.server.has_database("lims_cli"));
    }

    #[test]
    fn test_new_migration_and_mark_dump() {
        let fixture = Fixture::new();

        let response = fixture
            .run(Command::NewMigration {
                config: fixture.config.clone(),
                from: None,
            })
            .unwrap();
        let created = PathBuf::from(response["created"].as_str().unwrap());
        assert!(created.ends_with("sql/memory/migration/migration-001-002.sql"));
        assert!(created.is_file());

        fixture
            .run(Command::MarkDump {
                config: fixture.config.clone(),
                version: "002".to_string(),
            })
            .unwrap();
        assert!(fixture
            .dir
            .path()
            .join("sql/memory/002/.DUMP_RESTORABLE")
            .is_file());
    }

    #[test]
    fn test_format_script() {
        let fixture = Fixture::new();
        let script = fixture.dir.path().join("script.sql");
        fs::write(&script, "INSERT INTO a VALUES (1);\nCREATE TABLE a (id INT);\n").unwrap();

        let response = fixture.run(Command::FormatScript { path: script.clone() }).unwrap();
        let formatted = PathBuf::from(response["formatted"].as_str().unwrap());
        assert_eq!(formatted, PathBuf::from(format!("{}.formatted", script.display())));
        assert!(formatted.is_file());
    }
}
