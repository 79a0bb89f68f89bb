//! CLI argument definitions using clap
//!
//! Commands:
//! - dbmigration migrate --config <path> --version <v>
//! - dbmigration status --config <path>
//! - dbmigration drop --config <path>
//! - dbmigration dependents --config <path> --table <name>...
//! - dbmigration mark-dump --config <path> --version <v>
//! - dbmigration new-migration --config <path> [--from <v>]
//! - dbmigration format-script <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Versioned SQL schema migrations
#[derive(Parser, Debug)]
#[command(name = "dbmigration")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database or migrate it to a version
    Migrate {
        /// Path to configuration file (.json or .toml)
        #[arg(long, default_value = "./dbmigration.toml")]
        config: PathBuf,

        /// Target version, e.g. 042
        #[arg(long)]
        version: String,

        /// Drop and recreate the database
        #[arg(long)]
        create_from_scratch: bool,

        /// Execute scripts statement by statement
        #[arg(long)]
        single_step: bool,
    },

    /// Print the version log
    Status {
        #[arg(long, default_value = "./dbmigration.toml")]
        config: PathBuf,
    },

    /// Drop the database if it exists
    Drop {
        #[arg(long, default_value = "./dbmigration.toml")]
        config: PathBuf,
    },

    /// List the tables that depend on the given tables through foreign keys
    Dependents {
        #[arg(long, default_value = "./dbmigration.toml")]
        config: PathBuf,

        /// Root table, may be repeated
        #[arg(long = "table", required = true)]
        tables: Vec<String>,
    },

    /// Mark the dump folder of a version as restorable
    MarkDump {
        #[arg(long, default_value = "./dbmigration.toml")]
        config: PathBuf,

        #[arg(long)]
        version: String,
    },

    /// Create the next migration script skeleton
    NewMigration {
        #[arg(long, default_value = "./dbmigration.toml")]
        config: PathBuf,

        /// Version to migrate from (default: latest known version)
        #[arg(long)]
        from: Option<String>,
    },

    /// Write a canonically ordered copy of a SQL script to <path>.formatted
    FormatScript {
        /// Script to format
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from([
            "dbmigration",
            "migrate",
            "--config",
            "db.toml",
            "--version",
            "004",
            "--single-step",
        ])
        .unwrap();

        match cli.command {
            Command::Migrate {
                config,
                version,
                create_from_scratch,
                single_step,
            } => {
                assert_eq!(config, PathBuf::from("db.toml"));
                assert_eq!(version, "004");
                assert!(!create_from_scratch);
                assert!(single_step);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_dependents_with_repeated_tables() {
        let cli = Cli::try_parse_from([
            "dbmigration",
            "dependents",
            "--table",
            "samples",
            "--table",
            "experiments",
        ])
        .unwrap();

        match cli.command {
            Command::Dependents { tables, .. } => assert_eq!(tables, vec!["samples", "experiments"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_dependents_requires_a_table() {
        assert!(Cli::try_parse_from(["dbmigration", "dependents"]).is_err());
    }

    #[test]
    fn test_parse_format_script() {
        let cli = Cli::try_parse_from(["dbmigration", "format-script", "schema-001.sql"]).unwrap();
        assert!(matches!(cli.command, Command::FormatScript { path } if path == PathBuf::from("schema-001.sql")));
    }
}
