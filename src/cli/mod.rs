//! Command line interface for the migration engine

pub mod args;
pub mod commands;
pub mod errors;

pub use args::{Cli, Command};
pub use commands::{run, run_with};
pub use errors::{CliError, CliResult};
