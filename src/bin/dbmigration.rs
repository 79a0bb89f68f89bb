//! dbmigration command line entry point

use clap::Parser;
use dbmigration::cli::{self, Cli};
use dbmigration::logging::init_tracing;

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = cli::run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
