//! Tracing setup for the command line tool.
//!
//! Logs go to stderr so stdout stays a clean JSON document. The filter is
//! taken from `RUST_LOG` when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "dbmigration=info";

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
    if let Err(e) = installed {
        // Only fails when a global subscriber exists already; that one stays.
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}
