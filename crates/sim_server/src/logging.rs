//! Logging setup for the simulation host
//
// `RUST_LOG` wins when set. Otherwise the configured filter is used, or
// `debug` when running verbose.

use tracing_subscriber::EnvFilter;

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(verbose: bool, configured: &str) -> String {
    if verbose {
        "debug".to_string()
    } else if configured.trim().is_empty() {
        "info".to_string()
    } else {
        configured.to_string()
    }
}

/// Install the global `tracing` subscriber
pub fn init(verbose: bool, configured: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(verbose, configured))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))
}
