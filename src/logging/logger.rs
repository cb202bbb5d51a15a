// file: src/logging/logger.rs
// version: 1.0.1
// guid: 4f7d9b2e-81c5-4a3f-9e64-d20c5a7f8b13

//! Logger initialization and configuration

use crate::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| crate::error::InstallError::config(format!("Failed to initialize logger: {}", e)))?;

    Ok(())
}
