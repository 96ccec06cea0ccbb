use crate::infrastructure::error::InfraError;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE: &str = "clock.log";

/// Human-readable output on stderr plus JSON lines in `logs_dir/clock.log`.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(logs_dir: &Path) -> Result<(), InfraError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(LOG_FILE))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("logging already initialized: {error}")))
}
