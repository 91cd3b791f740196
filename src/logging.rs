use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_ENV: &str = "ANDALUS_LOG";

/// Route tracing output to `path`. The terminal is in raw mode for the whole
/// session, so nothing may be written to stdout/stderr while it runs.
pub fn init(path: &Path, default_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    Registry::default()
        .with(env_filter)
        .with(file_layer)
        .try_init()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "andalus desktop starting");
    Ok(())
}
