use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global tracing subscriber for applications embedding the core.
///
/// `RUST_LOG` takes precedence over `default_filter`. Captured child output
/// is logged at debug level under the `compat_proc::output` target, so
/// `compat_proc::output=debug` turns it on. Fails if a subscriber is
/// already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}
