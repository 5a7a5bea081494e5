//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the configured level; `verbose` bumps the configured
/// level to `debug`.
pub fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}
