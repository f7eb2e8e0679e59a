use tracing_subscriber::EnvFilter;

use armada_core::config::LogConfig;

/// Install the global fmt subscriber. `RUST_LOG` overrides the configured
/// filter. Later calls are ignored.
pub fn init_tracing(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
