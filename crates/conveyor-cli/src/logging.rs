use tracing_subscriber::EnvFilter;

/// Set up the tracing subscriber for the CLI process.
///
/// An explicit `RUST_LOG` takes precedence; otherwise the `--log-level`
/// flag value becomes the filter directive.
pub fn init(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
