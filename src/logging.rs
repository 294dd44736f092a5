use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the diagnostic subscriber. Output goes to stderr so job status
/// lines on stdout are never interleaved with log records.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
