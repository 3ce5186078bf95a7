//! Logging setup for the compositor binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `configured`; invalid directives in either are
/// skipped. Calling this twice is harmless.
pub fn init_logging(configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::builder().parse_lossy(configured));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
