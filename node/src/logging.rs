//! # Structured Logging
//!
//! Initializes the `tracing` subscriber from the `--log-format` flag:
//! pretty-printed output for humans, JSON lines for log aggregation.
//! Filtering follows `RUST_LOG` when set, the provided default otherwise.
//!
//! Log output goes to stderr so stdout stays free for anything piped
//! through the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber. Call exactly once, early in
/// `main()` — a second call panics.
///
/// `default_level` applies when `RUST_LOG` is unset; typical values are
/// `"info"` or `"murmur_node=debug,murmur_protocol=debug"`. Any `format`
/// other than `"json"` means pretty output.
pub fn init_logging(default_level: &str, format: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    tracing::debug!(format, "logging initialized");
}
