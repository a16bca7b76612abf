use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log output format (`json` or `compact`).
pub const LOG_FORMAT_ENV: &str = "RELAY_LOG_FORMAT";

/// Initialize structured logging.
///
/// Configures:
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`), defaulting to
///   `info,gemini_relay=debug`.
/// - a compact `fmt` layer, or JSON lines when `RELAY_LOG_FORMAT=json`.
pub fn init() {
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gemini_relay=debug"));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter_layer);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}
