// src/logging.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "SIGNALS_LOG_FORMAT";
const DEFAULT_FILTER: &str = "news_signals=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `SIGNALS_LOG_FORMAT=json` switches to JSON lines. Logs go to stderr so the
/// CLI's stdout stays clean. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    // Already installed (e.g. by a test harness).
    let _ = res;
}
