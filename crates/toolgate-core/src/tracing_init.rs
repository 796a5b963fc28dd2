//! Tracing/logging initialization for toolgate processes.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- filter used when `RUST_LOG` is not set
///   (e.g. `"toolgate_gateway=info"`).
/// * `log_json` -- emit structured JSON lines instead of the human-readable
///   format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Default filter for a binary: `<crate>=<level>` plus `toolgate_core`.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},toolgate_core={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_covers_both_crates() {
        assert_eq!(
            default_filter("toolgate_gateway", "debug"),
            "toolgate_gateway=debug,toolgate_core=debug"
        );
    }
}
