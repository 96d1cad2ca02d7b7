//! Subscriber setup for binaries and tests embedding the handlers
//!
//! Handler activity logs under the `coin_handlers` target (`coin_handlers::registry`,
//! `coin_handlers::backends::bitcoind::manager`, ...). Daemon client crates stay at `warn`
//! unless `RUST_LOG` asks for more.

use tracing_subscriber::{fmt, EnvFilter};

/// Env var selecting JSON log lines instead of pretty output.
pub const LOG_JSON_ENV: &str = "COIN_HANDLERS_LOG_JSON";

/// Filter used when `RUST_LOG` is unset or unparsable: registry and backend events at
/// `info`, everything else (RPC transport, HTTP client) at `warn`.
pub const DEFAULT_FILTER: &str = "warn,coin_handlers=info";

/// Install a stderr subscriber filtered by `RUST_LOG`, else [`DEFAULT_FILTER`]. Later calls are no-ops.
pub fn init_logging() {
    let env_filter = filter_for(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    let use_json = std::env::var(LOG_JSON_ENV)
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .pretty()
            .with_writer(std::io::stderr)
            .try_init();
    }
}

fn filter_for(spec: Option<&str>) -> EnvFilter {
    spec.filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_crate() {
        let filter = filter_for(None).to_string();
        assert!(filter.contains("coin_handlers=info"), "{}", filter);
        assert!(filter.contains("warn"), "{}", filter);
        assert_eq!(filter_for(Some("  ")).to_string(), filter);
    }

    #[test]
    fn test_rust_log_wins_when_valid() {
        assert!(filter_for(Some("coin_handlers=debug")).to_string().contains("coin_handlers=debug"));
        let fallback = filter_for(Some("coin_handlers=loud")).to_string();
        assert!(fallback.contains("coin_handlers=info"), "{}", fallback);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging();
        init_logging();
        tracing::info!(target: "coin_handlers", "logging initialised");
    }
}
