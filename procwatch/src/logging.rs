//! Tracing setup for the `procwatch` binary.
//!
//! Environment variables:
//! - `RUST_LOG`: log filter (default: `warn`)
//! - `PROCWATCH_LOG_JSON`: emit JSON lines when set to `1` or `true`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Env var that switches log output to JSON.
pub const JSON_ENV: &str = "PROCWATCH_LOG_JSON";

fn json_requested(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true"))
}

/// Install the global subscriber. Logs always go to stderr so they never
/// mix with child output relayed on stdout.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let use_json = json_requested(std::env::var(JSON_ENV).ok().as_deref());

    let registry = tracing_subscriber::registry().with(env_filter);

    // A second init (e.g. from tests) is not an error worth surfacing.
    if use_json {
        let _ = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init();
    } else {
        let _ = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_requested() {
        assert!(json_requested(Some("1")));
        assert!(json_requested(Some("true")));
        assert!(!json_requested(Some("0")));
        assert!(!json_requested(None));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
