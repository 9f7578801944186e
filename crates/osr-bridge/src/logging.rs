//! Process-wide tracing subscriber.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Install a fmt subscriber filtered by `RUST_LOG`, or by the config's
/// `log_filter` when the variable is unset or invalid.
///
/// Only the first call does anything. Returns whether a subscriber from this
/// crate is active (`false` if the host had already installed its own).
pub fn init(config: &BridgeConfig) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.log_filter);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    })
}

/// First valid directive of `env` and `configured`, else `info`.
fn build_filter(env: Option<&str>, configured: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_applies_without_env() {
        let filter = build_filter(None, "osr_bridge=trace");
        assert_eq!(filter.to_string(), "osr_bridge=trace");
    }

    #[test]
    fn env_overrides_configured_filter() {
        let filter = build_filter(Some("gpu_interop=debug"), "osr_bridge=trace");
        assert_eq!(filter.to_string(), "gpu_interop=debug");
    }

    #[test]
    fn invalid_directives_fall_back() {
        let filter = build_filter(Some("not a ==== filter"), "osr_bridge=warn");
        assert_eq!(filter.to_string(), "osr_bridge=warn");

        let filter = build_filter(None, "not a ==== filter");
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn repeated_init_is_stable() {
        let first = init(&BridgeConfig {
            log_filter: "debug".to_string(),
            ..BridgeConfig::default()
        });
        assert_eq!(init(&BridgeConfig::default()), first);
    }
}
