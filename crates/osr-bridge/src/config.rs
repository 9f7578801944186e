//! Bridge and browser configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Highest windowless frame rate accepted by [`BridgeConfig::validate`].
pub const MAX_FRAME_RATE: u32 = 240;

/// Settings for the render bridge and the offscreen browser it serves.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound on the copy-completion spin-wait, in milliseconds.
    /// `0` waits without bound.
    pub fence_timeout_ms: u64,

    /// Turn on the device's multithread protection on every bind.
    pub multithread_protection: bool,

    /// Reported to the browser through `screen_info`.
    pub device_scale_factor: f32,

    /// Frames per second requested from the browser.
    pub windowless_frame_rate: u32,

    pub default_encoding: String,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fence_timeout_ms: 2000,
            multithread_protection: true,
            device_scale_factor: 1.0,
            windowless_frame_rate: 60,
            default_encoding: "UTF-8".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid bridge config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.device_scale_factor.is_finite() && self.device_scale_factor > 0.0) {
            bail!(
                "device_scale_factor must be positive, got {}",
                self.device_scale_factor
            );
        }
        if !(1..=MAX_FRAME_RATE).contains(&self.windowless_frame_rate) {
            bail!(
                "windowless_frame_rate must be within 1..={MAX_FRAME_RATE}, got {}",
                self.windowless_frame_rate
            );
        }
        if self.default_encoding.trim().is_empty() {
            bail!("default_encoding must not be empty");
        }
        Ok(())
    }

    pub fn fence_timeout(&self) -> Option<Duration> {
        (self.fence_timeout_ms > 0).then(|| Duration::from_millis(self.fence_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.fence_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        let config = BridgeConfig::from_json(r#"{ "fence_timeout_ms": 0 }"#).unwrap();
        assert_eq!(config.fence_timeout(), None);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(BridgeConfig::from_json(r#"{ "windowless_frame_rate": 0 }"#).is_err());
        assert!(BridgeConfig::from_json(r#"{ "windowless_frame_rate": 241 }"#).is_err());
        assert!(BridgeConfig::from_json(r#"{ "device_scale_factor": -1.0 }"#).is_err());
        assert!(BridgeConfig::from_json(r#"{ "default_encoding": " " }"#).is_err());
        assert!(BridgeConfig::from_json("not json").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BridgeConfig::load(Path::new("/nonexistent/osr-bridge.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
