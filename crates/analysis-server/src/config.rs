//
// config.rs
//
// Server configuration
//

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;

/// Runtime settings for the worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// How long the worker blocks in `take` before checking for shutdown
    pub poll_interval_ms: u64,
    /// Operations slower than this are reported by the perf guard in verbose mode
    pub perf_threshold_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            perf_threshold_ms: 50,
        }
    }
}

impl ServerConfig {
    /// The worker's `take` timeout; never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Reads a JSON settings file, see [`parse_server_config`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let settings: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in config {}", path.display()))?;
        Ok(parse_server_config(&settings))
    }
}

/// Builds a [`ServerConfig`] from camelCase JSON settings.
///
/// Missing or mistyped keys keep their defaults:
///
/// ```
/// let settings = serde_json::json!({ "pollIntervalMs": 25 });
/// let config = analysis_server::config::parse_server_config(&settings);
/// assert_eq!(config.poll_interval_ms, 25);
/// assert_eq!(config.perf_threshold_ms, 50);
/// ```
pub fn parse_server_config(settings: &serde_json::Value) -> ServerConfig {
    let mut config = ServerConfig::default();

    if let Some(v) = settings.get("pollIntervalMs").and_then(|v| v.as_u64()) {
        config.poll_interval_ms = v;
    }
    if let Some(v) = settings.get("perfThresholdMs").and_then(|v| v.as_u64()) {
        config.perf_threshold_ms = v;
    }

    config
}
