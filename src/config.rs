use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Engine-wide scan limits, overridable through `SCANNER_*` environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub max_depth_quick: usize,
    pub max_pages_quick: usize,
    pub max_depth_full: usize,
    pub max_pages_full: usize,
    /// Per-host minimum inter-request delay in seconds. The throttle clamps
    /// this to a 2 s floor regardless of what is configured.
    pub request_delay: f64,
    /// Crawler batch parallelism.
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth_quick: 2,
            max_pages_quick: 20,
            max_depth_full: 5,
            max_pages_full: 100,
            request_delay: 2.0,
            concurrency: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_depth_quick: env_or("SCANNER_MAX_DEPTH_QUICK", d.max_depth_quick),
            max_pages_quick: env_or("SCANNER_MAX_PAGES_QUICK", d.max_pages_quick),
            max_depth_full: env_or("SCANNER_MAX_DEPTH_FULL", d.max_depth_full),
            max_pages_full: env_or("SCANNER_MAX_PAGES_FULL", d.max_pages_full),
            request_delay: env_or("SCANNER_REQUEST_DELAY", d.request_delay),
            concurrency: env_or("SCANNER_CONCURRENCY", d.concurrency),
        }
    }
}

/// Per-scan options, stored on the scan row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    #[serde(default)]
    pub include_subdomains: bool,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
    /// Overrides the engine-wide request delay when set.
    #[serde(default)]
    pub request_delay: Option<f64>,
}
