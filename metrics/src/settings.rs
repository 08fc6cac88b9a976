//! File-based instrumentation settings.
//!
//! ```toml
//! pool_name = "sessions"
//! slow_threshold_ms = 250
//!
//! [attributes]
//! "service.name" = "api"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Declarative subset of [`Options`](crate::Options), loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Pool identity for single-node clients. Ignored for rings and clusters.
    #[serde(default)]
    pub pool_name: Option<String>,

    /// Commands at or above this duration are logged at warn level.
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,

    /// Extra labels added to every series.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_slow_threshold_ms() -> u64 {
    1000
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            pool_name: None,
            slow_threshold_ms: default_slow_threshold_ms(),
            attributes: BTreeMap::new(),
        }
    }
}

impl MetricsSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}
