//! Flush Configuration
//!
//! Parameters the flushers consume but do not own. Loaded from environment
//! variables for 12-factor deployments, or from a TOML document:
//!
//! - `STATSD_PERSIST_COUNT_KEYS`: idle cycles a counter keeps emitting zeros (default: 60)
//! - `STATSD_DELETE_GAUGES`: drop gauges after each flush (default: false)
//! - `STATSD_POSTFIX`: suffix carried by timer bucket names (default: empty)
//! - `STATSD_FLUSH_INTERVAL_MS`: flush cycle period (default: 10000)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// Parameters for one aggregator's flush cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Idle cycles a counter keeps emitting zero lines before it is forgotten
    pub persist_count_keys: u32,
    /// Remove each gauge once emitted instead of re-emitting it every cycle
    pub delete_gauges: bool,
    /// Suffix stripped from timer bucket names and re-attached to derived names
    pub postfix: String,
    /// Period between flush cycles
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        FlushConfig {
            persist_count_keys: 60,
            delete_gauges: false,
            postfix: String::new(),
            flush_interval: Duration::from_secs(10),
        }
    }
}

impl FlushConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from a TOML document; missing keys take defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = FlushConfig::default();
        FlushConfig {
            persist_count_keys: var("STATSD_PERSIST_COUNT_KEYS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.persist_count_keys),
            delete_gauges: var("STATSD_DELETE_GAUGES")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.delete_gauges),
            postfix: var("STATSD_POSTFIX").unwrap_or(defaults.postfix),
            flush_interval: var("STATSD_FLUSH_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
        }
    }

    /// Logical timer name for a bucket: the bucket with the postfix removed.
    /// Buckets that do not carry the postfix are used as-is.
    pub fn strip_postfix<'a>(&self, bucket: &'a str) -> &'a str {
        bucket.strip_suffix(self.postfix.as_str()).unwrap_or(bucket)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
