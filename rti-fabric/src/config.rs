//! Configuration surface (§6 "Configuration surface").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::bundler::BundlerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCorrelatorConfig {
    #[serde(with = "humantime_serde_millis")]
    pub default_timeout: Duration,
}

impl Default for ResponseCorrelatorConfig {
    fn default() -> Self {
        ResponseCorrelatorConfig { default_timeout: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingQueueConfig {
    pub capacity: usize,
}

impl Default for OutgoingQueueConfig {
    fn default() -> Self {
        OutgoingQueueConfig { capacity: 1024 }
    }
}

/// Everything the core reads from configuration (§6); other options may
/// exist around this but these are load-bearing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bundler: BundlerConfig,
    pub response_correlator: ResponseCorrelatorConfig,
    pub outgoing_queue: OutgoingQueueConfig,
}

/// `Duration` as milliseconds, since the wire-facing config format is plain
/// JSON/TOML rather than humantime strings.
mod humantime_serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
