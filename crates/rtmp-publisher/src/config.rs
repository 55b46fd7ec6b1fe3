use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// How video frame NAL data is laid out after the 5-byte video tag header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NalFraming {
    /// Every Annex-B NAL unit has its start code replaced by a 4-byte
    /// big-endian length, matching the `lengthSizeMinusOne = 3` declared in
    /// the AVC sequence header.
    #[default]
    LengthPrefixed,
    /// One 4-byte length covering the caller's bytes, start codes included.
    /// Only for peers that were built against that layout.
    Verbatim,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublisherConfigInput {
    pub connect_timeout_ms: Option<u64>,
    pub nal_framing: Option<NalFraming>,
    pub tcp_nodelay: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Upper bound on the TCP connect in `open_url`.
    pub connect_timeout: Duration,
    pub nal_framing: NalFraming,
    pub tcp_nodelay: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nal_framing: NalFraming::default(),
            tcp_nodelay: true,
        }
    }
}

impl PublisherConfigInput {
    pub fn resolve(self) -> Result<PublisherConfig, ConfigError> {
        let defaults = PublisherConfig::default();
        let connect_timeout = match self.connect_timeout_ms {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "connect_timeout_ms must be greater than zero".into(),
                ))
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.connect_timeout,
        };

        Ok(PublisherConfig {
            connect_timeout,
            nal_framing: self.nal_framing.unwrap_or(defaults.nal_framing),
            tcp_nodelay: self.tcp_nodelay.unwrap_or(defaults.tcp_nodelay),
        })
    }
}

impl PublisherConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(PublisherConfig::default());
        }
        let parsed: PublisherConfigInput = toml::from_str(input)
            .map_err(|e| ConfigError::Invalid(format!("invalid config TOML: {}", e)))?;
        parsed.resolve()
    }
}
