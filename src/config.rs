//! Configuration for railcan
//!
//! Centralized configuration with sensible defaults. Can be built in
//! code through [`ConfigBuilder`] or loaded from a JSON file; fields
//! missing from the file keep their defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RailError, Result};

/// Main configuration for a controller session
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Correlation tag stamped onto every outgoing message. Identifies
    /// this controller among others sharing the bus.
    pub hash: u16,

    // -------------------------------------------------------------------------
    // Exchange Configuration
    // -------------------------------------------------------------------------
    /// Reply timeout for interactive operations (milliseconds)
    pub default_timeout_ms: u64,

    /// Reply timeout for configuration read/write (milliseconds)
    pub config_timeout_ms: u64,

    /// What the exchanger does between empty polls
    pub poll: PollStrategy,

    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// Settle time before the bring-up frame is sent (milliseconds)
    pub bringup_delay_ms: u64,

    /// How long a firmware version query collects replies (milliseconds)
    pub version_window_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// CAN-over-TCP gateway address (host:port)
    pub gateway_addr: String,

    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
}

/// Idle behaviour of the exchanger while no frame is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStrategy {
    /// Busy-wait with a spin hint (constrained targets without a scheduler)
    Spin,

    /// Yield the thread to the OS scheduler between polls
    Yield,

    /// Sleep for a fixed interval between polls
    Sleep { micros: u64 },
}

impl PollStrategy {
    /// Longest idle pause between two polls
    ///
    /// The exchanger notices an expired deadline at most one granularity
    /// plus one poll iteration late. `Spin` and `Yield` never pause, so
    /// their granularity is zero and only the poll iteration remains.
    pub fn granularity(&self) -> Duration {
        match self {
            PollStrategy::Spin | PollStrategy::Yield => Duration::ZERO,
            PollStrategy::Sleep { micros } => Duration::from_micros(*micros),
        }
    }
}

impl Default for PollStrategy {
    fn default() -> Self {
        PollStrategy::Sleep { micros: 100 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash: 0xdf24,
            default_timeout_ms: 1000,
            config_timeout_ms: 10_000,
            poll: PollStrategy::default(),
            bringup_delay_ms: 500,
            version_window_ms: 500,
            gateway_addr: "127.0.0.1:15731".to_string(),
            connect_timeout_ms: 3000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| match e {
            RailError::Config(msg) => RailError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse a config from a JSON string
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| RailError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the exchanger cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(RailError::Config(
                "default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.config_timeout_ms == 0 {
            return Err(RailError::Config(
                "config_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.gateway_addr.is_empty() {
            return Err(RailError::Config("gateway_addr must not be empty".to_string()));
        }
        Ok(())
    }

    /// Short timeout tier
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Long timeout tier (configuration access)
    pub fn config_timeout(&self) -> Duration {
        Duration::from_millis(self.config_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the correlation tag
    pub fn hash(mut self, hash: u16) -> Self {
        self.config.hash = hash;
        self
    }

    /// Set the short timeout tier (in milliseconds)
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.config.default_timeout_ms = ms;
        self
    }

    /// Set the long timeout tier (in milliseconds)
    pub fn config_timeout_ms(mut self, ms: u64) -> Self {
        self.config.config_timeout_ms = ms;
        self
    }

    /// Set the idle strategy between polls
    pub fn poll(mut self, poll: PollStrategy) -> Self {
        self.config.poll = poll;
        self
    }

    /// Set the bring-up settle delay (in milliseconds)
    pub fn bringup_delay_ms(mut self, ms: u64) -> Self {
        self.config.bringup_delay_ms = ms;
        self
    }

    /// Set the version query collection window (in milliseconds)
    pub fn version_window_ms(mut self, ms: u64) -> Self {
        self.config.version_window_ms = ms;
        self
    }

    /// Set the gateway address
    pub fn gateway_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.gateway_addr = addr.into();
        self
    }

    /// Set the TCP connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
