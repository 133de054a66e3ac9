//! Runtime configuration

use crate::connectivity::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// NAT-PMP lifetime requested when the caller does not give one
pub const DEFAULT_LIFETIME_SECS: u32 = 3600;

/// Description stored with mappings when the caller does not give one
pub const DEFAULT_DESCRIPTION: &str = "gatewayctl port mapping";

/// Tunables for discovery, timeouts and defaults
///
/// Configuration can be loaded from a JSON file; any field left out keeps
/// its default value.
///
/// # Example
/// ```rust,no_run
/// use gatewayctl::config::Config;
///
/// let config = Config::load("gatewayctl.json").expect("Failed to load");
/// println!("Discovery window: {:?}", config.discovery_window());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// How long UPnP discovery collects answers, in milliseconds
    pub discovery_window_ms: u64,
    /// Upper bound on one UPnP control round trip, in milliseconds
    pub control_timeout_ms: u64,
    /// First NAT-PMP retransmission timeout; doubles per attempt
    pub natpmp_initial_timeout_ms: u64,
    /// NAT-PMP requests sent before giving up
    pub natpmp_max_attempts: u32,
    /// NAT-PMP gateway; the default route is used when unset
    pub natpmp_gateway: Option<IpAddr>,
    /// Description for new mappings
    pub default_description: String,
    /// NAT-PMP lifetime for new mappings, in seconds
    pub default_lifetime_secs: u32,
    /// Stop UPnP enumeration after this many entries
    pub max_list_entries: u32,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Returns the defaults when the file does not exist or is empty.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values that would make every operation fail
    pub fn validate(&self) -> Result<()> {
        if self.discovery_window_ms == 0 {
            return Err(Error::Config(
                "discovery_window_ms must be greater than 0".to_string(),
            ));
        }
        if self.control_timeout_ms == 0 {
            return Err(Error::Config(
                "control_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.natpmp_initial_timeout_ms == 0 {
            return Err(Error::Config(
                "natpmp_initial_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.natpmp_max_attempts == 0 {
            return Err(Error::Config(
                "natpmp_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_list_entries == 0 {
            return Err(Error::Config(
                "max_list_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// UPnP discovery window
    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    /// UPnP per-action timeout
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    /// NAT-PMP retransmission schedule
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_timeout: Duration::from_millis(self.natpmp_initial_timeout_ms),
            max_attempts: self.natpmp_max_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_window_ms: 200,
            control_timeout_ms: 5000,
            natpmp_initial_timeout_ms: 250,
            natpmp_max_attempts: 4,
            natpmp_gateway: None,
            default_description: DEFAULT_DESCRIPTION.to_string(),
            default_lifetime_secs: DEFAULT_LIFETIME_SECS,
            max_list_entries: 1024,
        }
    }
}
