//! Configuration types for the WireGuard DDNS system
//!
//! The daemon builds a [`ReconcileConfig`] once at startup; the engine and
//! driver only ever see an immutable snapshot of it.

use crate::key::PeerKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default poll interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Longest interface name Linux accepts (IFNAMSIZ minus the NUL)
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Main reconciliation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// WireGuard interface name (e.g., "wg0")
    pub device: String,

    /// Public key of the peer whose endpoint is managed
    pub peer_key: PeerKey,

    /// Hostname that tracks the peer's address
    pub hostname: String,

    /// Port written into the endpoint on every update
    pub port: u16,

    /// Operator address family preference, reported at startup
    #[serde(default)]
    pub preference: IpVersionPreference,

    /// Delay between cycles (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Log every resolved address list
    #[serde(default)]
    pub verbose: bool,
}

impl ReconcileConfig {
    /// Create a configuration with default interval and no preference
    pub fn new(
        device: impl Into<String>,
        peer_key: PeerKey,
        hostname: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            device: device.into(),
            peer_key,
            hostname: hostname.into(),
            port,
            preference: IpVersionPreference::default(),
            interval_ms: DEFAULT_INTERVAL_MS,
            verbose: false,
        }
    }

    /// Set the address family preference
    pub fn with_preference(mut self, preference: IpVersionPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Set the poll interval
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Enable or disable verbose cycle logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Load a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Poll interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_interface_name(&self.device)?;
        validate_hostname(&self.hostname)?;

        if self.port == 0 {
            return Err(crate::Error::config("Peer port must be between 1 and 65535"));
        }

        if self.interval_ms == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }

        Ok(())
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn validate_interface_name(name: &str) -> Result<(), crate::Error> {
    if name.is_empty() {
        return Err(crate::Error::config("WireGuard device name cannot be empty"));
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(crate::Error::config(format!(
            "WireGuard device name too long: {} bytes (max {})",
            name.len(),
            MAX_INTERFACE_NAME_LEN
        )));
    }

    if name.contains('/') || name.chars().any(char::is_whitespace) || name == "." || name == ".." {
        return Err(crate::Error::config(format!(
            "Invalid WireGuard device name: '{}'",
            name
        )));
    }

    Ok(())
}

fn validate_hostname(hostname: &str) -> Result<(), crate::Error> {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);

    if name.is_empty() {
        return Err(crate::Error::config("Peer hostname cannot be empty"));
    }

    // RFC 1035: 253 chars total, 63 per label
    if name.len() > 253 {
        return Err(crate::Error::config(format!(
            "Peer hostname too long: {} chars (max 253)",
            name.len()
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Peer hostname has empty label: '{}'",
                hostname
            )));
        }
        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Peer hostname label too long: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// Operator's address family preference
///
/// Reported in the startup log. Endpoint selection itself follows the
/// family of the peer's current endpoint, IPv4 first when it is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpVersionPreference {
    /// No explicit preference
    #[default]
    None,
    /// IPv4 first
    PreferV4,
    /// IPv6 first
    PreferV6,
}

impl IpVersionPreference {
    /// Stable name used in logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersionPreference::None => "none",
            IpVersionPreference::PreferV4 => "prefer-v4",
            IpVersionPreference::PreferV6 => "prefer-v6",
        }
    }
}

impl fmt::Display for IpVersionPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersionPreference {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(IpVersionPreference::None),
            "prefer-v4" | "v4" | "ipv4" => Ok(IpVersionPreference::PreferV4),
            "prefer-v6" | "v6" | "ipv6" => Ok(IpVersionPreference::PreferV6),
            other => Err(crate::Error::config(format!(
                "Unknown address preference '{}'. Valid: none, prefer-v4, prefer-v6",
                other
            ))),
        }
    }
}
