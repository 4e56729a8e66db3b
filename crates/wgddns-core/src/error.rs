//! Error types for the WireGuard DDNS system
//!
//! Every failure a reconciliation cycle can hit maps onto one variant here.
//! The driver branches on these variants to decide how loudly to log; no
//! variant ever terminates the polling loop.

use thiserror::Error;

/// Result type alias for wgddns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the WireGuard DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// The hostname has no address records (expected, quiet outcome)
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Name resolution infrastructure failure
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The WireGuard device does not exist
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The control plane rejected or failed an operation
    #[error("Control plane error: {0}")]
    ControlPlane(String),

    /// An address family other than IPv4/IPv6 was found where only those are possible
    #[error("Unsupported address family: {family}")]
    UnsupportedFamily {
        /// Raw family value reported by the control plane
        family: u16,
    },

    /// Malformed peer public key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a "host not found" error
    pub fn host_not_found(msg: impl Into<String>) -> Self {
        Self::HostNotFound(msg.into())
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a "device not found" error
    pub fn device_not_found(msg: impl Into<String>) -> Self {
        Self::DeviceNotFound(msg.into())
    }

    /// Create a control plane error
    pub fn control_plane(msg: impl Into<String>) -> Self {
        Self::ControlPlane(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The hostname simply has no records; not worth an error log.
    pub fn is_expected_absence(&self) -> bool {
        matches!(self, Self::HostNotFound(_))
    }

    /// Infrastructure failures that the next poll cycle retries implicitly.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Resolution(_) | Self::DeviceNotFound(_) | Self::ControlPlane(_)
        )
    }

    /// Defects: a state the type system says should be unreachable was observed.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::UnsupportedFamily { .. })
    }
}
