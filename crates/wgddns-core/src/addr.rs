//! Address utilities
//!
//! Pure helpers the reconciliation engine calls inline: comparing addresses
//! while ignoring ports, picking a replacement address by family and
//! rendering addresses for log lines.

use crate::traits::PeerEndpoint;
use std::net::SocketAddr;

/// Placeholder used in log lines when an address cannot be rendered
pub const UNAVAILABLE: &str = "(N/A)";

/// Address family of a peer endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// No endpoint configured yet
    Unspecified,
    /// IPv4
    V4,
    /// IPv6
    V6,
    /// Anything else the control plane reported
    Other(u16),
}

impl AddressFamily {
    /// Family of a peer endpoint as reported by the control plane
    pub fn of_endpoint(endpoint: &PeerEndpoint) -> Self {
        match endpoint {
            PeerEndpoint::Unset => Self::Unspecified,
            PeerEndpoint::Inet(addr) => Self::of(addr),
            PeerEndpoint::Unsupported { family } => Self::Other(*family),
        }
    }

    /// Family of a socket address
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::V4,
            SocketAddr::V6(_) => Self::V6,
        }
    }
}

/// Same family and same address bytes. The port is ignored.
///
/// An IPv4 address never equals its v4-mapped IPv6 form.
pub fn addresses_equal(a: &SocketAddr, b: &SocketAddr) -> bool {
    match (a, b) {
        (SocketAddr::V4(a), SocketAddr::V4(b)) => a.ip().octets() == b.ip().octets(),
        (SocketAddr::V6(a), SocketAddr::V6(b)) => a.ip().octets() == b.ip().octets(),
        _ => false,
    }
}

/// [`addresses_equal`] for an endpoint that may be unset or of a foreign family.
pub fn endpoint_matches(endpoint: &PeerEndpoint, addr: &SocketAddr) -> bool {
    match endpoint {
        PeerEndpoint::Inet(current) => addresses_equal(current, addr),
        PeerEndpoint::Unset | PeerEndpoint::Unsupported { .. } => false,
    }
}

/// First address of the preferred family, falling back to the first address.
///
/// Returns `None` only when `addresses` is empty.
pub fn select_preferred(prefer_v4: bool, addresses: &[SocketAddr]) -> Option<SocketAddr> {
    addresses
        .iter()
        .find(|addr| addr.is_ipv4() == prefer_v4)
        .or_else(|| addresses.first())
        .copied()
}

/// Canonical text form of the endpoint address, without the port.
pub fn format_address(endpoint: &PeerEndpoint) -> Option<String> {
    match endpoint {
        PeerEndpoint::Inet(addr) => Some(addr.ip().to_string()),
        PeerEndpoint::Unset | PeerEndpoint::Unsupported { .. } => None,
    }
}

/// Like [`format_address`], degrading to [`UNAVAILABLE`].
pub fn display_address(endpoint: &PeerEndpoint) -> String {
    format_address(endpoint).unwrap_or_else(|| UNAVAILABLE.to_string())
}
