// # Control Plane Trait
//
// Defines the interface to the local WireGuard configuration surface.
//
// ## Implementations
//
// - Kernel / userspace WireGuard: `wgddns-control-wg` crate
// - Test doubles: `tests/common`
//
// ## Handle lifetime
//
// `open_device` returns a handle holding a snapshot of the device's peers.
// The handle is the only way to write an endpoint back, and dropping it
// releases whatever the implementation acquired. The engine opens one handle
// per cycle and never keeps it past the cycle.

use crate::key::PeerKey;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Endpoint currently configured for a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEndpoint {
    /// No endpoint has been assigned yet
    Unset,
    /// An IPv4 or IPv6 endpoint
    Inet(SocketAddr),
    /// The control plane reported an address family this daemon cannot handle
    Unsupported {
        /// Raw `sa_family` value
        family: u16,
    },
}

impl PeerEndpoint {
    /// The socket address, if the endpoint is a usable one
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            PeerEndpoint::Inet(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl From<Option<SocketAddr>> for PeerEndpoint {
    fn from(addr: Option<SocketAddr>) -> Self {
        addr.map_or(PeerEndpoint::Unset, PeerEndpoint::Inet)
    }
}

/// One peer as seen on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Peer public key
    pub public_key: PeerKey,
    /// Current endpoint
    pub endpoint: PeerEndpoint,
}

impl PeerRecord {
    /// Create a peer record
    pub fn new(public_key: PeerKey, endpoint: PeerEndpoint) -> Self {
        Self {
            public_key,
            endpoint,
        }
    }
}

/// Trait for WireGuard control plane implementations
///
/// # Errors
///
/// - [`crate::Error::DeviceNotFound`]: no interface with that name
/// - [`crate::Error::ControlPlane`]: any other failure talking to the device
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Open a device and snapshot its peers
    async fn open_device(&self, name: &str) -> Result<Box<dyn DeviceHandle>, crate::Error>;

    /// Short name for log lines (e.g. "kernel", "userspace")
    fn backend_name(&self) -> &'static str;
}

/// An open WireGuard device
///
/// Dropping the handle closes the device.
#[async_trait]
pub trait DeviceHandle: Send {
    /// Peers as of `open_device`
    fn peers(&self) -> &[PeerRecord];

    /// Point `peer` at `endpoint`, leaving every other peer setting alone
    async fn set_peer_endpoint(
        &mut self,
        peer: &PeerKey,
        endpoint: SocketAddr,
    ) -> Result<(), crate::Error>;

    /// Look up a peer by public key
    fn find_peer(&self, key: &PeerKey) -> Option<&PeerRecord> {
        self.peers().iter().find(|peer| peer.public_key == *key)
    }
}
