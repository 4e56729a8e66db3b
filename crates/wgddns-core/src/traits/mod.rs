//! Collaborator traits for the WireGuard DDNS system
//!
//! The reconciliation engine only talks to the outside world through these:
//!
//! - [`Resolver`]: turn a hostname into socket addresses
//! - [`ControlPlane`]: read and rewrite WireGuard peer endpoints

pub mod control_plane;
pub mod resolver;

pub use control_plane::{ControlPlane, DeviceHandle, PeerEndpoint, PeerRecord};
pub use resolver::{ResolvedAddressSet, Resolver};
