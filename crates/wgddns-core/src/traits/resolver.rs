// # Resolver Trait
//
// Defines the interface for turning a hostname into socket addresses.
//
// ## Implementations
//
// - System resolver (`getaddrinfo`): `wgddns-resolver-system` crate
// - Test doubles: `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use wgddns_core::traits::{Resolver, ResolvedAddressSet};
//
// let resolver = /* Resolver implementation */;
// let addresses = ResolvedAddressSet::from_resolved(resolver.resolve("peer.example.com").await?);
// for addr in addresses.iter() {
//     println!("{}", addr.ip());
// }
// ```

use async_trait::async_trait;
use std::net::SocketAddr;

/// Trait for hostname resolution
///
/// Implementations ask for both address families and no service, so every
/// returned address carries port 0.
///
/// # Errors
///
/// - [`crate::Error::HostNotFound`]: the name exists nowhere or has no address
///   records. This is an expected outcome, not a failure.
/// - [`crate::Error::Resolution`]: anything else (resolver unreachable, I/O).
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname`, preserving the order the resolver returned
    async fn resolve(&self, hostname: &str) -> Result<Vec<SocketAddr>, crate::Error>;

    /// Short name for log lines
    fn resolver_name(&self) -> &'static str {
        "resolver"
    }
}

/// Ordered, de-duplicated addresses from one resolution
///
/// Two entries are duplicates when they share family and address bytes;
/// ports, flow info and scope ids do not count. The first occurrence wins,
/// so the resolver's preference order survives. The set cannot be modified
/// once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddressSet {
    addresses: Vec<SocketAddr>,
}

impl ResolvedAddressSet {
    /// Build a set from raw resolver output
    pub fn from_resolved(resolved: impl IntoIterator<Item = SocketAddr>) -> Self {
        let mut addresses: Vec<SocketAddr> = Vec::new();
        for addr in resolved {
            if !addresses
                .iter()
                .any(|seen| crate::addr::addresses_equal(seen, &addr))
            {
                addresses.push(addr);
            }
        }
        Self { addresses }
    }

    /// An empty set (host resolved to nothing)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of distinct addresses
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Iterate in resolver order
    pub fn iter(&self) -> std::slice::Iter<'_, SocketAddr> {
        self.addresses.iter()
    }

    /// View as a slice
    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Space separated address list for diagnostics
    pub fn describe(&self) -> String {
        self.addresses
            .iter()
            .map(|addr| addr.ip().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<'a> IntoIterator for &'a ResolvedAddressSet {
    type Item = &'a SocketAddr;
    type IntoIter = std::slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
