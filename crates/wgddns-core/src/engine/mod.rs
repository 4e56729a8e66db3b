//! Reconciliation engine
//!
//! The Reconciler is responsible for one cycle:
//! - Resolving the peer hostname via a [`Resolver`]
//! - Reading the peer's current endpoint from the [`ControlPlane`]
//! - Deciding whether the endpoint is stale
//! - Writing a replacement endpoint when it is
//!
//! ## Cycle State Machine
//!
//! ```text
//! Start ─▶ Resolving ─┬─▶ NoHostFound
//!                     ├─▶ ResolveFailed
//!                     └─▶ Resolved ─▶ Updating ─┬─▶ Unchanged
//!                                               ├─▶ Updated
//!                                               └─▶ UpdateFailed
//! ```
//!
//! Every path ends the cycle. Nothing read during a cycle (addresses, device
//! snapshot) outlives it, so the next cycle always starts from a fresh read.
//!
//! ## Selection Rule
//!
//! When no resolved address matches the current endpoint, the replacement
//! keeps the endpoint's family if possible:
//!
//! | current endpoint | preferred family | fallback |
//! |------------------|------------------|----------|
//! | unset            | v4               | first address |
//! | IPv4             | v4               | first address |
//! | IPv6             | v6               | first address |
//! | other            | cycle aborted, reported as a defect | |

use crate::addr::{self, AddressFamily};
use crate::config::ReconcileConfig;
use crate::error::{Error, Result};
use crate::key::PeerKey;
use crate::traits::{ControlPlane, PeerEndpoint, ResolvedAddressSet, Resolver};
use std::net::SocketAddr;
use tracing::{debug, error, info, trace};

/// Why a cycle ended without writing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// The host resolved to no addresses; a working endpoint is left alone
    NoAddresses,
    /// The device has no peer with the configured key
    PeerNotFound,
    /// The current endpoint is one of the resolved addresses
    AlreadyCurrent {
        /// The endpoint as configured
        endpoint: SocketAddr,
    },
}

/// Result of [`Reconciler::reconcile_peer_endpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No write was needed
    Unchanged(UnchangedReason),
    /// The endpoint was rewritten
    Updated {
        /// Endpoint before the update
        previous: PeerEndpoint,
        /// Endpoint after the update
        new: SocketAddr,
    },
}

/// Terminal state of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The hostname has no records
    NoHostFound,
    /// Resolution failed for an infrastructure reason
    ResolveFailed {
        /// Error description
        error: String,
    },
    /// Nothing had to change
    Unchanged(UnchangedReason),
    /// The peer endpoint was rewritten
    Updated {
        /// Endpoint before the update
        previous: PeerEndpoint,
        /// Endpoint after the update
        new: SocketAddr,
    },
    /// Reading or writing the device failed
    UpdateFailed {
        /// Error description
        error: String,
        /// Whether the failure is expected to clear up on its own
        transient: bool,
    },
}

impl CycleOutcome {
    /// Whether the cycle ended in a failure state
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CycleOutcome::ResolveFailed { .. } | CycleOutcome::UpdateFailed { .. }
        )
    }
}

/// Core reconciliation engine
///
/// Holds the two collaborators and nothing else: no endpoint, address or
/// device state is cached between calls.
pub struct Reconciler {
    /// Hostname resolver
    resolver: Box<dyn Resolver>,

    /// WireGuard control plane
    control_plane: Box<dyn ControlPlane>,
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(resolver: Box<dyn Resolver>, control_plane: Box<dyn ControlPlane>) -> Self {
        Self {
            resolver,
            control_plane,
        }
    }

    /// Resolve `hostname` into a de-duplicated address set
    ///
    /// # Returns
    ///
    /// - `Ok(set)`: possibly empty, in resolver order
    /// - `Err(Error::HostNotFound)`: the name has no records (logged at debug only)
    /// - `Err(_)`: any other resolver failure (logged at error)
    pub async fn resolve_hostname(&self, hostname: &str) -> Result<ResolvedAddressSet> {
        match self.resolver.resolve(hostname).await {
            Ok(resolved) => Ok(ResolvedAddressSet::from_resolved(resolved)),
            Err(e) if e.is_expected_absence() => {
                debug!("Resolve: host or address not found for {}", hostname);
                Err(e)
            }
            Err(e) => {
                error!(
                    "Failed to resolve hostname {} via {}: {}",
                    hostname,
                    self.resolver.resolver_name(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Bring the peer's endpoint in line with `addresses`
    ///
    /// # Parameters
    ///
    /// - `device_name`: WireGuard interface to open
    /// - `peer_key`: public key of the managed peer
    /// - `addresses`: freshly resolved addresses for the peer hostname
    /// - `port`: port written into a replacement endpoint
    ///
    /// An empty address set never touches the device. A missing peer is not
    /// an error. The device handle is dropped before this returns, on every
    /// path.
    pub async fn reconcile_peer_endpoint(
        &self,
        device_name: &str,
        peer_key: &PeerKey,
        addresses: &ResolvedAddressSet,
        port: u16,
    ) -> Result<ReconcileOutcome> {
        if addresses.is_empty() {
            debug!("Peer endpoint unchanged: host resolved to no addresses");
            return Ok(ReconcileOutcome::Unchanged(UnchangedReason::NoAddresses));
        }

        let mut device = match self.control_plane.open_device(device_name).await {
            Ok(device) => device,
            Err(e @ Error::DeviceNotFound(_)) => {
                debug!("Update peer endpoint failed: WireGuard device {} not found", device_name);
                return Err(e);
            }
            Err(e) => {
                error!(
                    "Failed to read WireGuard device {} via {}: {}",
                    device_name,
                    self.control_plane.backend_name(),
                    e
                );
                return Err(e);
            }
        };

        let Some(peer) = device.find_peer(peer_key) else {
            trace!("Peer {} is not configured on {}", peer_key, device_name);
            return Ok(ReconcileOutcome::Unchanged(UnchangedReason::PeerNotFound));
        };
        let current = peer.endpoint;

        if let Some(endpoint) = current.socket_addr()
            && addresses
                .iter()
                .any(|addr| addr::endpoint_matches(&current, addr))
        {
            debug!("Peer endpoint unchanged: {} still resolves", endpoint.ip());
            return Ok(ReconcileOutcome::Unchanged(UnchangedReason::AlreadyCurrent {
                endpoint,
            }));
        }

        let prefer_v4 = match AddressFamily::of_endpoint(&current) {
            AddressFamily::Unspecified | AddressFamily::V4 => true,
            AddressFamily::V6 => false,
            AddressFamily::Other(family) => {
                error!(
                    location = concat!(file!(), ":", line!()),
                    "Unexpected address family {} on peer {}. Report this bug",
                    family,
                    peer_key
                );
                return Err(Error::UnsupportedFamily { family });
            }
        };

        let Some(selected) = addr::select_preferred(prefer_v4, addresses.as_slice()) else {
            // Non-empty was checked above.
            return Ok(ReconcileOutcome::Unchanged(UnchangedReason::NoAddresses));
        };
        // Keep scope id and flow info of a resolved IPv6 address.
        let mut new_endpoint = selected;
        new_endpoint.set_port(port);

        debug!(
            "Updating WireGuard device {}, original IP {}, new IP {}...",
            device_name,
            addr::display_address(&current),
            new_endpoint.ip()
        );

        if let Err(e) = device.set_peer_endpoint(peer_key, new_endpoint).await {
            error!("Set WireGuard peer endpoint failed on {}: {}", device_name, e);
            return Err(e);
        }

        info!(
            "WireGuard device {}: updated peer endpoint {} -> {}",
            device_name,
            addr::display_address(&current),
            new_endpoint
        );

        Ok(ReconcileOutcome::Updated {
            previous: current,
            new: new_endpoint,
        })
    }

    /// Run one full cycle: resolve, then reconcile
    ///
    /// Never fails; every error is logged where it happens and reported in
    /// the returned outcome.
    pub async fn run_cycle(&self, config: &ReconcileConfig) -> CycleOutcome {
        let addresses = match self.resolve_hostname(&config.hostname).await {
            Ok(addresses) => addresses,
            Err(e) if e.is_expected_absence() => return CycleOutcome::NoHostFound,
            Err(e) => {
                return CycleOutcome::ResolveFailed {
                    error: e.to_string(),
                };
            }
        };

        if config.verbose {
            if addresses.is_empty() {
                debug!("No IP found for host {}", config.hostname);
            } else {
                debug!("{} IP(s) retrieved: {}", addresses.len(), addresses.describe());
            }
        }

        match self
            .reconcile_peer_endpoint(&config.device, &config.peer_key, &addresses, config.port)
            .await
        {
            Ok(ReconcileOutcome::Unchanged(reason)) => CycleOutcome::Unchanged(reason),
            Ok(ReconcileOutcome::Updated { previous, new }) => {
                CycleOutcome::Updated { previous, new }
            }
            Err(e) => CycleOutcome::UpdateFailed {
                transient: e.is_transient(),
                error: e.to_string(),
            },
        }
    }
}
