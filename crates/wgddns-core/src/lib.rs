// # wgddns-core
//
// Core library for keeping a WireGuard peer endpoint in sync with a hostname
// whose address changes (dynamic DNS).
//
// ## Architecture Overview
//
// - **Address utilities** (`addr`): port-agnostic comparison, family-aware selection
// - **Resolver**: trait for hostname resolution
// - **ControlPlane**: trait for reading and writing WireGuard peer endpoints
// - **Reconciler**: one resolve → compare → update cycle
// - **PollingDriver**: runs cycles until the shutdown signal fires
//
// ## Design Principles
//
// 1. **Stateless cycles**: every cycle re-reads DNS and the device; nothing is cached
// 2. **Never disturb a working endpoint**: empty resolutions and matches are no-ops
// 3. **Errors stay in the loop**: a failed cycle is logged, the next one retries
// 4. **Library-first**: the daemon is a thin shell over this crate

pub mod addr;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod key;
pub mod shutdown;
pub mod traits;

// Re-export core types for convenience
pub use config::{IpVersionPreference, ReconcileConfig};
pub use driver::{DriverEvent, PollingDriver};
pub use engine::{CycleOutcome, ReconcileOutcome, Reconciler, UnchangedReason};
pub use error::{Error, Result};
pub use key::PeerKey;
pub use shutdown::ShutdownSignal;
pub use traits::{ControlPlane, DeviceHandle, PeerEndpoint, PeerRecord, ResolvedAddressSet, Resolver};
