// # WireGuard Control Plane
//
// This crate reads and writes WireGuard peer endpoints through the
// `wireguard-control` library.
//
// ## Backends
//
// - **kernel** (Linux): generic netlink to the in-kernel implementation
// - **userspace**: the UAPI socket under `/var/run/wireguard/` used by
//   wireguard-go and boringtun
//
// ## Handle Lifetime
//
// Opening a device takes a snapshot of its peers. The handle keeps no socket
// open between calls, so dropping it releases nothing but memory. Writes
// only carry the peer key and the new endpoint; allowed IPs, keepalive and
// preshared keys are left untouched.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::debug;
use wgddns_core::traits::{ControlPlane, DeviceHandle, PeerEndpoint, PeerRecord};
use wgddns_core::{Error, PeerKey, Result};
use wireguard_control::{Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfigBuilder};

/// Which WireGuard implementation to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgBackend {
    /// In-kernel WireGuard via netlink (Linux only)
    Kernel,
    /// Userspace WireGuard via the UAPI socket
    Userspace,
}

impl WgBackend {
    /// Platform default: kernel on Linux, userspace elsewhere
    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            WgBackend::Kernel
        } else {
            WgBackend::Userspace
        }
    }

    /// Stable name used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            WgBackend::Kernel => "kernel",
            WgBackend::Userspace => "userspace",
        }
    }

    fn to_backend(self) -> Result<Backend> {
        match self {
            #[cfg(target_os = "linux")]
            WgBackend::Kernel => Ok(Backend::Kernel),
            #[cfg(not(target_os = "linux"))]
            WgBackend::Kernel => Err(Error::config(
                "Kernel WireGuard backend is only supported on Linux",
            )),
            WgBackend::Userspace => Ok(Backend::Userspace),
        }
    }
}

impl Default for WgBackend {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl fmt::Display for WgBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WgBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kernel" => Ok(WgBackend::Kernel),
            "userspace" => Ok(WgBackend::Userspace),
            other => Err(Error::config(format!(
                "WireGuard backend '{}' is not supported. Supported backends: kernel, userspace",
                other
            ))),
        }
    }
}

/// Control plane over a local WireGuard implementation
#[derive(Debug, Clone, Default)]
pub struct WireGuardControl {
    backend: WgBackend,
}

impl WireGuardControl {
    /// Create a control plane for the given backend
    pub fn new(backend: WgBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ControlPlane for WireGuardControl {
    async fn open_device(&self, name: &str) -> Result<Box<dyn DeviceHandle>> {
        let backend = self.backend;
        let device_name = name.to_string();

        let peers = tokio::task::spawn_blocking(move || read_peers(&device_name, backend))
            .await
            .map_err(|e| Error::control_plane(format!("device read task failed: {}", e)))??;

        debug!("Opened WireGuard device {} ({} peer(s))", name, peers.len());

        Ok(Box::new(WireGuardDevice {
            name: name.to_string(),
            backend,
            peers,
        }))
    }

    fn backend_name(&self) -> &'static str {
        self.backend.as_str()
    }
}

/// Peer snapshot of one WireGuard interface
struct WireGuardDevice {
    name: String,
    backend: WgBackend,
    peers: Vec<PeerRecord>,
}

#[async_trait]
impl DeviceHandle for WireGuardDevice {
    fn peers(&self) -> &[PeerRecord] {
        &self.peers
    }

    /// Writes are add-or-update: a peer removed from the interface after
    /// `open_device` took its snapshot is created again with only a key and
    /// this endpoint. The window is one cycle's read-to-write gap.
    async fn set_peer_endpoint(&mut self, peer: &PeerKey, endpoint: SocketAddr) -> Result<()> {
        let backend = self.backend;
        let device_name = self.name.clone();
        let encoded_key = peer.to_base64();

        tokio::task::spawn_blocking(move || {
            write_endpoint(&device_name, backend, &encoded_key, endpoint)
        })
        .await
        .map_err(|e| Error::control_plane(format!("device write task failed: {}", e)))??;

        if let Some(record) = self.peers.iter_mut().find(|record| record.public_key == *peer) {
            record.endpoint = PeerEndpoint::Inet(endpoint);
        }

        Ok(())
    }
}

fn interface_name(name: &str) -> Result<InterfaceName> {
    name.parse::<InterfaceName>()
        .map_err(|e| Error::config(format!("Invalid WireGuard interface name '{}': {}", name, e)))
}

fn read_peers(name: &str, backend: WgBackend) -> Result<Vec<PeerRecord>> {
    let iface = interface_name(name)?;
    let device = Device::get(&iface, backend.to_backend()?).map_err(|e| map_read_error(name, e))?;

    let peers = device
        .peers
        .iter()
        .filter_map(|info| {
            let bytes: [u8; wgddns_core::key::KEY_LEN] =
                info.config.public_key.as_bytes().try_into().ok()?;
            Some(PeerRecord::new(
                PeerKey::from_bytes(bytes),
                PeerEndpoint::from(info.config.endpoint),
            ))
        })
        .collect();

    Ok(peers)
}

fn write_endpoint(
    name: &str,
    backend: WgBackend,
    encoded_key: &str,
    endpoint: SocketAddr,
) -> Result<()> {
    let iface = interface_name(name)?;
    let key = Key::from_base64(encoded_key)
        .map_err(|_| Error::invalid_key(format!("cannot encode peer key {}", encoded_key)))?;

    DeviceUpdate::new()
        .add_peer(PeerConfigBuilder::new(&key).set_endpoint(endpoint))
        .apply(&iface, backend.to_backend()?)
        .map_err(|e| Error::control_plane(format!("set peer endpoint on {}: {}", name, e)))
}

/// A missing interface shows up as ENODEV from netlink and as a missing
/// socket file from the userspace backend.
fn map_read_error(name: &str, err: io::Error) -> Error {
    if is_missing_device(&err) {
        Error::device_not_found(name)
    } else {
        Error::control_plane(format!("read device {}: {}", name, err))
    }
}

fn is_missing_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENODEV)
}
