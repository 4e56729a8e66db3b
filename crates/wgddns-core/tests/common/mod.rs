//! Test doubles and common utilities for reconciliation contract tests
//!
//! These doubles stand in for the system resolver and the WireGuard control
//! plane. They count every call so tests can assert on side effects.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wgddns_core::error::{Error, Result};
use wgddns_core::traits::{ControlPlane, DeviceHandle, PeerEndpoint, PeerRecord, Resolver};
use wgddns_core::{PeerKey, ReconcileConfig};

pub const DEVICE: &str = "wg0";
pub const HOSTNAME: &str = "peer.example.com";
pub const PORT: u16 = 51820;

pub fn peer_key() -> PeerKey {
    PeerKey::from_bytes([0x11; 32])
}

pub fn other_key() -> PeerKey {
    PeerKey::from_bytes([0x22; 32])
}

/// Socket address with port 0, as a resolver returns it
pub fn ip(s: &str) -> SocketAddr {
    SocketAddr::new(s.parse().unwrap(), 0)
}

/// Socket address with an explicit port
pub fn sock(s: &str, port: u16) -> SocketAddr {
    SocketAddr::new(s.parse().unwrap(), port)
}

/// Minimal valid configuration for the test device and peer
pub fn minimal_config() -> ReconcileConfig {
    ReconcileConfig::new(DEVICE, peer_key(), HOSTNAME, PORT).with_interval_ms(10)
}

/// What the scripted resolver answers
#[derive(Debug, Clone)]
pub enum Answer {
    Addresses(Vec<SocketAddr>),
    NoRecords,
    Failure(String),
}

/// A resolver that replays scripted answers, repeating the last one forever
pub struct ScriptedResolver {
    answers: Mutex<VecDeque<Answer>>,
    last: Mutex<Answer>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new(answer: Answer) -> Self {
        Self::sequence(vec![answer])
    }

    pub fn returning(addresses: Vec<SocketAddr>) -> Self {
        Self::new(Answer::Addresses(addresses))
    }

    pub fn sequence(answers: Vec<Answer>) -> Self {
        let last = answers
            .last()
            .cloned()
            .unwrap_or(Answer::Addresses(Vec::new()));
        Self {
            answers: Mutex::new(answers.into()),
            last: Mutex::new(last),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<SocketAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.lock().unwrap().clone());

        match answer {
            Answer::Addresses(addresses) => Ok(addresses),
            Answer::NoRecords => Err(Error::host_not_found(hostname)),
            Answer::Failure(message) => Err(Error::resolution(message)),
        }
    }

    fn resolver_name(&self) -> &'static str {
        "scripted"
    }
}

/// Observable state shared between a [`MemoryControlPlane`] and the test
#[derive(Debug, Default)]
pub struct ControlPlaneState {
    pub peers: Mutex<Vec<PeerRecord>>,
    pub device_present: Mutex<bool>,
    pub fail_set: Mutex<Option<String>>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub writes: Mutex<Vec<(PeerKey, SocketAddr)>>,
}

impl ControlPlaneState {
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(PeerKey, SocketAddr)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn endpoint_of(&self, key: &PeerKey) -> Option<PeerEndpoint> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .find(|peer| peer.public_key == *key)
            .map(|peer| peer.endpoint)
    }

    pub fn set_device_present(&self, present: bool) {
        *self.device_present.lock().unwrap() = present;
    }

    pub fn fail_writes_with(&self, message: &str) {
        *self.fail_set.lock().unwrap() = Some(message.to_string());
    }
}

/// An in-memory WireGuard device
pub struct MemoryControlPlane {
    state: Arc<ControlPlaneState>,
}

impl MemoryControlPlane {
    pub fn new(peers: Vec<PeerRecord>) -> (Self, Arc<ControlPlaneState>) {
        let state = Arc::new(ControlPlaneState {
            peers: Mutex::new(peers),
            device_present: Mutex::new(true),
            ..Default::default()
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }

    /// Device with just the managed peer at `endpoint`
    pub fn with_peer(endpoint: PeerEndpoint) -> (Self, Arc<ControlPlaneState>) {
        Self::new(vec![PeerRecord::new(peer_key(), endpoint)])
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn open_device(&self, name: &str) -> Result<Box<dyn DeviceHandle>> {
        if name != DEVICE || !*self.state.device_present.lock().unwrap() {
            return Err(Error::device_not_found(name));
        }

        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.state.peers.lock().unwrap().clone();

        Ok(Box::new(MemoryDevice {
            snapshot,
            state: Arc::clone(&self.state),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryDevice {
    snapshot: Vec<PeerRecord>,
    state: Arc<ControlPlaneState>,
}

#[async_trait]
impl DeviceHandle for MemoryDevice {
    fn peers(&self) -> &[PeerRecord] {
        &self.snapshot
    }

    async fn set_peer_endpoint(&mut self, peer: &PeerKey, endpoint: SocketAddr) -> Result<()> {
        if let Some(message) = self.state.fail_set.lock().unwrap().clone() {
            return Err(Error::control_plane(message));
        }

        self.state.writes.lock().unwrap().push((*peer, endpoint));

        let mut peers = self.state.peers.lock().unwrap();
        match peers.iter_mut().find(|record| record.public_key == *peer) {
            Some(record) => {
                record.endpoint = PeerEndpoint::Inet(endpoint);
                Ok(())
            }
            None => Err(Error::control_plane("no such peer")),
        }
    }
}

impl Drop for MemoryDevice {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
