//! Contract Test: Endpoint Reconciliation
//!
//! Constraints verified:
//! - A matching endpoint is never rewritten, whatever the resolver order
//! - An empty resolution never touches the device
//! - Replacement addresses keep the endpoint's family when possible
//! - Device failures abort the cycle without writes
//! - The device handle is released on every path

mod common;

use common::*;
use std::net::{SocketAddr, SocketAddrV6};
use wgddns_core::engine::{CycleOutcome, ReconcileOutcome, Reconciler, UnchangedReason};
use wgddns_core::traits::{PeerEndpoint, PeerRecord, ResolvedAddressSet};
use wgddns_core::{Error, PeerKey};

fn reconciler(resolver: ScriptedResolver, control: MemoryControlPlane) -> Reconciler {
    Reconciler::new(Box::new(resolver), Box::new(control))
}

fn set(addresses: &[&str]) -> ResolvedAddressSet {
    ResolvedAddressSet::from_resolved(addresses.iter().map(|a| ip(a)))
}

#[tokio::test]
async fn matching_endpoint_is_left_alone() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.1", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let outcome = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.1"]), PORT)
        .await
        .expect("reconcile succeeds");

    assert_eq!(
        outcome,
        ReconcileOutcome::Unchanged(UnchangedReason::AlreadyCurrent {
            endpoint: sock("10.0.0.1", PORT)
        })
    );
    assert!(state.writes().is_empty());
}

#[tokio::test]
async fn match_ignores_configured_port() {
    // Endpoint port differs from the configured one; still no rewrite.
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.1", 4000)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.1"]), PORT)
        .await
        .unwrap();

    assert!(state.writes().is_empty());
    assert_eq!(
        state.endpoint_of(&peer_key()),
        Some(PeerEndpoint::Inet(sock("10.0.0.1", 4000)))
    );
}

#[tokio::test]
async fn empty_resolution_is_a_no_op() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.2", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let outcome = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &ResolvedAddressSet::empty(), PORT)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Unchanged(UnchangedReason::NoAddresses));
    assert_eq!(state.open_count(), 0, "device must not even be opened");
    assert_eq!(
        state.endpoint_of(&peer_key()),
        Some(PeerEndpoint::Inet(sock("10.0.0.2", PORT)))
    );
}

#[tokio::test]
async fn ipv4_endpoint_moves_to_first_ipv4() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let outcome = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5", "2001:db8::1"]), 51821)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            previous: PeerEndpoint::Inet(sock("10.0.0.9", PORT)),
            new: sock("10.0.0.5", 51821),
        }
    );
    assert_eq!(state.writes(), vec![(peer_key(), sock("10.0.0.5", 51821))]);
}

#[tokio::test]
async fn ipv4_endpoint_prefers_ipv4_even_when_listed_second() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["2001:db8::1", "10.0.0.5"]), PORT)
        .await
        .unwrap();

    assert_eq!(state.writes(), vec![(peer_key(), sock("10.0.0.5", PORT))]);
}

#[tokio::test]
async fn ipv6_endpoint_moves_to_ipv6() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("2001:db8::9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["2001:db8::5"]), PORT)
        .await
        .unwrap();

    assert_eq!(state.writes(), vec![(peer_key(), sock("2001:db8::5", PORT))]);
}

#[tokio::test]
async fn ipv6_endpoint_falls_back_to_ipv4() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("2001:db8::9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5", "10.0.0.6"]), PORT)
        .await
        .unwrap();

    assert_eq!(state.writes(), vec![(peer_key(), sock("10.0.0.5", PORT))]);
}

#[tokio::test]
async fn unset_endpoint_takes_ipv4_by_default() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Unset);
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let outcome = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["2001:db8::1", "10.0.0.5"]), PORT)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            previous: PeerEndpoint::Unset,
            new: sock("10.0.0.5", PORT),
        }
    );
    assert_eq!(state.writes().len(), 1);
}

#[tokio::test]
async fn replacement_keeps_ipv6_scope_and_flow_info() {
    let link_local = SocketAddr::V6(SocketAddrV6::new("fe80::1".parse().unwrap(), 0, 7, 3));
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("fe80::9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    engine
        .reconcile_peer_endpoint(
            DEVICE,
            &peer_key(),
            &ResolvedAddressSet::from_resolved(vec![link_local]),
            PORT,
        )
        .await
        .unwrap();

    let written = state.writes()[0].1;
    let SocketAddr::V6(written) = written else {
        panic!("expected an IPv6 endpoint, got {}", written);
    };
    assert_eq!(*written.ip(), "fe80::1".parse::<std::net::Ipv6Addr>().unwrap());
    assert_eq!(written.port(), PORT);
    assert_eq!(written.scope_id(), 3);
    assert_eq!(written.flowinfo(), 7);
}

#[tokio::test]
async fn missing_device_is_transient() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    state.set_device_present(false);
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let err = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5"]), PORT)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeviceNotFound(_)));
    assert!(err.is_transient());
    assert!(state.writes().is_empty());
}

#[tokio::test]
async fn unknown_peer_is_silently_skipped() {
    let (control, state) = MemoryControlPlane::new(vec![PeerRecord::new(
        other_key(),
        PeerEndpoint::Inet(sock("10.0.0.9", PORT)),
    )]);
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let outcome = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5"]), PORT)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Unchanged(UnchangedReason::PeerNotFound));
    assert!(state.writes().is_empty());
    assert_eq!(state.close_count(), 1);
}

#[tokio::test]
async fn only_the_configured_peer_is_touched() {
    let (control, state) = MemoryControlPlane::new(vec![
        PeerRecord::new(other_key(), PeerEndpoint::Inet(sock("192.0.2.1", 1000))),
        PeerRecord::new(peer_key(), PeerEndpoint::Inet(sock("10.0.0.9", PORT))),
        PeerRecord::new(PeerKey::from_bytes([0x33; 32]), PeerEndpoint::Unset),
    ]);
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5"]), PORT)
        .await
        .unwrap();

    assert_eq!(state.writes(), vec![(peer_key(), sock("10.0.0.5", PORT))]);
    assert_eq!(
        state.endpoint_of(&other_key()),
        Some(PeerEndpoint::Inet(sock("192.0.2.1", 1000)))
    );
    assert_eq!(
        state.endpoint_of(&PeerKey::from_bytes([0x33; 32])),
        Some(PeerEndpoint::Unset)
    );
}

#[tokio::test]
async fn unsupported_family_aborts_without_writing() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Unsupported { family: 17 });
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let err = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5"]), PORT)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedFamily { family: 17 }));
    assert!(err.is_invariant_violation());
    assert!(state.writes().is_empty());
    assert_eq!(state.close_count(), 1);
}

#[tokio::test]
async fn failed_write_is_reported_and_device_released() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    state.fail_writes_with("operation not permitted");
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    let err = engine
        .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5"]), PORT)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ControlPlane(_)));
    assert_eq!(state.open_count(), 1);
    assert_eq!(state.close_count(), 1);
}

#[tokio::test]
async fn device_is_released_on_every_successful_path() {
    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![]), control);

    // update, then match
    for _ in 0..2 {
        engine
            .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(&["10.0.0.5"]), PORT)
            .await
            .unwrap();
    }

    assert_eq!(state.open_count(), 2);
    assert_eq!(state.close_count(), 2);
    assert_eq!(state.writes().len(), 1);
}

#[tokio::test]
async fn idempotent_for_any_resolver_order() {
    let orders: [&[&str]; 4] = [
        &["10.0.0.1", "10.0.0.2", "2001:db8::1"],
        &["2001:db8::1", "10.0.0.2", "10.0.0.1"],
        &["10.0.0.2", "2001:db8::1", "10.0.0.1"],
        &["2001:db8::1", "10.0.0.1", "10.0.0.2"],
    ];

    for current in ["10.0.0.1", "10.0.0.2", "2001:db8::1"] {
        for order in orders {
            let (control, state) =
                MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock(current, PORT)));
            let engine = reconciler(ScriptedResolver::returning(vec![]), control);

            engine
                .reconcile_peer_endpoint(DEVICE, &peer_key(), &set(order), PORT)
                .await
                .unwrap();

            assert!(
                state.writes().is_empty(),
                "endpoint {} rewritten for order {:?}",
                current,
                order
            );
        }
    }
}

#[tokio::test]
async fn resolve_hostname_deduplicates_in_order() {
    let resolver = ScriptedResolver::returning(vec![
        ip("10.0.0.2"),
        ip("10.0.0.1"),
        ip("10.0.0.2"),
        ip("2001:db8::1"),
        ip("2001:db8::1"),
    ]);
    let (control, _state) = MemoryControlPlane::with_peer(PeerEndpoint::Unset);
    let engine = reconciler(resolver, control);

    let addresses = engine.resolve_hostname(HOSTNAME).await.unwrap();
    assert_eq!(
        addresses.as_slice(),
        &[ip("10.0.0.2"), ip("10.0.0.1"), ip("2001:db8::1")]
    );
}

#[tokio::test]
async fn resolve_hostname_classifies_failures() {
    let (control, _state) = MemoryControlPlane::with_peer(PeerEndpoint::Unset);
    let engine = reconciler(ScriptedResolver::new(Answer::NoRecords), control);
    let err = engine.resolve_hostname(HOSTNAME).await.unwrap_err();
    assert!(err.is_expected_absence());

    let (control, _state) = MemoryControlPlane::with_peer(PeerEndpoint::Unset);
    let engine = reconciler(
        ScriptedResolver::new(Answer::Failure("temporary failure".into())),
        control,
    );
    let err = engine.resolve_hostname(HOSTNAME).await.unwrap_err();
    assert!(matches!(err, Error::Resolution(_)));
}

#[tokio::test]
async fn run_cycle_maps_every_terminal_state() {
    let config = minimal_config();

    let (control, _) = MemoryControlPlane::with_peer(PeerEndpoint::Unset);
    let engine = reconciler(ScriptedResolver::new(Answer::NoRecords), control);
    assert_eq!(engine.run_cycle(&config).await, CycleOutcome::NoHostFound);

    let (control, _) = MemoryControlPlane::with_peer(PeerEndpoint::Unset);
    let engine = reconciler(ScriptedResolver::new(Answer::Failure("servfail".into())), control);
    assert!(matches!(
        engine.run_cycle(&config).await,
        CycleOutcome::ResolveFailed { .. }
    ));

    let (control, _) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.1", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![ip("10.0.0.1")]), control);
    assert!(matches!(
        engine.run_cycle(&config).await,
        CycleOutcome::Unchanged(UnchangedReason::AlreadyCurrent { .. })
    ));

    let (control, _) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    let engine = reconciler(ScriptedResolver::returning(vec![ip("10.0.0.1")]), control);
    assert_eq!(
        engine.run_cycle(&config).await,
        CycleOutcome::Updated {
            previous: PeerEndpoint::Inet(sock("10.0.0.9", PORT)),
            new: sock("10.0.0.1", PORT),
        }
    );

    let (control, state) = MemoryControlPlane::with_peer(PeerEndpoint::Inet(sock("10.0.0.9", PORT)));
    state.set_device_present(false);
    let engine = reconciler(ScriptedResolver::returning(vec![ip("10.0.0.1")]), control);
    assert!(matches!(
        engine.run_cycle(&config).await,
        CycleOutcome::UpdateFailed { transient: true, .. }
    ));
}

