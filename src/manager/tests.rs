#![allow(clippy::unwrap_used)]

use super::*;
use crate::{
    services::settings::ConnectionProfile,
    types::{ActiveConnectionStateReason, DeviceState, DeviceType},
};

fn candidate(id: ActiveConnectionId, metric: u32, current: bool) -> DefaultCandidate {
    DefaultCandidate {
        id,
        metric,
        current,
    }
}

fn activated(id: ActiveConnectionId, profile: ConnectionProfile) -> ActiveConnection {
    let mut active = ActiveConnection::builder(id, Arc::new(profile), AuthSubject::new_internal())
        .device(1)
        .build()
        .unwrap();
    active
        .set_state(
            ActiveConnectionState::Activated,
            ActiveConnectionStateReason::None,
        )
        .unwrap();
    active
}

#[test]
fn lowest_metric_wins_default() {
    let candidates = [candidate(1, 600, false), candidate(2, 100, false)];

    assert_eq!(choose_default(&candidates), Some(2));
}

#[test]
fn metric_tie_keeps_current_owner() {
    let candidates = [candidate(1, 100, false), candidate(2, 100, true)];

    assert_eq!(choose_default(&candidates), Some(2));
}

#[test]
fn metric_tie_without_owner_prefers_lowest_id() {
    let candidates = [candidate(5, 100, false), candidate(3, 100, false)];

    assert_eq!(choose_default(&candidates), Some(3));
}

#[test]
fn no_candidates_no_default() {
    assert_eq!(choose_default(&[]), None);
}

#[test]
fn candidate_metric_follows_device_type() {
    let active = activated(1, ConnectionProfile::ethernet("Wired"));

    let wifi = DefaultCandidate::for_active(&active, AddressFamily::Inet, Some(DeviceType::Wifi));
    let wired =
        DefaultCandidate::for_active(&active, AddressFamily::Inet, Some(DeviceType::Ethernet));

    assert_eq!(wifi.unwrap().metric, 600);
    assert_eq!(wired.unwrap().metric, 100);
}

#[test]
fn explicit_route_metric_overrides_device_type() {
    let mut profile = ConnectionProfile::ethernet("Wired");
    profile.ipv4.route_metric = Some(20);
    let active = activated(1, profile);

    let candidate =
        DefaultCandidate::for_active(&active, AddressFamily::Inet, Some(DeviceType::Ethernet));

    assert_eq!(candidate.unwrap().metric, 20);
}

#[test]
fn never_default_profiles_are_not_candidates() {
    let mut profile = ConnectionProfile::ethernet("Wired");
    profile.ipv4.never_default = true;
    let active = activated(1, profile);

    assert!(
        DefaultCandidate::for_active(&active, AddressFamily::Inet, Some(DeviceType::Ethernet))
            .is_none()
    );
    assert!(
        DefaultCandidate::for_active(&active, AddressFamily::Inet6, Some(DeviceType::Ethernet))
            .is_some()
    );
}

#[test]
fn activating_connections_are_not_candidates() {
    let active = ActiveConnection::builder(
        1,
        Arc::new(ConnectionProfile::ethernet("Wired")),
        AuthSubject::new_internal(),
    )
    .device(1)
    .build()
    .unwrap();

    assert!(
        DefaultCandidate::for_active(&active, AddressFamily::Inet, Some(DeviceType::Ethernet))
            .is_none()
    );
}

#[test]
fn default_owner_means_connected_global() {
    let state = overall_state([DeviceState::Activated], true, Connectivity::Full);

    assert_eq!(state, NMState::ConnectedGlobal);
}

#[test]
fn failed_connectivity_check_means_connected_site() {
    for connectivity in [Connectivity::Limited, Connectivity::Portal] {
        let state = overall_state([DeviceState::Activated], true, connectivity);
        assert_eq!(state, NMState::ConnectedSite);
    }
    assert_eq!(
        overall_state([DeviceState::Activated], true, Connectivity::Unknown),
        NMState::ConnectedGlobal
    );
}

#[test]
fn activated_device_without_default_is_local() {
    let state = overall_state(
        [DeviceState::Disconnected, DeviceState::Activated],
        false,
        Connectivity::Unknown,
    );

    assert_eq!(state, NMState::ConnectedLocal);
}

#[test]
fn activating_device_means_connecting() {
    let state = overall_state(
        [DeviceState::IpConfig, DeviceState::Unavailable],
        false,
        Connectivity::Unknown,
    );

    assert_eq!(state, NMState::Connecting);
}

#[test]
fn deactivating_device_means_disconnecting() {
    let state = overall_state([DeviceState::Deactivating], false, Connectivity::Unknown);

    assert_eq!(state, NMState::Disconnecting);
}

#[test]
fn idle_devices_mean_disconnected() {
    let state = overall_state(
        [
            DeviceState::Unmanaged,
            DeviceState::Unavailable,
            DeviceState::Failed,
        ],
        false,
        Connectivity::Limited,
    );

    assert_eq!(state, NMState::Disconnected);
}
