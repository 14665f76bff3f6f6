//! Default-route arbitration and the overall networking state.

use crate::{
    active_connection::{ActiveConnection, ActiveConnectionId},
    services::connectivity::Connectivity,
    types::{ActiveConnectionState, AddressFamily, DeviceState, DeviceType, NMState},
};

/// Route metric of VPN connections without an explicit metric.
pub const VPN_ROUTE_METRIC: u32 = 50;

/// An activated connection competing for the default route of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCandidate {
    /// Active connection id.
    pub id: ActiveConnectionId,
    /// Effective route metric.
    pub metric: u32,
    /// Currently owns the default.
    pub current: bool,
}

impl DefaultCandidate {
    /// Candidate for `active` in `family`, if it may own the default at all.
    pub fn for_active(
        active: &ActiveConnection,
        family: AddressFamily,
        device_type: Option<DeviceType>,
    ) -> Option<Self> {
        let profile = active.connection();
        if active.state() != ActiveConnectionState::Activated || !profile.may_own_default(family) {
            return None;
        }

        let metric = profile.ip(family).route_metric.unwrap_or_else(|| {
            if active.is_vpn() {
                VPN_ROUTE_METRIC
            } else {
                device_type.unwrap_or_default().default_route_metric()
            }
        });

        Some(Self {
            id: active.id(),
            metric,
            current: active.is_default(family),
        })
    }
}

/// Pick the default owner: lowest metric, ties keep the current holder,
/// then the lowest id.
pub fn choose_default(candidates: &[DefaultCandidate]) -> Option<ActiveConnectionId> {
    candidates
        .iter()
        .min_by_key(|c| (c.metric, !c.current, c.id))
        .map(|c| c.id)
}

/// Overall networking state from device states, default ownership and the
/// latest connectivity check. A default route counts as global unless the
/// check says otherwise.
pub fn overall_state(
    devices: impl IntoIterator<Item = DeviceState>,
    has_default: bool,
    connectivity: Connectivity,
) -> NMState {
    if has_default {
        return match connectivity {
            Connectivity::Limited | Connectivity::Portal => NMState::ConnectedSite,
            Connectivity::Full | Connectivity::Unknown => NMState::ConnectedGlobal,
        };
    }

    let mut activated = false;
    let mut activating = false;
    let mut deactivating = false;
    for state in devices {
        activated |= state == DeviceState::Activated;
        activating |= state.is_activating();
        deactivating |= state == DeviceState::Deactivating;
    }

    if activated {
        NMState::ConnectedLocal
    } else if activating {
        NMState::Connecting
    } else if deactivating {
        NMState::Disconnecting
    } else {
        NMState::Disconnected
    }
}
