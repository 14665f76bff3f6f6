//! Permission names checked against the policy backend.

use crate::services::settings::{ConnectionProfile, IpMethod};

/// Control networking (activate, deactivate, manage devices).
pub const NETWORK_CONTROL: &str = "org.freedesktop.NetworkManager.network-control";

/// Share a connection over a Wi-Fi network that has a security setting.
pub const WIFI_SHARE_PROTECTED: &str = "org.freedesktop.NetworkManager.wifi.share.protected";

/// Share a connection over an open Wi-Fi network.
pub const WIFI_SHARE_OPEN: &str = "org.freedesktop.NetworkManager.wifi.share.open";

/// Permission needed to share `profile` over Wi-Fi, if it does so.
///
/// Applies only to Wi-Fi profiles with a shared IPv4 method. Whether the
/// protected or the open permission is needed depends only on the presence
/// of a wireless security setting.
pub fn wifi_share_permission(profile: &ConnectionProfile) -> Option<&'static str> {
    if profile.ipv4.method != IpMethod::Shared {
        return None;
    }
    profile.has_wireless_security().map(|secured| {
        if secured {
            WIFI_SHARE_PROTECTED
        } else {
            WIFI_SHARE_OPEN
        }
    })
}

/// Caller-visible message for a denied permission.
pub fn denial_message(permission: &str) -> &'static str {
    match permission {
        WIFI_SHARE_PROTECTED | WIFI_SHARE_OPEN => "Not authorized to share connections via wifi.",
        _ => "Not authorized to control networking.",
    }
}
