#![allow(clippy::unwrap_used)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use super::*;
use crate::services::{
    session::SessionMonitor,
    settings::{ConnectionKind, ConnectionProfile, IpMethod, WifiSecurity},
};

#[derive(Default)]
struct ScriptedBackend {
    answers: HashMap<String, (Duration, Option<AuthCallResult>)>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn answer(mut self, permission: &str, result: AuthCallResult) -> Self {
        self.answers
            .insert(permission.to_string(), (Duration::ZERO, Some(result)));
        self
    }

    fn delayed(mut self, permission: &str, delay: Duration, result: AuthCallResult) -> Self {
        self.answers
            .insert(permission.to_string(), (delay, Some(result)));
        self
    }

    fn unreachable(mut self, permission: &str) -> Self {
        self.answers
            .insert(permission.to_string(), (Duration::ZERO, None));
        self
    }
}

#[async_trait]
impl PolicyBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn check(
        &self,
        _subject: &AuthSubject,
        permission: &str,
        _allow_interaction: bool,
    ) -> Result<AuthCallResult, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, answer) = self
            .answers
            .get(permission)
            .cloned()
            .unwrap_or((Duration::ZERO, Some(AuthCallResult::No)));
        tokio::time::sleep(delay).await;
        answer.ok_or(AuthError::BackendUnavailable {
            backend: "scripted",
            reason: "gone".to_string(),
        })
    }
}

fn user() -> AuthSubject {
    AuthSubject::new_from_caller(&CallerInfo {
        sender: Some(":1.42".to_string()),
        uid: 1000,
        pid: 4242,
    })
}

fn chain(permissions: &[&str]) -> AuthChain {
    let mut chain = AuthChain::new(user());
    for permission in permissions {
        chain.add_call(permission, true);
    }
    chain
}

#[tokio::test]
async fn one_denial_denies_the_chain() {
    let backend = ScriptedBackend::default()
        .answer("a", AuthCallResult::Yes)
        .answer("b", AuthCallResult::No);

    let results = chain(&["a", "b"]).run(Arc::new(backend)).await.unwrap();

    assert!(!results.is_authorized());
    assert_eq!(results.first_denied(), Some("b"));
    assert_eq!(results.result("a"), AuthCallResult::Yes);
}

#[tokio::test]
async fn all_granted_authorizes() {
    let backend = ScriptedBackend::default()
        .answer("a", AuthCallResult::Yes)
        .answer("b", AuthCallResult::Yes);

    let results = chain(&["a", "b"]).run(Arc::new(backend)).await.unwrap();

    assert!(results.is_authorized());
    assert_eq!(results.denial_reason(), None);
}

#[tokio::test]
async fn error_result_finishes_without_waiting_for_pending_checks() {
    let backend = ScriptedBackend::default()
        .answer("a", AuthCallResult::Error)
        .delayed("b", Duration::from_secs(30), AuthCallResult::Yes);

    let results = tokio::time::timeout(
        Duration::from_secs(5),
        chain(&["a", "b"]).run(Arc::new(backend)),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(!results.is_authorized());
    assert_eq!(results.result("a"), AuthCallResult::Error);
}

#[tokio::test]
async fn unreachable_backend_is_an_error() {
    let backend = ScriptedBackend::default()
        .answer("a", AuthCallResult::Yes)
        .unreachable("b");

    let result = chain(&["a", "b"]).run(Arc::new(backend)).await;

    assert!(matches!(result, Err(AuthError::BackendUnavailable { .. })));
}

#[tokio::test]
async fn internal_subject_bypasses_backend() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut chain = AuthChain::new(AuthSubject::new_internal());
    chain.add_call(permissions::NETWORK_CONTROL, false);

    let results = chain.run(backend.clone()).await.unwrap();

    assert!(results.is_authorized());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn root_subject_bypasses_backend() {
    let backend = Arc::new(ScriptedBackend::default());
    let root = AuthSubject::new_from_caller(&CallerInfo {
        sender: Some("x:y:1".to_string()),
        uid: 0,
        pid: 42,
    });
    let mut chain = AuthChain::new(root);
    chain
        .add_call(permissions::NETWORK_CONTROL, true)
        .add_call(permissions::WIFI_SHARE_PROTECTED, true);

    let results = chain.run(backend.clone()).await.unwrap();

    assert!(results.is_authorized());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abandoned_chain_does_not_disturb_backend() {
    let backend = Arc::new(
        ScriptedBackend::default().delayed("a", Duration::from_millis(50), AuthCallResult::Yes),
    );

    let run = chain(&["a"]).run(backend.clone());
    let abandoned = tokio::time::timeout(Duration::from_millis(1), run).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn repeated_permissions_are_checked_once() {
    let mut chain = AuthChain::new(user());
    chain.add_call("a", false).add_call("a", true).add_call("b", false);

    assert_eq!(chain.permissions().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn subject_accessors() {
    let subject = user();
    assert_eq!(subject.uid(), 1000);
    assert_eq!(subject.pid(), 4242);
    assert_eq!(subject.dbus_sender(), Some(":1.42"));
    assert!(subject.user_requested());

    let internal = AuthSubject::new_internal();
    assert!(internal.is_internal());
    assert_eq!(internal.uid(), 0);
    assert_eq!(internal.to_string(), "internal");
}

fn wifi_profile(security: bool, method: IpMethod) -> ConnectionProfile {
    let mut profile = ConnectionProfile::ethernet("wifi");
    profile.kind = ConnectionKind::Wifi {
        ssid: "net".to_string(),
        security: security.then(|| WifiSecurity {
            key_mgmt: "wpa-psk".to_string(),
        }),
    };
    profile.ipv4.method = method;
    profile
}

#[test]
fn wifi_share_permission_depends_on_security_presence() {
    assert_eq!(
        permissions::wifi_share_permission(&wifi_profile(true, IpMethod::Shared)),
        Some(permissions::WIFI_SHARE_PROTECTED)
    );
    assert_eq!(
        permissions::wifi_share_permission(&wifi_profile(false, IpMethod::Shared)),
        Some(permissions::WIFI_SHARE_OPEN)
    );
    assert_eq!(
        permissions::wifi_share_permission(&wifi_profile(true, IpMethod::Auto)),
        None
    );

    let mut wired = ConnectionProfile::ethernet("wired");
    wired.ipv4.method = IpMethod::Shared;
    assert_eq!(permissions::wifi_share_permission(&wired), None);
}

#[test]
fn denial_messages() {
    assert_eq!(
        permissions::denial_message(permissions::NETWORK_CONTROL),
        "Not authorized to control networking."
    );
    assert_eq!(
        permissions::denial_message(permissions::WIFI_SHARE_OPEN),
        "Not authorized to share connections via wifi."
    );
}

#[tokio::test]
async fn local_policy() {
    let active = LocalPolicyBackend::new(SessionMonitor::fake());
    let nobody = LocalPolicyBackend::new(SessionMonitor::none());
    let root = AuthSubject::new_unix_process(0, 1);

    assert_eq!(
        nobody
            .check(&root, permissions::WIFI_SHARE_OPEN, false)
            .await
            .unwrap(),
        AuthCallResult::Yes
    );
    assert_eq!(
        active
            .check(&user(), permissions::NETWORK_CONTROL, false)
            .await
            .unwrap(),
        AuthCallResult::Yes
    );
    assert_eq!(
        active
            .check(&user(), permissions::WIFI_SHARE_PROTECTED, false)
            .await
            .unwrap(),
        AuthCallResult::No
    );
    assert_eq!(
        nobody
            .check(&user(), permissions::NETWORK_CONTROL, false)
            .await
            .unwrap(),
        AuthCallResult::No
    );
}
