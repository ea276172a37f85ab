mod common;

use bridge_traits::SettingsStore;
use common::{FakeApi, Harness, EMAIL, PASSWORD};
use core_auth::{AuthError, CredentialPair, GuardDecision, PermissionLookup, RouteGuard};
use core_runtime::events::{AuthEvent, CoreEvent, EventStream};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

struct AdminOnly;

impl PermissionLookup for AdminOnly {
    fn has_permission(&self, role_name: &str, route_id: &str) -> bool {
        role_name == "Administrator" && route_id != "audit"
    }
}

#[tokio::test]
async fn test_login_then_restart_rehydrates() {
    let h = Harness::new(FakeApi::new()).await;
    let mut rx = h.events.subscribe();

    let profile = h.session.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(profile.email, EMAIL);
    assert!(h.session.is_authenticated());
    assert_eq!(rx.recv().await.unwrap(), CoreEvent::Auth(AuthEvent::SigningIn));
    assert_eq!(
        rx.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::SignedIn {
            email: EMAIL.to_string()
        })
    );

    // A second controller on the same storage plays the part of a restart.
    let restarted = Harness::with_store(h.api.clone(), h.store.clone());
    assert!(!restarted.session.is_authenticated());

    let restored = restarted.session.rehydrate().await.unwrap();
    assert_eq!(restored.map(|p| p.email), Some(EMAIL.to_string()));
    assert!(restarted.session.is_authenticated());
}

#[tokio::test]
async fn test_login_does_not_go_through_refresh() {
    let h = Harness::new(FakeApi::new()).await;

    let err = h.session.login(EMAIL, "wrong").await.unwrap_err();

    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(h.api.refresh_calls(), 0);
    assert_eq!(h.api.seen_at("/auth/").len(), 1);
    assert_eq!(h.stored("access_token").await, None);
}

#[tokio::test]
async fn test_rehydrate_with_expired_access_refreshes() {
    let api = FakeApi::new().with_session();
    api.expire_access();
    let h = Harness::new(api).await;
    h.session
        .credentials()
        .store_pair(CredentialPair::new("a1", "r1"))
        .await
        .unwrap();

    let restored = h.session.rehydrate().await.unwrap();

    assert!(restored.is_some());
    assert_eq!(h.api.refresh_calls(), 1);
    assert_eq!(h.stored("access_token").await.as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_rehydrate_with_dead_session_signs_out() {
    let api = FakeApi::new().with_session();
    api.expire_access();
    api.revoke_refresh();
    let h = Harness::new(api).await;
    h.session
        .credentials()
        .store_pair(CredentialPair::new("a1", "r1"))
        .await
        .unwrap();

    assert_eq!(h.session.rehydrate().await.unwrap(), None);
    assert!(!h.session.is_authenticated());
    assert_eq!(h.stored("access_token").await, None);
    assert_eq!(h.stored("refresh_token").await, None);
}

#[tokio::test]
async fn test_half_stored_pair_is_not_a_session() {
    let h = Harness::new(FakeApi::new()).await;
    h.store.set_string("access_token", "a1").await.unwrap();

    assert_eq!(h.session.rehydrate().await.unwrap(), None);
    assert!(h.api.seen().is_empty());
    assert_eq!(h.stored("access_token").await, None);
}

#[tokio::test]
async fn test_logout_twice() {
    let h = Harness::new(FakeApi::new()).await;
    h.session.login(EMAIL, PASSWORD).await.unwrap();

    h.session.logout().await.unwrap();
    h.session.logout().await.unwrap();

    assert!(!h.session.is_authenticated());
    assert_eq!(h.session.profile(), None);
    assert_eq!(h.stored("refresh_token").await, None);
}

#[tokio::test]
async fn test_pair_is_replaced_as_a_unit() {
    let h = Harness::new(FakeApi::new()).await;
    let credentials = h.session.credentials();

    credentials
        .store_pair(CredentialPair::new("a1", "r1"))
        .await
        .unwrap();
    credentials
        .store_pair(CredentialPair::new("a2", "r2"))
        .await
        .unwrap();

    assert_eq!(h.stored("access_token").await.as_deref(), Some("a2"));
    assert_eq!(h.stored("refresh_token").await.as_deref(), Some("r2"));
    assert_eq!(credentials.load().await.unwrap(), Some(CredentialPair::new("a2", "r2")));
}

#[tokio::test]
async fn test_guard_end_to_end() {
    let h = Harness::new(FakeApi::new()).await;
    h.session.login(EMAIL, PASSWORD).await.unwrap();
    let guard = RouteGuard::new(h.session.clone(), Arc::new(AdminOnly));

    assert_eq!(guard.check("hospitals").await, GuardDecision::Allow);
    assert_eq!(
        guard.check("audit").await,
        GuardDecision::RedirectToDefault {
            route: "/".to_string()
        }
    );

    h.api.expire_access();
    h.api.revoke_refresh();
    assert_eq!(
        guard.check("hospitals").await,
        GuardDecision::RedirectToEntry {
            route: "/login".to_string()
        }
    );
    assert!(!h.session.is_authenticated());
}

/// Session with an expired access credential whose refresh takes a while.
async fn slow_refresh_session() -> Harness {
    let api = FakeApi::with_refresh_delay(Duration::from_millis(300)).with_session();
    api.expire_access();
    Harness::with_pair(api, "a1", "r1").await
}

async fn wait_for_refresh_on_the_wire(h: &Harness) {
    while h.api.refresh_calls() == 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_logout_during_refresh_stays_signed_out() {
    let h = slow_refresh_session().await;
    let mut invalidations = EventStream::new(h.events.subscribe()).filter(|e| {
        matches!(e, CoreEvent::Auth(AuthEvent::SessionInvalidated { .. }))
    });

    let request = {
        let client = h.session.client().clone();
        tokio::spawn(async move { client.get_json::<Value>("/hospitals").await })
    };
    wait_for_refresh_on_the_wire(&h).await;
    assert!(h.session.client().coordinator().is_refreshing());

    h.session.logout().await.unwrap();

    assert_eq!(request.await.unwrap().unwrap_err(), AuthError::Unauthenticated);
    assert_eq!(h.api.refresh_calls(), 1);
    assert_eq!(h.stored("access_token").await, None);
    assert_eq!(h.stored("refresh_token").await, None);
    assert!(!h.session.credentials().has_credentials());
    assert!(invalidations.try_recv().is_none());
}

#[tokio::test]
async fn test_sign_in_during_refresh_survives_its_failure() {
    let h = slow_refresh_session().await;

    let request = {
        let client = h.session.client().clone();
        tokio::spawn(async move { client.get_json::<Value>("/hospitals").await })
    };
    wait_for_refresh_on_the_wire(&h).await;

    h.session.logout().await.unwrap();
    h.session.login(EMAIL, PASSWORD).await.unwrap();

    // r1 was superseded by the login, so the server turns the refresh down.
    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired { .. }));

    assert!(h.session.is_authenticated());
    assert_eq!(h.stored("access_token").await.as_deref(), Some("a2"));
    assert_eq!(h.stored("refresh_token").await.as_deref(), Some("r2"));
    let hospitals: Value = h.session.client().get_json("/hospitals").await.unwrap();
    assert_eq!(hospitals["path"], "/hospitals");
}
