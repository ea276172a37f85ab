use async_trait::async_trait;
use bridge_desktop::SqliteSettingsStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{HttpClient, HttpRequest, HttpResponse, SettingsStore};
use core_runtime::events::AuthEvent;
use core_service::{CoreConfig, CoreError, CoreEvent, CoreService, GuardDecision, PermissionLookup};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Accepts only `Bearer a1` until `expired` is set; refresh always fails.
#[derive(Default)]
struct StubApi {
    expired: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpClient for StubApi {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.url.ends_with("/auth/refresh") {
            return Ok(HttpResponse::new(401, r#"{"detail":"Invalid refresh token"}"#));
        }
        if self.expired.load(Ordering::SeqCst) || request.authorization() != Some("Bearer a1") {
            return Ok(HttpResponse::new(401, "{}"));
        }
        if request.url.ends_with("/users/me") {
            return Ok(HttpResponse::new(
                200,
                r#"{"email":"admin@example.com","role":{"name":"Administrator"}}"#,
            ));
        }
        Ok(HttpResponse::new(200, "[]"))
    }
}

struct AllowAll;

impl PermissionLookup for AllowAll {
    fn has_permission(&self, _role_name: &str, _route_id: &str) -> bool {
        true
    }
}

async fn config(api: Arc<StubApi>, stored: bool) -> CoreConfig {
    let store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
    if stored {
        store.set_string("access_token", "a1").await.unwrap();
        store.set_string("refresh_token", "r1").await.unwrap();
    }
    CoreConfig::builder()
        .api_base_url("https://admin.example.com/api")
        .http_client(api)
        .settings_store(store)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_bootstrap_without_stored_session() {
    let api = Arc::new(StubApi::default());
    let core = CoreService::bootstrap(config(api.clone(), false).await)
        .await
        .unwrap();

    assert!(!core.session().is_authenticated());
    assert_eq!(api.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bootstrap_restores_stored_session() {
    let api = Arc::new(StubApi::default());
    let core = CoreService::bootstrap(config(api, true).await).await.unwrap();

    assert!(core.session().is_authenticated());
    assert_eq!(
        core.session().profile().map(|p| p.email),
        Some("admin@example.com".to_string())
    );

    let hospitals: Value = core.client().get_json("/hospitals").await.unwrap();
    assert_eq!(hospitals, serde_json::json!([]));
}

#[tokio::test]
async fn test_expired_session_reaches_subscribers() {
    let api = Arc::new(StubApi::default());
    let core = CoreService::bootstrap(config(api.clone(), true).await)
        .await
        .unwrap();
    let mut invalidations = core
        .subscribe_events()
        .filter(|e| matches!(e, CoreEvent::Auth(AuthEvent::SessionInvalidated { .. })));

    api.expired.store(true, Ordering::SeqCst);
    let err: CoreError = core
        .client()
        .get_json::<Value>("/hospitals")
        .await
        .unwrap_err()
        .into();

    assert!(err.requires_sign_in());
    assert!(!core.session().is_authenticated());
    match invalidations.recv().await.unwrap() {
        CoreEvent::Auth(AuthEvent::SessionInvalidated { redirect_to, .. }) => {
            assert_eq!(redirect_to, core.config().routes.entry)
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_guard_from_service() {
    let api = Arc::new(StubApi::default());
    let core = CoreService::bootstrap(config(api.clone(), true).await)
        .await
        .unwrap();
    let guard = core.guard(Arc::new(AllowAll));

    assert_eq!(guard.check("hospitals").await, GuardDecision::Allow);

    api.expired.store(true, Ordering::SeqCst);
    assert!(matches!(
        guard.check("hospitals").await,
        GuardDecision::RedirectToEntry { .. }
    ));
}

#[tokio::test]
async fn test_invalid_config_is_a_runtime_error() {
    let err: CoreError = CoreConfig::builder()
        .api_base_url("ftp://admin.example.com")
        .http_client(Arc::new(StubApi::default()))
        .build()
        .unwrap_err()
        .into();

    assert!(matches!(err, CoreError::Runtime(_)));
}
