//! Fake admin API used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::SqliteSettingsStore;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse, SettingsStore};
use core_auth::SessionController;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct horse";

/// One request as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub method: HttpMethod,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct ApiState {
    valid_access: Option<String>,
    valid_refresh: Option<String>,
    generation: u32,
    reject_everything: bool,
}

/// Stateful stand-in for the admin API.
///
/// Issues `a<n>`/`r<n>` pairs, honours only the latest access credential and
/// accepts each refresh credential once.
pub struct FakeApi {
    state: Mutex<ApiState>,
    seen: Mutex<Vec<Seen>>,
    refresh_calls: AtomicUsize,
    refresh_delay: Duration,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Self::with_refresh_delay(Duration::ZERO)
    }

    pub fn with_refresh_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ApiState::default()),
            seen: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: delay,
        })
    }

    /// Server-side session matching a stored `a1`/`r1` pair.
    pub fn with_session(self: Arc<Self>) -> Arc<Self> {
        {
            let mut state = self.state.lock();
            state.generation = 1;
            state.valid_access = Some("a1".to_string());
            state.valid_refresh = Some("r1".to_string());
        }
        self
    }

    /// The current access credential stops being accepted.
    pub fn expire_access(&self) {
        self.state.lock().valid_access = None;
    }

    /// The refresh credential is revoked as well.
    pub fn revoke_refresh(&self) {
        self.state.lock().valid_refresh = None;
    }

    /// Answer 401 to every authenticated request, even with fresh credentials.
    pub fn reject_everything(&self) {
        self.state.lock().reject_everything = true;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn seen_at(&self, path: &str) -> Vec<Seen> {
        self.seen().into_iter().filter(|s| s.path == path).collect()
    }

    fn issue_pair(state: &mut ApiState) -> Value {
        state.generation += 1;
        let access = format!("a{}", state.generation);
        let refresh = format!("r{}", state.generation);
        state.valid_access = Some(access.clone());
        state.valid_refresh = Some(refresh.clone());
        json!({ "access_token": access, "refresh_token": refresh, "token_type": "bearer" })
    }

    async fn handle_refresh(&self, body: Value) -> HttpResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let mut state = self.state.lock();
        let presented = body.get("refresh_token").and_then(Value::as_str);
        if presented.is_some() && presented == state.valid_refresh.as_deref() {
            let pair = Self::issue_pair(&mut state);
            HttpResponse::new(200, pair.to_string())
        } else {
            HttpResponse::new(401, r#"{"detail":"Invalid refresh token"}"#)
        }
    }

    fn handle_login(&self, body: Value) -> HttpResponse {
        let email = body.get("email").and_then(Value::as_str);
        let password = body.get("password").and_then(Value::as_str);
        if email == Some(EMAIL) && password == Some(PASSWORD) {
            let pair = Self::issue_pair(&mut self.state.lock());
            HttpResponse::new(200, pair.to_string())
        } else {
            HttpResponse::new(401, r#"{"detail":"Incorrect email or password"}"#)
        }
    }

    fn handle_protected(&self, path: &str, authorization: Option<&str>) -> HttpResponse {
        let state = self.state.lock();
        let expected = state.valid_access.as_ref().map(|a| format!("Bearer {}", a));
        if state.reject_everything || expected.is_none() || authorization != expected.as_deref()
        {
            return HttpResponse::new(401, r#"{"detail":"Could not validate credentials"}"#);
        }

        match path {
            "/users/me" => HttpResponse::new(
                200,
                json!({ "id": 1, "email": EMAIL, "role": { "id": 1, "name": "Administrator" } })
                    .to_string(),
            ),
            "/broken" => HttpResponse::new(500, r#"{"detail":"Internal Server Error"}"#),
            "/hospitals/999" => HttpResponse::new(404, r#"{"detail":"Hospital not found"}"#),
            _ => HttpResponse::new(200, json!({ "path": path }).to_string()),
        }
    }
}

#[async_trait]
impl HttpClient for FakeApi {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let path = request
            .url
            .strip_prefix("https://api.test")
            .unwrap_or(&request.url)
            .to_string();
        let authorization = request.authorization().map(str::to_string);
        self.seen.lock().push(Seen {
            method: request.method,
            path: path.clone(),
            authorization: authorization.clone(),
        });

        let body: Value = request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
            .unwrap_or(Value::Null);

        match path.as_str() {
            "/offline" => Err(BridgeError::Connection("connection refused".to_string())),
            "/auth/refresh" => Ok(self.handle_refresh(body).await),
            "/auth/" => Ok(self.handle_login(body)),
            _ => Ok(self.handle_protected(&path, authorization.as_deref())),
        }
    }
}

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub store: Arc<SqliteSettingsStore>,
    pub events: EventBus,
    pub session: SessionController,
}

impl Harness {
    pub async fn new(api: Arc<FakeApi>) -> Self {
        let store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        Self::with_store(api, store)
    }

    /// Start with `access`/`refresh` already persisted and loaded.
    pub async fn with_pair(api: Arc<FakeApi>, access: &str, refresh: &str) -> Self {
        let store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        store.set_string("access_token", access).await.unwrap();
        store.set_string("refresh_token", refresh).await.unwrap();
        let harness = Self::with_store(api, store);
        harness.session.credentials().load().await.unwrap();
        harness
    }

    pub fn with_store(api: Arc<FakeApi>, store: Arc<SqliteSettingsStore>) -> Self {
        let config = CoreConfig::builder()
            .api_base_url("https://api.test")
            .http_client(api.clone())
            .settings_store(store.clone())
            .build()
            .unwrap();
        let events = EventBus::new(64);
        let session = SessionController::new(&config, events.clone());
        Self {
            api,
            store,
            events,
            session,
        }
    }

    pub async fn stored(&self, key: &str) -> Option<String> {
        self.store.get_string(key).await.unwrap()
    }
}
