//! # Authenticated API Client
//!
//! Wraps the host [`HttpClient`] with bearer authentication and transparent
//! recovery from expired access credentials.
//!
//! ## Response handling
//!
//! | Response                          | Result                                   |
//! |-----------------------------------|------------------------------------------|
//! | 2xx                               | `Ok(response)`                           |
//! | 401 on first attempt              | refresh (or join one), replay once       |
//! | 401 on the replay                 | [`AuthError::RetryExhausted`]            |
//! | any other status                  | [`AuthError::Business`] with the body    |
//! | no response                       | [`AuthError::Transport`]                 |
//!
//! Callers never see the 401 that triggered a successful refresh; they only
//! see a slower success.

use crate::authenticator::RequestAuthenticator;
use crate::error::{AuthError, Result};
use crate::refresh::RefreshCoordinator;
use bridge_traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::join_url;
use core_runtime::events::{CoreEvent, EventBus, RequestEvent};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A request on its way through the client, with its retry mark.
struct OutboundRequest {
    request: HttpRequest,
    retried: bool,
}

impl OutboundRequest {
    fn new(request: HttpRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    fn bearer_token(&self) -> Option<&str> {
        self.request
            .authorization()
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    /// Mark as retried and swap in the credential obtained from the refresh.
    fn into_replay(self, token: &str) -> Self {
        Self {
            request: self.request.bearer_token(token),
            retried: true,
        }
    }
}

/// HTTP client for the admin API.
///
/// Cloning is cheap; clones share the transport, credentials and
/// coordinator.
#[derive(Clone)]
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    authenticator: RequestAuthenticator,
    coordinator: RefreshCoordinator,
    events: EventBus,
    base_url: Arc<str>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        authenticator: RequestAuthenticator,
        coordinator: RefreshCoordinator,
        events: EventBus,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            authenticator,
            coordinator,
            events,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            timeout,
        }
    }

    /// Absolute URL for an API path. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Build a request for `path` carrying the client-wide timeout.
    pub fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, self.url(path)).timeout(self.timeout)
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send a request with bearer authentication and expiry recovery.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        if request.timeout.is_none() {
            request.timeout = Some(self.timeout);
        }

        let mut outbound = OutboundRequest::new(self.authenticator.authorize(request));

        loop {
            let response = self
                .http
                .execute(outbound.request.clone())
                .await
                .map_err(|e| {
                    warn!(error = %e, "Request did not reach the API");
                    AuthError::transport(e)
                })?;

            if response.is_success() {
                return Ok(response);
            }

            if !response.is_unauthorized() {
                return Err(business_error(response));
            }

            let method = outbound.request.method.to_string();
            let url = outbound.request.url.clone();

            if outbound.retried {
                warn!("Replayed request rejected again");
                let _ = self
                    .events
                    .emit(CoreEvent::Request(RequestEvent::RetryExhausted {
                        method: method.clone(),
                        url: url.clone(),
                    }));
                return Err(AuthError::RetryExhausted { method, url });
            }

            debug!("Access credential rejected, waiting for refresh");
            let rejected = outbound.bearer_token().map(str::to_string);
            let token = self.coordinator.acquire_token(rejected.as_deref()).await?;

            outbound = outbound.into_replay(&token);
            let _ = self
                .events
                .emit(CoreEvent::Request(RequestEvent::Replayed { method, url }));
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(HttpMethod::Get, path)).await?;
        parse_json(&response)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Post, path, body).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Put, path, body).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Patch, path, body).await
    }

    /// `DELETE path`; the response body is ignored.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(HttpMethod::Delete, path)).await?;
        Ok(())
    }

    async fn send_json<B, T>(&self, method: HttpMethod, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self
            .request(method, path)
            .json(body)
            .map_err(|e| AuthError::Serialization(e.to_string()))?;
        let response = self.send(request).await?;
        parse_json(&response)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

fn business_error(response: HttpResponse) -> AuthError {
    let body = String::from_utf8_lossy(&response.body).into_owned();
    debug!(status = response.status, "API returned an error status");
    AuthError::Business {
        status: response.status,
        body,
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    // Some endpoints answer 204 with nothing; treat that as JSON null.
    if response.body.is_empty() {
        return serde_json::from_value(serde_json::Value::Null)
            .map_err(|e| AuthError::InvalidResponse(format!("empty body: {}", e)));
    }
    serde_json::from_slice(&response.body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
}
