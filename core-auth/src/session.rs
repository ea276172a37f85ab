//! # Session Controller
//!
//! Owns the lifecycle of the admin session: sign-in, sign-out, restoring a
//! persisted session at start-up and probing the current user.
//!
//! A session exists while both a user profile and an access credential are
//! held. It is created by [`SessionController::login`] or a successful
//! [`SessionController::rehydrate`], and destroyed by
//! [`SessionController::logout`], a failed refresh or a failed profile fetch.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::SessionController;
//! use core_runtime::config::CoreConfig;
//! use core_runtime::events::EventBus;
//!
//! # async fn demo(config: CoreConfig) -> core_auth::Result<()> {
//! let session = SessionController::new(&config, EventBus::new(config.event_buffer_size));
//!
//! if session.rehydrate().await?.is_none() {
//!     session.login("admin@example.com", "secret").await?;
//! }
//!
//! let hospitals: serde_json::Value = session.client().get_json("/hospitals").await?;
//! # let _ = hospitals;
//! # Ok(())
//! # }
//! ```

use crate::authenticator::RequestAuthenticator;
use crate::client::{parse_json, ApiClient};
use crate::credentials::CredentialStore;
use crate::error::{AuthError, Result};
use crate::refresh::{RefreshCoordinator, TokenRefresher};
use crate::types::{LoginRequest, RefreshRequest, TokenResponse, UserProfile};
use async_trait::async_trait;
use bridge_traits::{HttpClient, HttpRequest};
use core_runtime::config::{CoreConfig, RouteConfig};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

type SharedProfile = Arc<RwLock<Option<UserProfile>>>;

/// Exchanges the stored refresh credential at the refresh endpoint.
///
/// Refresh credentials are single use: the rotated pair returned by the
/// server replaces both stored values, unless the session was signed out or
/// replaced while the exchange was on the wire.
pub(crate) struct SessionRefresher {
    http: Arc<dyn HttpClient>,
    credentials: CredentialStore,
    profile: SharedProfile,
    refresh_url: String,
    timeout: Duration,
    /// Session epoch the running refresh started in.
    started_in: Mutex<Option<u64>>,
}

impl SessionRefresher {
    fn new(
        http: Arc<dyn HttpClient>,
        credentials: CredentialStore,
        profile: SharedProfile,
        refresh_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            credentials,
            profile,
            refresh_url,
            timeout,
            started_in: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenRefresher for SessionRefresher {
    async fn refresh(&self) -> Result<String> {
        let (epoch, refresh_token) = self.credentials.refresh_token_with_epoch();
        *self.started_in.lock() = Some(epoch);
        let refresh_token = refresh_token.ok_or(AuthError::Unauthenticated)?;

        let request = HttpRequest::post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .map_err(|e| AuthError::Serialization(e.to_string()))?
            .timeout(self.timeout);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(AuthError::transport)?;

        if !response.is_success() {
            return Err(AuthError::SessionExpired {
                reason: format!("refresh rejected with status {}", response.status),
            });
        }

        let tokens: TokenResponse = parse_json(&response)?;
        let access_token = tokens.access_token.clone();
        self.credentials
            .store_rotated(tokens.into_pair(), epoch)
            .await?;

        Ok(access_token)
    }

    async fn invalidate(&self, reason: &str) -> bool {
        let started_in = self.started_in.lock().take();
        let cleared = match started_in {
            Some(epoch) => self.credentials.clear_if_current(epoch).await,
            None => self.credentials.clear().await.map(|()| true),
        };

        match cleared {
            Ok(false) => {
                debug!(reason, "Session already replaced, keeping it");
                false
            }
            Ok(true) => {
                debug!(reason, "Dropping session state");
                self.profile.write().take();
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to remove persisted credentials");
                self.profile.write().take();
                true
            }
        }
    }
}

/// Session lifecycle for one admin API client.
///
/// Cloning is cheap; clones share the credentials, profile and refresh
/// state.
#[derive(Clone)]
pub struct SessionController {
    http: Arc<dyn HttpClient>,
    credentials: CredentialStore,
    profile: SharedProfile,
    client: ApiClient,
    events: EventBus,
    login_url: Arc<str>,
    profile_path: Arc<str>,
    routes: RouteConfig,
    timeout: Duration,
}

impl SessionController {
    /// Wire the credential store, refresh coordinator and API client for
    /// `config`. Nothing is read from storage until [`Self::rehydrate`].
    pub fn new(config: &CoreConfig, events: EventBus) -> Self {
        let http = Arc::clone(&config.http_client);
        let credentials = CredentialStore::new(Arc::clone(&config.settings_store));
        let profile: SharedProfile = Arc::new(RwLock::new(None));

        let refresher = Arc::new(SessionRefresher::new(
            Arc::clone(&http),
            credentials.clone(),
            Arc::clone(&profile),
            config.api_url(&config.endpoints.refresh),
            config.request_timeout,
        ));

        let coordinator = RefreshCoordinator::new(
            refresher,
            credentials.clone(),
            events.clone(),
            config.request_timeout,
            config.routes.entry.clone(),
        );

        let client = ApiClient::new(
            Arc::clone(&http),
            RequestAuthenticator::new(credentials.clone()),
            coordinator,
            events.clone(),
            config.api_base_url.as_str(),
            config.request_timeout,
        );

        Self {
            http,
            credentials,
            profile,
            client,
            events,
            login_url: Arc::from(config.api_url(&config.endpoints.login)),
            profile_path: Arc::from(config.endpoints.profile.as_str()),
            routes: config.routes.clone(),
            timeout: config.request_timeout,
        }
    }

    /// Authenticated client sharing this session's credentials.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    /// Last profile fetched by [`Self::whoami`], if any.
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.profile.read().is_some() && self.credentials.access_token().is_some()
    }

    /// Sign in with email and password.
    ///
    /// The credential pair is stored before the profile is fetched. If any
    /// step fails, everything stored so far is removed again.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] if the server rejects the login
    /// - [`AuthError::Transport`] / [`AuthError::Business`] as returned
    /// - [`AuthError::Storage`] if the pair cannot be persisted
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::SigningIn));

        match self.try_login(email, password).await {
            Ok(profile) => {
                info!("Signed in");
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::SignedIn {
                    email: profile.email.clone(),
                }));
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                self.discard_local_state().await;
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: !e.is_session_terminal(),
                }));
                Err(e)
            }
        }
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<UserProfile> {
        // Sent on the raw transport: a rejected login must not trigger a refresh.
        let request = HttpRequest::post(&*self.login_url)
            .json(&LoginRequest { email, password })
            .map_err(|e| AuthError::Serialization(e.to_string()))?
            .timeout(self.timeout);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(AuthError::transport)?;

        match response.status {
            401 | 403 => return Err(AuthError::InvalidCredentials),
            status if !response.is_success() => {
                return Err(AuthError::Business {
                    status,
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                })
            }
            _ => {}
        }

        let tokens: TokenResponse = parse_json(&response)?;
        self.credentials.store_pair(tokens.into_pair()).await?;

        self.whoami().await
    }

    /// Drop the credential pair and the cached profile. Safe to call when
    /// already signed out.
    pub async fn logout(&self) -> Result<()> {
        let had_profile = self.profile.write().take().is_some();
        let had_credentials = self.credentials.has_credentials();

        self.credentials.clear().await?;

        if had_profile || had_credentials {
            info!("Signed out");
            let _ = self.events.emit(CoreEvent::Auth(AuthEvent::SignedOut));
        }
        Ok(())
    }

    /// Restore a persisted session.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored session is no
    /// longer valid; in the latter case local state is cleared as by
    /// [`Self::logout`].
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> Result<Option<UserProfile>> {
        if self.credentials.load().await?.is_none() {
            debug!("No stored session");
            return Ok(None);
        }

        match self.whoami().await {
            Ok(profile) => {
                info!("Session restored");
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::Rehydrated {
                    email: profile.email.clone(),
                }));
                Ok(Some(profile))
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                self.logout().await?;
                Ok(None)
            }
        }
    }

    /// Fetch the current user through the authenticated client and cache it.
    ///
    /// Expired credentials are refreshed on the way; a failed refresh has
    /// already torn the session down when this returns.
    pub async fn whoami(&self) -> Result<UserProfile> {
        let profile: UserProfile = self.client.get_json(&self.profile_path).await?;
        *self.profile.write() = Some(profile.clone());
        Ok(profile)
    }

    async fn discard_local_state(&self) {
        self.profile.write().take();
        if let Err(e) = self.credentials.clear().await {
            warn!(error = %e, "Failed to remove partial credentials");
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("authenticated", &self.is_authenticated())
            .field("client", &self.client)
            .finish()
    }
}
