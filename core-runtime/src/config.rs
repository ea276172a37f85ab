//! # Core Configuration Module
//!
//! Configuration for the authenticated API client core.
//!
//! ## Overview
//!
//! [`CoreConfig`] is assembled through [`CoreConfigBuilder`], which validates
//! eagerly: a config that builds is a config the core can start with.
//!
//! ## Required
//!
//! - `api_base_url` - absolute `http`/`https` URL of the admin API
//! - `HttpClient` - transport bridge (desktop default: reqwest)
//! - `SettingsStore` - credential persistence (desktop default: SQLite)
//!
//! With the `desktop-shims` feature the two bridges fall back to
//! `bridge-desktop` implementations when not injected.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .api_base_url("https://admin.example.com/api")
//!     .request_timeout(Duration::from_secs(15))
//!     .http_client(Arc::new(MyHttpClient))
//!     .settings_store(Arc::new(MySettingsStore))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing bridges produce [`Error::CapabilityMissing`] with a hint on how to
//! provide one; bad values produce [`Error::Config`].
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! CoreConfig::builder()
//!     .api_base_url("ftp://admin.example.com")
//!     .build()
//!     .expect("ftp is not an API scheme");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{HttpClient, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Timeout applied to every request, refresh included, unless overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound accepted for [`CoreConfig::request_timeout`].
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Paths of the authentication endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// Exchanges `{ email, password }` for a token pair.
    pub login: String,
    /// Exchanges `{ refresh_token }` for a rotated token pair.
    pub refresh: String,
    /// Returns the signed-in user's profile.
    pub profile: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/".to_string(),
            refresh: "/auth/refresh".to_string(),
            profile: "/users/me".to_string(),
        }
    }
}

/// Presentation routes the core refers to when it asks for navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Where an unauthenticated user is sent.
    pub entry: String,
    /// Where an authenticated user lacking a permission is sent.
    pub default: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            entry: "/login".to_string(),
            default: "/".to_string(),
        }
    }
}

/// Core configuration. Use [`CoreConfig::builder`] to construct.
#[derive(Clone)]
pub struct CoreConfig {
    pub api_base_url: Url,
    pub request_timeout: Duration,
    pub event_buffer_size: usize,
    pub endpoints: AuthEndpoints,
    pub routes: RouteConfig,
    pub http_client: Arc<dyn HttpClient>,
    pub settings_store: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("endpoints", &self.endpoints)
            .field("routes", &self.routes)
            .field("http_client", &"HttpClient { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .finish()
    }
}

/// Join an API path onto a base URL with exactly one `/` between them.
///
/// Absolute `http(s)` URLs are returned unchanged.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Resolve an API path against the base URL.
    ///
    /// The base URL's own path is kept, so `https://host/api` + `/users/me`
    /// gives `https://host/api/users/me`. Absolute URLs are returned as-is.
    ///
    /// ```
    /// # use core_runtime::config::CoreConfig;
    /// # fn demo(config: &CoreConfig) {
    /// let url = config.api_url("/users/me");
    /// # }
    /// ```
    pub fn api_url(&self, path: &str) -> String {
        join_url(self.api_base_url.as_str(), path)
    }

    /// Check value ranges. Called by [`CoreConfigBuilder::build`].
    pub fn validate(&self) -> Result<()> {
        validate_values(
            &self.api_base_url,
            self.request_timeout,
            self.event_buffer_size,
            &self.endpoints,
            &self.routes,
        )
    }
}

fn validate_values(
    api_base_url: &Url,
    request_timeout: Duration,
    event_buffer_size: usize,
    endpoints: &AuthEndpoints,
    routes: &RouteConfig,
) -> Result<()> {
    match api_base_url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Config(format!(
                "API base URL must use http or https, got '{}'",
                other
            )))
        }
    }

    if api_base_url.host_str().is_none() {
        return Err(Error::Config("API base URL must include a host".to_string()));
    }

    if request_timeout.is_zero() {
        return Err(Error::Config(
            "Request timeout must be greater than 0".to_string(),
        ));
    }

    if request_timeout > MAX_REQUEST_TIMEOUT {
        return Err(Error::Config(format!(
            "Request timeout exceeds maximum of {} seconds",
            MAX_REQUEST_TIMEOUT.as_secs()
        )));
    }

    if event_buffer_size == 0 {
        return Err(Error::Config(
            "Event buffer size must be greater than 0".to_string(),
        ));
    }

    for (name, path) in [
        ("login", &endpoints.login),
        ("refresh", &endpoints.refresh),
        ("profile", &endpoints.profile),
    ] {
        if path.trim().is_empty() {
            return Err(Error::Config(format!(
                "The {} endpoint path cannot be empty",
                name
            )));
        }
    }

    for (name, route) in [("entry", &routes.entry), ("default", &routes.default)] {
        if !route.starts_with('/') {
            return Err(Error::Config(format!(
                "The {} route must be an absolute path, got '{}'",
                name, route
            )));
        }
    }

    Ok(())
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the admin API. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject a client wrapping the platform HTTP stack."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    Err(Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required to persist credentials. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteSettingsStore. \
                 Web: inject a localStorage-backed store."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let init_store = move || -> Result<SqliteSettingsStore> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create runtime for default settings store: {}",
                    e
                ))
            })?;

        let store = runtime.block_on(async move {
            match path {
                Some(path) => SqliteSettingsStore::new(path).await,
                None => SqliteSettingsStore::open_default().await,
            }
        })?;
        Ok(store)
    };

    // block_on panics on a runtime thread, so hop to a plain one.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(init_store).join().map_err(|_| {
            Error::Internal("Settings store initialization thread panicked".to_string())
        })??,
        Err(_) => init_store()?,
    };

    Ok(Arc::new(store))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    api_base_url: Option<String>,
    request_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    endpoints: AuthEndpoints,
    routes: RouteConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    settings_path: Option<PathBuf>,
}

impl CoreConfigBuilder {
    /// Sets the admin API base URL (required).
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().api_base_url("https://admin.example.com/api");
    /// ```
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sets the timeout applied to every request, refresh included.
    ///
    /// Default: 10 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.login = path.into();
        self
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.refresh = path.into();
        self
    }

    pub fn profile_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.profile = path.into();
        self
    }

    /// Route the presentation layer should show when the session ends.
    ///
    /// Default: `/login`
    pub fn entry_route(mut self, route: impl Into<String>) -> Self {
        self.routes.entry = route.into();
        self
    }

    /// Route shown when a permission check fails.
    ///
    /// Default: `/`
    pub fn default_route(mut self, route: impl Into<String>) -> Self {
        self.routes.default = route.into();
        self
    }

    /// Sets the HTTP transport.
    ///
    /// The transport must return non-2xx statuses as responses and must not
    /// retry on its own; the core decides what a 401 means.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the store used to persist the credential pair.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Database file for the default SQLite settings store.
    ///
    /// Only consulted when no store is injected and `desktop-shims` is on.
    /// Default: `<data_dir>/admin-console/settings.db`
    pub fn settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Validate and build.
    ///
    /// Value checks run before bridge defaults are created, so an invalid
    /// config never touches the filesystem.
    pub fn build(self) -> Result<CoreConfig> {
        let raw_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;

        let api_base_url = Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", raw_url, e)))?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let event_buffer_size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);

        validate_values(
            &api_base_url,
            request_timeout,
            event_buffer_size,
            &self.endpoints,
            &self.routes,
        )?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.settings_path)?,
        };

        Ok(CoreConfig {
            api_base_url,
            request_timeout,
            event_buffer_size,
            endpoints: self.endpoints,
            routes: self.routes,
            http_client,
            settings_store,
        })
    }
}
