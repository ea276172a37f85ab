//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP transport and
//! settings storage) into the admin client core and restores any persisted
//! session. Desktop apps typically enable the `desktop-shims` feature, which
//! lets [`CoreConfig`] fall back to the reqwest and SQLite bridges.
//!
//! ```no_run
//! use core_service::{CoreConfig, CoreService};
//!
//! # async fn example() -> core_service::Result<()> {
//! let config = CoreConfig::builder()
//!     .api_base_url("https://admin.example.com/api")
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! if !core.session().is_authenticated() {
//!     core.session().login("admin@example.com", "secret").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{
    ApiClient, AuthError, GuardDecision, PermissionLookup, RouteGuard, SessionController,
    UserProfile,
};
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventBus, EventStream};

use std::sync::Arc;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    events: EventBus,
    session: SessionController,
}

impl CoreService {
    /// Wire the service without touching storage or the network.
    pub fn new(config: CoreConfig) -> Self {
        let events = EventBus::new(config.event_buffer_size);
        let session = SessionController::new(&config, events.clone());
        Self {
            config: Arc::new(config),
            events,
            session,
        }
    }

    /// Wire the service and restore the persisted session, if it is still
    /// valid.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let service = Self::new(config);
        match service.session.rehydrate().await? {
            Some(_) => info!("Core started with a restored session"),
            None => info!("Core started signed out"),
        }
        Ok(service)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Authenticated client for admin API calls.
    pub fn client(&self) -> &ApiClient {
        self.session.client()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stream of core events; past events are not replayed.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Route guard backed by the host's permission table.
    pub fn guard(&self, lookup: Arc<dyn PermissionLookup>) -> RouteGuard {
        RouteGuard::new(self.session.clone(), lookup)
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish()
    }
}
