//! # Authentication Module
//!
//! Session management and transparent credential refresh for the admin API.
//!
//! ## Overview
//!
//! Requests leave through [`ApiClient`], which attaches the stored access
//! credential. When the API answers 401, the request is parked behind a
//! single refresh owned by [`RefreshCoordinator`] and replayed once with the
//! rotated credential. A refresh that fails destroys the session and emits
//! [`AuthEvent::SessionInvalidated`](core_runtime::events::AuthEvent) so the
//! presentation layer can navigate to its entry page.
//!
//! ## Features
//!
//! - At most one refresh in flight per client, however many requests expire
//! - Every parked request sees the same refresh outcome
//! - A replayed request is never refreshed a second time
//! - Access and refresh credentials persisted together or not at all
//! - Login, logout, start-up rehydration and route guarding

pub mod authenticator;
pub mod client;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod refresh;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

pub use authenticator::RequestAuthenticator;
pub use client::ApiClient;
pub use credentials::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use error::{AuthError, Result};
pub use guard::{GuardDecision, PermissionLookup, RouteGuard};
pub use refresh::{RefreshCoordinator, RefreshOutcome, TokenRefresher};
pub use session::SessionController;
pub use types::{CredentialPair, Role, TokenResponse, UserProfile};
