use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors surfaced by the authenticated client and the session controller.
///
/// Clone because one refresh outcome is broadcast to every request parked
/// behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential to refresh with; the refresh endpoint was not called.
    #[error("Not authenticated")]
    Unauthenticated,

    /// A refresh was attempted and failed. The session has been destroyed.
    #[error("Session expired: {reason}")]
    SessionExpired { reason: String },

    /// A request was rejected with 401 again after being replayed.
    #[error("{method} {url} was rejected after refreshing credentials")]
    RetryExhausted { method: String, url: String },

    /// The login endpoint rejected the supplied identifier or secret.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-authorization failure returned by the API, passed through as-is.
    #[error("Request failed with status {status}")]
    Business { status: u16, body: String },

    #[error("Credential storage failed: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    pub(crate) fn transport(err: BridgeError) -> Self {
        AuthError::Transport(err.to_string())
    }

    pub(crate) fn storage(err: BridgeError) -> Self {
        AuthError::Storage(err.to_string())
    }

    /// True when the error means there is no usable session any more.
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthenticated | AuthError::SessionExpired { .. }
        )
    }

    /// HTTP status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Business { status, .. } => Some(*status),
            AuthError::RetryExhausted { .. } => Some(401),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
