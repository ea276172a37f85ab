//! Request Authenticator
//!
//! Attaches the current access credential to outbound requests.

use crate::credentials::CredentialStore;
use bridge_traits::HttpRequest;

/// Adds `Authorization: Bearer <access>` when an access credential is held.
///
/// Requests pass through untouched when there is none; unauthenticated
/// endpoints such as login rely on that.
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    credentials: CredentialStore,
}

impl RequestAuthenticator {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    pub fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match self.credentials.access_token() {
            Some(token) => request.bearer_token(token),
            None => request,
        }
    }
}
