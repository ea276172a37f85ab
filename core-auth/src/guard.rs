//! Route authorization guard.
//!
//! Revalidates the session before a protected view is shown and asks the
//! host's permission table whether the user's role may open it. Which roles
//! may open which routes is the host's business; the guard only applies the
//! answer.

use crate::session::SessionController;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-side permission table.
pub trait PermissionLookup: Send + Sync {
    fn has_permission(&self, role_name: &str, route_id: &str) -> bool;
}

/// What the presentation layer should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// The session is gone; go to the entry page.
    RedirectToEntry { route: String },
    /// Signed in but not permitted here.
    RedirectToDefault { route: String },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    session: SessionController,
    lookup: Arc<dyn PermissionLookup>,
}

impl RouteGuard {
    pub fn new(session: SessionController, lookup: Arc<dyn PermissionLookup>) -> Self {
        Self { session, lookup }
    }

    /// Decide whether `route_id` may be shown.
    ///
    /// Always probes the server; a failed probe signs the user out.
    pub async fn check(&self, route_id: &str) -> GuardDecision {
        let profile = match self.session.whoami().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(route_id, error = %e, "Session probe failed, signing out");
                if let Err(e) = self.session.logout().await {
                    warn!(error = %e, "Sign-out after failed probe did not complete");
                }
                return GuardDecision::RedirectToEntry {
                    route: self.session.routes().entry.clone(),
                };
            }
        };

        let permitted = profile
            .role_name()
            .map(|role| self.lookup.has_permission(role, route_id))
            .unwrap_or(false);

        if permitted {
            GuardDecision::Allow
        } else {
            debug!(route_id, "Route not permitted for role");
            GuardDecision::RedirectToDefault {
                route: self.session.routes().default.clone(),
            }
        }
    }
}

impl std::fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuard")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_with, MemoryStore};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpClient, HttpRequest, HttpResponse};
    use core_runtime::events::EventBus;
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        Lookup {}

        impl PermissionLookup for Lookup {
            fn has_permission(&self, role_name: &str, route_id: &str) -> bool;
        }
    }

    /// Serves the profile endpoint with a fixed status and body.
    struct ProfileServer {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for ProfileServer {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            if request.url.ends_with("/auth/refresh") {
                return Ok(HttpResponse::new(401, "refresh rejected"));
            }
            Ok(HttpResponse::new(self.status, self.body))
        }
    }

    async fn guard(server: ProfileServer, lookup: MockLookup) -> (RouteGuard, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_pair("a1", "r1"));
        let session =
            SessionController::new(&config_with(Arc::new(server), store.clone()), EventBus::new(16));
        session.credentials().load().await.unwrap();
        (RouteGuard::new(session, Arc::new(lookup)), store)
    }

    #[tokio::test]
    async fn test_permitted_role_is_allowed() {
        let mut lookup = MockLookup::new();
        lookup
            .expect_has_permission()
            .with(eq("Administrator"), eq("hospitals"))
            .times(1)
            .return_const(true);

        let (guard, _) = guard(
            ProfileServer {
                status: 200,
                body: r#"{"email":"admin@example.com","role":{"name":"Administrator"}}"#,
            },
            lookup,
        )
        .await;

        assert!(guard.check("hospitals").await.is_allowed());
    }

    #[tokio::test]
    async fn test_denied_role_goes_to_default_route() {
        let mut lookup = MockLookup::new();
        lookup.expect_has_permission().return_const(false);

        let (guard, store) = guard(
            ProfileServer {
                status: 200,
                body: r#"{"email":"viewer@example.com","role":{"name":"Viewer"}}"#,
            },
            lookup,
        )
        .await;

        assert_eq!(
            guard.check("users").await,
            GuardDecision::RedirectToDefault {
                route: "/".to_string()
            }
        );
        // Denial is not a sign-out.
        assert_eq!(store.value("access_token").as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_profile_without_role_is_denied() {
        let mut lookup = MockLookup::new();
        lookup.expect_has_permission().never();

        let (guard, _) = guard(
            ProfileServer {
                status: 200,
                body: r#"{"email":"nobody@example.com"}"#,
            },
            lookup,
        )
        .await;

        assert!(matches!(
            guard.check("users").await,
            GuardDecision::RedirectToDefault { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_probe_signs_out_and_goes_to_entry() {
        let mut lookup = MockLookup::new();
        lookup.expect_has_permission().never();

        let (guard, store) = guard(
            ProfileServer {
                status: 401,
                body: "expired",
            },
            lookup,
        )
        .await;

        assert_eq!(
            guard.check("hospitals").await,
            GuardDecision::RedirectToEntry {
                route: "/login".to_string()
            }
        );
        assert_eq!(store.value("access_token"), None);
        assert_eq!(store.value("refresh_token"), None);
    }
}
