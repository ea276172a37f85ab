//! # Refresh Coordinator
//!
//! Single-flight credential refresh with a FIFO queue of waiting requests.
//!
//! ## Overview
//!
//! Every request that is rejected with 401 asks the coordinator for a fresh
//! access credential. The first one to arrive while the coordinator is idle
//! starts the refresh; everyone arriving before it finishes is parked in the
//! queue. When the refresh finishes, all parked requests receive the same
//! outcome.
//!
//! ```text
//!            acquire_token()                   refresh task
//!  req A ──┐                              ┌──────────────────────┐
//!  req B ──┼─> lock ─> enqueue ─> spawn? ─>│ POST /auth/refresh   │
//!  req C ──┘     (no await inside)         │ store pair / logout  │
//!                                          └──────────┬───────────┘
//!                      lock ─> refreshing = false, drain queue
//!                               └─> A, B, C get the same Result
//! ```
//!
//! ## Guarantees
//!
//! - At most one refresh call is outstanding per coordinator.
//! - The queue is non-empty only while `refreshing` is set, and it is drained
//!   in the same critical section that clears the flag.
//! - The refresh runs in its own task, started in the critical section that
//!   sets the flag. Cancelling a caller never leaves the flag stuck.
//! - A failed refresh destroys the session before any waiter sees the error.

use crate::credentials::CredentialStore;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Outcome broadcast to every request parked behind one refresh.
pub type RefreshOutcome = std::result::Result<String, AuthError>;

/// Performs the actual credential exchange for the coordinator.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange the stored refresh credential for a new pair, persist it and
    /// return the new access credential.
    ///
    /// Return [`AuthError::Unauthenticated`] without calling the server when
    /// there is no refresh credential.
    async fn refresh(&self) -> Result<String>;

    /// Tear the session down after a failed refresh.
    ///
    /// Returns `false` if the session had already been replaced or signed
    /// out since the refresh started; nothing is torn down in that case and
    /// no invalidation is announced.
    async fn invalidate(&self, reason: &str) -> bool;
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Owner of the "refresh in progress" flag and the waiter queue.
///
/// Cloning is cheap; clones coordinate through the same state. Independent
/// coordinators never share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    credentials: CredentialStore,
    state: Arc<Mutex<RefreshState>>,
    events: EventBus,
    timeout: Duration,
    entry_route: Arc<str>,
}

impl RefreshCoordinator {
    /// `timeout` bounds the whole refresh; running out counts as a failure.
    /// `entry_route` is where the presentation layer is told to go when the
    /// session is invalidated.
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        credentials: CredentialStore,
        events: EventBus,
        timeout: Duration,
        entry_route: impl Into<String>,
    ) -> Self {
        let entry_route: String = entry_route.into();
        Self {
            refresher,
            credentials,
            state: Arc::new(Mutex::new(RefreshState::default())),
            events,
            timeout,
            entry_route: Arc::from(entry_route),
        }
    }

    /// Get an access credential to replay a request that was rejected while
    /// carrying `rejected` (or no credential at all).
    ///
    /// If the credential has already been replaced since the request was
    /// sent, the current one is returned straight away. Otherwise the caller
    /// joins the current refresh, starting one if none is running.
    pub async fn acquire_token(&self, rejected: Option<&str>) -> Result<String> {
        let receiver = {
            let mut state = self.state.lock();

            if !state.refreshing {
                if let Some(current) = self.credentials.access_token() {
                    if Some(current.as_str()) != rejected {
                        debug!("Credential already rotated, replaying with current one");
                        return Ok(current);
                    }
                }
            }

            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);

            if state.refreshing {
                debug!(queued = state.waiters.len(), "Refresh in flight, queued");
            } else {
                state.refreshing = true;
                self.spawn_refresh();
            }

            receiver
        };

        receiver.await.unwrap_or_else(|_| {
            Err(AuthError::SessionExpired {
                reason: "refresh task ended without an outcome".to_string(),
            })
        })
    }

    /// True while a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of requests currently parked behind the refresh.
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn spawn_refresh(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let outcome = coordinator.run_refresh().await;
            coordinator.finish(outcome);
        });
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));
        info!("Refreshing access credential");

        let refresher = Arc::clone(&self.refresher);
        let timeout = self.timeout;
        // Inner task so a panicking refresher still reaches `finish`.
        let attempt = tokio::spawn(async move {
            tokio::time::timeout(timeout, refresher.refresh()).await
        });

        let failure = match attempt.await {
            Ok(Ok(Ok(token))) => return Ok(token),
            Ok(Ok(Err(AuthError::Unauthenticated))) => AuthError::Unauthenticated,
            Ok(Ok(Err(AuthError::SessionExpired { reason }))) => {
                AuthError::SessionExpired { reason }
            }
            Ok(Ok(Err(other))) => AuthError::SessionExpired {
                reason: other.to_string(),
            },
            Ok(Err(_elapsed)) => AuthError::SessionExpired {
                reason: format!("refresh timed out after {:?}", timeout),
            },
            Err(join_error) => AuthError::SessionExpired {
                reason: format!("refresh task failed: {}", join_error),
            },
        };

        let reason = failure.to_string();
        warn!(reason = %reason, "Refresh failed, invalidating session");
        if self.refresher.invalidate(&reason).await {
            let _ = self
                .events
                .emit(CoreEvent::Auth(AuthEvent::SessionInvalidated {
                    reason,
                    redirect_to: self.entry_route.to_string(),
                }));
        } else {
            debug!("Session changed during the refresh, nothing to invalidate");
        }

        Err(failure)
    }

    fn finish(&self, outcome: RefreshOutcome) {
        let released = {
            let mut state = self.state.lock();
            state.refreshing = false;
            let waiters = std::mem::take(&mut state.waiters);
            let released = waiters.len();
            for waiter in waiters {
                // The receiver is gone if its caller was cancelled.
                let _ = waiter.send(outcome.clone());
            }
            released
        };

        if outcome.is_ok() {
            info!(released, "Access credential refreshed");
            let _ = self.events.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                released_waiters: released,
            }));
        } else {
            debug!(released, "Rejected queued requests");
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("waiters", &state.waiters.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
