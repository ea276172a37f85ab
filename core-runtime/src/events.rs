//! # Event Bus System
//!
//! Decoupled notification channel between the API client core and the
//! presentation layer, built on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The data layer never navigates. When the session ends involuntarily (the
//! refresh credential was rejected, the refresh timed out, there was nothing to
//! refresh with) the core emits [`AuthEvent::SessionInvalidated`] and the
//! presentation layer reacts by routing to the entry page.
//!
//! ```text
//! ┌──────────────────┐   emit   ┌──────────┐  subscribe  ┌──────────────┐
//! │ RefreshCoordinator├────────>│          ├────────────>│ Router / UI  │
//! └──────────────────┘          │ EventBus │             └──────────────┘
//! ┌──────────────────┐   emit   │          │  subscribe  ┌──────────────┐
//! │ SessionController├────────>│          ├────────────>│ Audit logger │
//! └──────────────────┘          └──────────┘             └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).ok();
//!
//! if let Ok(CoreEvent::Auth(AuthEvent::SignedOut)) = rx.recv().await {
//!     // show the login page
//! }
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender is gone; the core shut down.
//!
//! `emit` fails only when nobody is subscribed, which callers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session and credential lifecycle
    Auth(AuthEvent),
    /// Authenticated request retries
    Request(RequestEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Request(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::SessionInvalidated { .. }) => EventSeverity::Warning,
            CoreEvent::Request(RequestEvent::RetryExhausted { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::SignedOut) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Session lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A login request was sent.
    SigningIn,
    /// Login succeeded and the profile was loaded.
    SignedIn {
        /// Email of the authenticated user.
        email: String,
    },
    /// Stored credentials were validated at startup.
    Rehydrated {
        email: String,
    },
    /// The session was cleared on request.
    SignedOut,
    /// A refresh call started.
    TokenRefreshing,
    /// A refresh call succeeded and the new pair is stored.
    TokenRefreshed {
        /// Requests that were parked behind this refresh and are now replayed.
        released_waiters: usize,
    },
    /// The session was destroyed because it could not be recovered.
    ///
    /// The presentation layer is expected to navigate to `redirect_to`.
    SessionInvalidated {
        reason: String,
        redirect_to: String,
    },
    /// Authentication error that did not end the session.
    AuthError {
        message: String,
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn => "Signing in",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::Rehydrated { .. } => "Stored session restored",
            AuthEvent::SignedOut => "User signed out",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SessionInvalidated { .. } => "Session invalidated",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Request Events
// ============================================================================

/// Events describing how the authenticated client recovered (or failed to
/// recover) individual requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RequestEvent {
    /// A request rejected with 401 was replayed with a refreshed credential.
    Replayed { method: String, url: String },
    /// A replayed request was rejected with 401 again.
    RetryExhausted { method: String, url: String },
}

impl RequestEvent {
    fn description(&self) -> &str {
        match self {
            RequestEvent::Replayed { .. } => "Request replayed with refreshed credential",
            RequestEvent::RetryExhausted { .. } => "Request rejected after retry",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` bounds how far a subscriber may fall behind before it gets
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{AuthEvent, CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let invalidations = EventStream::new(bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::Auth(AuthEvent::SessionInvalidated { .. }))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
