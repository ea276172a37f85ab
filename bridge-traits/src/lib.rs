//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host (desktop, browser, mobile) must
//! implement for the admin API client core.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Sends a single HTTP request and returns
//!   the raw response, whatever its status
//! - [`SettingsStore`](storage::SettingsStore) - Persistent key-value storage
//!   with atomic transactions, used for the session credentials
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors and keep messages actionable. They
//! must never embed credential values in error messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one implementation can be shared
//! by every in-flight request task.

pub mod error;
pub mod http;
pub mod logging;
pub mod storage;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use storage::{SettingsStore, SettingsTransaction};
