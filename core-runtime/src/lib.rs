//! # Core Runtime Module
//!
//! Foundational infrastructure shared by the admin API client crates:
//! - Logging and tracing setup
//! - Configuration with fail-fast validation
//! - Event bus for session notifications
//!
//! ## Overview
//!
//! Nothing here knows about tokens. `core-auth` builds the credential and
//! refresh machinery on top of these pieces, and `core-service` wires them
//! together from a single [`config::CoreConfig`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
