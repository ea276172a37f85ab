//! Workspace umbrella crate.
//!
//! Host applications can depend on `admin-client-workspace` and enable the
//! `desktop-shims` feature to get the service façade wired with the desktop
//! bridges, without listing each workspace crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
