//! # Drydock Core
//!
//! Core models for the Drydock CI fleet orchestrator: the canonical host
//! record and the shared error taxonomy.

pub mod error;
pub mod host;

pub use error::{Error, Result};
pub use host::{Host, HostStatus};

/// Core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
