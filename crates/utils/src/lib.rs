//! Shared configuration and logging plumbing

pub mod config;
pub mod logging;

pub use config::Config;
