//! # Drydock Cloud
//!
//! Cloud provider abstractions for Drydock: one capability contract over
//! heterogeneous backends, a GCE adapter, and a deterministic mock.

pub mod gce;
pub mod mock;
pub mod provider;

pub use gce::{GceProvider, PROVIDER_NAME_GCE};
pub use mock::{MockFlags, MockInstance, MockProvider, PROVIDER_NAME_MOCK};
pub use provider::{
    CloudProvider, InstanceSnapshot, ProviderCredentials, ProviderRegistry, ProviderSettings,
};

/// Cloud module version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
