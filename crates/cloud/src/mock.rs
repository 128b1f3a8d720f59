//! Deterministic in-memory provider for testing
//!
//! Failure-injection flags force every error branch of the provider
//! contract, and the `is_active`/`has_access_config` flags force every
//! branch of snapshot translation.

use crate::provider::{CloudProvider, InstanceSnapshot, ProviderCredentials, ProviderSettings};
use async_trait::async_trait;
use drydock_core::{Error, Host, HostStatus, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Name the mock registers under
pub const PROVIDER_NAME_MOCK: &str = "mock";

/// Failure-injection and state flags
#[derive(Debug, Clone)]
pub struct MockFlags {
    pub fail_init: bool,
    pub fail_create: bool,
    pub fail_get: bool,
    pub fail_delete: bool,
    pub fail_start: bool,
    pub fail_stop: bool,

    /// When false, every snapshot reports `Stopping` regardless of the
    /// stored instance status
    pub is_active: bool,

    /// When true, snapshots carry the mock access-config address
    pub has_access_config: bool,
}

impl Default for MockFlags {
    fn default() -> Self {
        Self {
            fail_init: false,
            fail_create: false,
            fail_get: false,
            fail_delete: false,
            fail_start: false,
            fail_stop: false,
            is_active: true,
            has_access_config: false,
        }
    }
}

/// One stored mock instance
#[derive(Debug, Clone)]
pub struct MockInstance {
    pub status: HostStatus,
    pub zone: String,
    pub machine_type: String,
}

impl Default for MockInstance {
    fn default() -> Self {
        Self {
            status: HostStatus::Running,
            zone: "us-east1-c".to_string(),
            machine_type: "n1-standard-8".to_string(),
        }
    }
}

impl MockInstance {
    /// Instance with a given status and default zone/machine type
    pub fn with_status(status: HostStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Address surfaced when `has_access_config` is set
pub const MOCK_ACCESS_ADDRESS: &str = "0.0.0.0";

#[derive(Default)]
struct MockState {
    flags: MockFlags,
    instances: HashMap<String, MockInstance>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory mock provider
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    /// Create a mock with default flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with the given flags
    pub fn with_flags(flags: MockFlags) -> Self {
        let mock = Self::new();
        mock.set_flags(flags);
        mock
    }

    /// Replace the flag set
    pub fn set_flags(&self, flags: MockFlags) {
        self.state.lock().unwrap().flags = flags;
    }

    /// Install or replace a stored instance
    pub fn set(&self, id: impl Into<String>, instance: MockInstance) {
        self.state.lock().unwrap().instances.insert(id.into(), instance);
    }

    /// Read back a stored instance
    pub fn instance(&self, id: &str) -> Option<MockInstance> {
        self.state.lock().unwrap().instances.get(id).cloned()
    }

    /// Number of times an operation has been invoked
    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    fn record(state: &mut MockState, op: &'static str) {
        *state.calls.entry(op).or_insert(0) += 1;
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME_MOCK
    }

    async fn initialize(&self, credentials: &ProviderCredentials) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "initialize");
        if state.flags.fail_init {
            return Err(Error::ProviderAuth("failed to initialize client".to_string()));
        }
        // The mock itself needs no session, but empty credential material
        // is still rejected at the boundary.
        if !credentials.is_valid() {
            return Err(Error::ProviderAuth("no credential material".to_string()));
        }
        Ok(())
    }

    async fn create_instance(&self, host: &Host, _settings: &ProviderSettings) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "create_instance");
        if state.flags.fail_create {
            return Err(Error::ProviderProvision("failed to create instance".to_string()));
        }
        state
            .instances
            .insert(host.id.clone(), MockInstance::with_status(HostStatus::Building));
        Ok(host.id.clone())
    }

    async fn get_instance(&self, host: &Host) -> Result<InstanceSnapshot> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "get_instance");
        if state.flags.fail_get {
            return Err(Error::ProviderLookup("failed to get instance".to_string()));
        }
        let instance = state
            .instances
            .get(&host.id)
            .ok_or_else(|| Error::ProviderLookup(format!("instance '{}' unknown", host.id)))?;

        let status = if state.flags.is_active {
            instance.status
        } else {
            HostStatus::Stopping
        };
        let public_address = state
            .flags
            .has_access_config
            .then(|| MOCK_ACCESS_ADDRESS.to_string());

        Ok(InstanceSnapshot {
            status,
            zone: Some(instance.zone.clone()),
            machine_type: Some(instance.machine_type.clone()),
            public_address,
        })
    }

    async fn start_instance(&self, host: &Host) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "start_instance");
        if state.flags.fail_start {
            return Err(Error::ProviderProvision("failed to start instance".to_string()));
        }
        match state.instances.get_mut(&host.id) {
            Some(instance) => {
                instance.status = HostStatus::Running;
                Ok(())
            }
            None => Err(Error::ProviderLookup(format!("instance '{}' unknown", host.id))),
        }
    }

    async fn stop_instance(&self, host: &Host) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "stop_instance");
        if state.flags.fail_stop {
            return Err(Error::ProviderProvision("failed to stop instance".to_string()));
        }
        match state.instances.get_mut(&host.id) {
            Some(instance) => {
                instance.status = HostStatus::Stopped;
                Ok(())
            }
            None => Err(Error::ProviderLookup(format!("instance '{}' unknown", host.id))),
        }
    }

    async fn delete_instance(&self, host: &Host) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "delete_instance");
        if state.flags.fail_delete {
            return Err(Error::ProviderProvision("failed to delete instance".to_string()));
        }
        // Deleting an already-deleted instance is not fatal at the backend.
        state.instances.remove(&host.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Host {
        Host::new("h-mock", PROVIDER_NAME_MOCK, "ubuntu-2204", "ci")
    }

    #[tokio::test]
    async fn test_snapshot_inactive_reports_stopping() {
        let mock = MockProvider::new();
        mock.set("h-mock", MockInstance::with_status(HostStatus::Running));
        mock.set_flags(MockFlags {
            is_active: false,
            ..MockFlags::default()
        });

        let snapshot = mock.get_instance(&host()).await.unwrap();
        assert_eq!(snapshot.status, HostStatus::Stopping);
    }

    #[tokio::test]
    async fn test_snapshot_address_only_with_access_config() {
        let mock = MockProvider::new();
        mock.set("h-mock", MockInstance::default());

        let snapshot = mock.get_instance(&host()).await.unwrap();
        assert_eq!(snapshot.public_address, None);

        mock.set_flags(MockFlags {
            has_access_config: true,
            ..MockFlags::default()
        });
        let snapshot = mock.get_instance(&host()).await.unwrap();
        assert_eq!(snapshot.public_address.as_deref(), Some(MOCK_ACCESS_ADDRESS));
    }

    #[tokio::test]
    async fn test_unknown_instance_is_lookup_error() {
        let mock = MockProvider::new();
        let err = mock.get_instance(&host()).await.unwrap_err();
        assert!(matches!(err, Error::ProviderLookup(_)));
    }

    #[tokio::test]
    async fn test_failure_flags() {
        let mock = MockProvider::with_flags(MockFlags {
            fail_init: true,
            fail_create: true,
            fail_delete: true,
            ..MockFlags::default()
        });
        let h = host();
        let creds = ProviderCredentials::new(PROVIDER_NAME_MOCK).with_field("key", "value");

        assert!(matches!(
            mock.initialize(&creds).await.unwrap_err(),
            Error::ProviderAuth(_)
        ));
        assert!(matches!(
            mock.create_instance(&h, &ProviderSettings::default()).await.unwrap_err(),
            Error::ProviderProvision(_)
        ));
        assert!(matches!(
            mock.delete_instance(&h).await.unwrap_err(),
            Error::ProviderProvision(_)
        ));
    }

    #[tokio::test]
    async fn test_create_then_start_then_stop() {
        let mock = MockProvider::new();
        let h = host();
        let external_id = mock
            .create_instance(&h, &ProviderSettings::default())
            .await
            .unwrap();
        assert_eq!(external_id, h.id);
        assert_eq!(mock.instance(&h.id).unwrap().status, HostStatus::Building);

        mock.start_instance(&h).await.unwrap();
        assert_eq!(mock.instance(&h.id).unwrap().status, HostStatus::Running);

        mock.stop_instance(&h).await.unwrap();
        assert_eq!(mock.instance(&h.id).unwrap().status, HostStatus::Stopped);

        assert_eq!(mock.calls("start_instance"), 1);
    }
}
