//! GCE provider adapter
//!
//! The adapter is split from the wire client so the same translation and
//! contract logic runs against the real compute API and against a
//! deterministic mock client in tests.

use crate::provider::{CloudProvider, InstanceSnapshot, ProviderCredentials, ProviderSettings};
use async_trait::async_trait;
use drydock_core::{Error, Host, HostStatus, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;
use tracing::{debug, info};

/// Name the GCE adapter registers under
pub const PROVIDER_NAME_GCE: &str = "gce";

const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Raw instance document as returned by the compute API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub network_interfaces: Vec<GceNetworkInterface>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceNetworkInterface {
    #[serde(default)]
    pub access_configs: Vec<GceAccessConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceAccessConfig {
    #[serde(default, rename = "natIP")]
    pub nat_ip: String,
}

/// Map a native GCE status string onto the canonical set
///
/// Anything unmapped becomes [`HostStatus::Unknown`] rather than defaulting
/// to a known value, so jobs can report the ambiguity.
pub fn translate_status(native: &str) -> HostStatus {
    match native {
        "PROVISIONING" => HostStatus::Building,
        "STAGING" => HostStatus::Starting,
        "RUNNING" => HostStatus::Running,
        "STOPPING" => HostStatus::Stopping,
        "STOPPED" | "SUSPENDED" => HostStatus::Stopped,
        "TERMINATED" => HostStatus::Terminated,
        _ => HostStatus::Unknown,
    }
}

/// Zone and machine type come back as URLs; only the tail is meaningful
fn last_url_component(url: &str) -> Option<String> {
    let tail = url.rsplit('/').next().unwrap_or(url);
    (!tail.is_empty()).then(|| tail.to_string())
}

/// Normalize a raw instance document into a snapshot
pub fn snapshot_from(instance: &GceInstance) -> InstanceSnapshot {
    let public_address = instance
        .network_interfaces
        .iter()
        .flat_map(|nic| nic.access_configs.iter())
        .map(|ac| ac.nat_ip.as_str())
        .find(|ip| !ip.is_empty())
        .map(|ip| ip.to_string());

    InstanceSnapshot {
        status: translate_status(&instance.status),
        zone: last_url_component(&instance.zone),
        machine_type: last_url_component(&instance.machine_type),
        public_address,
    }
}

/// Wire-level GCE operations
///
/// [`HttpGceClient`] talks to the real compute API; [`MockGceClient`]
/// answers deterministically for tests.
#[async_trait]
pub trait GceClient: Send + Sync {
    async fn init(&self, credentials: &ProviderCredentials) -> Result<()>;
    async fn create_instance(&self, host: &Host, settings: &ProviderSettings) -> Result<String>;
    async fn get_instance(&self, host: &Host) -> Result<GceInstance>;
    async fn start_instance(&self, host: &Host) -> Result<()>;
    async fn stop_instance(&self, host: &Host) -> Result<()>;
    async fn delete_instance(&self, host: &Host) -> Result<()>;
}

/// GCE client over the compute v1 REST API
pub struct HttpGceClient {
    http: reqwest::Client,
    project: String,
    zone: String,
    token: RwLock<Option<String>>,
}

impl HttpGceClient {
    /// Create a client for a project and default zone
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            project: project.into(),
            zone: zone.into(),
            token: RwLock::new(None),
        }
    }

    fn bearer(&self) -> Result<String> {
        self.token
            .read()
            .expect("token lock poisoned")
            .clone()
            .ok_or_else(|| Error::ProviderAuth("GCE client is not initialized".to_string()))
    }

    fn instance_url(&self, name: &str) -> String {
        format!(
            "{COMPUTE_BASE_URL}/projects/{}/zones/{}/instances/{name}",
            self.project, self.zone
        )
    }

    fn check(op: &str, status: reqwest::StatusCode) -> Result<()> {
        match status.as_u16() {
            200..=299 => Ok(()),
            401 | 403 => Err(Error::ProviderAuth(format!("GCE rejected {op}: {status}"))),
            404 => Err(Error::ProviderLookup(format!("GCE instance not found during {op}"))),
            _ => Err(Error::ProviderProvision(format!("GCE {op} failed: {status}"))),
        }
    }

    async fn post(&self, op: &str, url: String, body: Option<serde_json::Value>) -> Result<()> {
        let mut request = self.http.post(url).bearer_auth(self.bearer()?);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::ProviderProvision(format!("GCE transport error: {e}")))?;
        Self::check(op, response.status())
    }
}

#[async_trait]
impl GceClient for HttpGceClient {
    async fn init(&self, credentials: &ProviderCredentials) -> Result<()> {
        let token = credentials
            .get("access_token")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::ProviderAuth("GCE credentials missing access_token".to_string()))?;
        *self.token.write().expect("token lock poisoned") = Some(token.clone());
        Ok(())
    }

    async fn create_instance(&self, host: &Host, settings: &ProviderSettings) -> Result<String> {
        let zone = settings.zone.as_deref().unwrap_or(&self.zone);
        let body = json!({
            "name": host.id,
            "machineType": format!("zones/{zone}/machineTypes/{}", settings.machine_type),
            "disks": [{
                "boot": true,
                "autoDelete": true,
                "initializeParams": {
                    "sourceImage": settings.image,
                    "diskSizeGb": settings.disk_size_gb.unwrap_or(20),
                },
            }],
            "networkInterfaces": [{
                "network": "global/networks/default",
                "accessConfigs": [{"type": "ONE_TO_ONE_NAT", "name": "External NAT"}],
            }],
            "labels": settings.tags,
        });

        let url = format!(
            "{COMPUTE_BASE_URL}/projects/{}/zones/{zone}/instances",
            self.project
        );
        self.post("create", url, Some(body)).await?;
        info!(host = %host.id, zone, "requested GCE instance");

        // GCE instances are addressed by name; the host id is the name.
        Ok(host.id.clone())
    }

    async fn get_instance(&self, host: &Host) -> Result<GceInstance> {
        let response = self
            .http
            .get(self.instance_url(&host.id))
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(|e| Error::ProviderProvision(format!("GCE transport error: {e}")))?;
        Self::check("get", response.status())?;

        response
            .json::<GceInstance>()
            .await
            .map_err(|e| Error::ProviderLookup(format!("malformed GCE instance document: {e}")))
    }

    async fn start_instance(&self, host: &Host) -> Result<()> {
        self.post("start", format!("{}/start", self.instance_url(&host.id)), None)
            .await
    }

    async fn stop_instance(&self, host: &Host) -> Result<()> {
        self.post("stop", format!("{}/stop", self.instance_url(&host.id)), None)
            .await
    }

    async fn delete_instance(&self, host: &Host) -> Result<()> {
        let response = self
            .http
            .delete(self.instance_url(&host.id))
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(|e| Error::ProviderProvision(format!("GCE transport error: {e}")))?;
        Self::check("delete", response.status())
    }
}

/// Deterministic GCE client used to exercise the adapter without a backend
#[derive(Debug, Clone, Default)]
pub struct MockGceClient {
    pub fail_init: bool,
    pub fail_create: bool,
    pub fail_get: bool,
    pub fail_delete: bool,

    /// When false, the reported native status is "STOPPING"
    pub is_active: bool,

    /// When true, one access config with address "0.0.0.0" is attached
    pub has_access_config: bool,
}

#[async_trait]
impl GceClient for MockGceClient {
    async fn init(&self, _credentials: &ProviderCredentials) -> Result<()> {
        if self.fail_init {
            return Err(Error::ProviderAuth("failed to initialize client".to_string()));
        }
        Ok(())
    }

    async fn create_instance(&self, host: &Host, _settings: &ProviderSettings) -> Result<String> {
        if self.fail_create {
            return Err(Error::ProviderProvision("failed to create instance".to_string()));
        }
        Ok(host.id.clone())
    }

    async fn get_instance(&self, _host: &Host) -> Result<GceInstance> {
        if self.fail_get {
            return Err(Error::ProviderLookup("failed to get instance".to_string()));
        }

        let mut instance = GceInstance {
            status: "RUNNING".to_string(),
            zone: "us-east1-c".to_string(),
            machine_type: "zones/us-east1-c/machineTypes/n1-standard-8".to_string(),
            network_interfaces: vec![],
        };
        if !self.is_active {
            instance.status = "STOPPING".to_string();
        }
        if self.has_access_config {
            instance.network_interfaces = vec![GceNetworkInterface {
                access_configs: vec![GceAccessConfig {
                    nat_ip: "0.0.0.0".to_string(),
                }],
            }];
        }
        Ok(instance)
    }

    async fn start_instance(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    async fn stop_instance(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    async fn delete_instance(&self, _host: &Host) -> Result<()> {
        if self.fail_delete {
            return Err(Error::ProviderProvision("failed to delete instance".to_string()));
        }
        Ok(())
    }
}

/// GCE provider adapter
pub struct GceProvider {
    client: Box<dyn GceClient>,
}

impl GceProvider {
    /// Adapter over an arbitrary client (real or mock)
    pub fn new(client: Box<dyn GceClient>) -> Self {
        Self { client }
    }

    /// Adapter over the real compute API
    pub fn http(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self::new(Box::new(HttpGceClient::new(project, zone)))
    }
}

#[async_trait]
impl CloudProvider for GceProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME_GCE
    }

    async fn initialize(&self, credentials: &ProviderCredentials) -> Result<()> {
        if !credentials.is_valid() {
            return Err(Error::ProviderAuth("no credential material".to_string()));
        }
        self.client.init(credentials).await
    }

    async fn create_instance(&self, host: &Host, settings: &ProviderSettings) -> Result<String> {
        let external_id = self.client.create_instance(host, settings).await?;
        info!(host = %host.id, %external_id, "GCE instance requested");
        Ok(external_id)
    }

    async fn get_instance(&self, host: &Host) -> Result<InstanceSnapshot> {
        let instance = self.client.get_instance(host).await?;
        let snapshot = snapshot_from(&instance);
        debug!(host = %host.id, status = %snapshot.status, "fetched GCE snapshot");
        Ok(snapshot)
    }

    async fn start_instance(&self, host: &Host) -> Result<()> {
        self.client.start_instance(host).await
    }

    async fn stop_instance(&self, host: &Host) -> Result<()> {
        self.client.stop_instance(host).await
    }

    async fn delete_instance(&self, host: &Host) -> Result<()> {
        self.client.delete_instance(host).await
    }
}
