//! Host record model
//!
//! A [`Host`] is the canonical, provider-agnostic record of one compute
//! resource in the fleet. It is created when a provisioning request is
//! accepted and mutated exclusively by lifecycle jobs; termination is
//! logical (status [`HostStatus::Terminated`]), never physical deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical host lifecycle status
///
/// Every provider adapter translates its native status vocabulary into this
/// set. Native statuses with no mapping become [`HostStatus::Unknown`] so
/// jobs can detect the ambiguity instead of acting on a guess; `Unknown` is
/// never a valid status for a stored host record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    /// Record exists but nothing has been provisioned yet
    Uninitialized,
    /// Backend is creating the instance
    Building,
    /// Instance is booting
    Starting,
    /// Instance is up
    Running,
    /// Instance is shutting down
    Stopping,
    /// Instance is stopped but still allocated
    Stopped,
    /// Host has been taken out of rotation
    Decommissioned,
    /// Instance has been deallocated; terminal
    Terminated,
    /// Native status had no canonical mapping (snapshots only)
    Unknown,
}

impl HostStatus {
    /// Status name as stored in the database and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Uninitialized => "uninitialized",
            HostStatus::Building => "building",
            HostStatus::Starting => "starting",
            HostStatus::Running => "running",
            HostStatus::Stopping => "stopping",
            HostStatus::Stopped => "stopped",
            HostStatus::Decommissioned => "decommissioned",
            HostStatus::Terminated => "terminated",
            HostStatus::Unknown => "unknown",
        }
    }

    /// Parse a stored status name; unmapped names become `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "uninitialized" => HostStatus::Uninitialized,
            "building" => HostStatus::Building,
            "starting" => HostStatus::Starting,
            "running" => HostStatus::Running,
            "stopping" => HostStatus::Stopping,
            "stopped" => HostStatus::Stopped,
            "decommissioned" => HostStatus::Decommissioned,
            "terminated" => HostStatus::Terminated,
            _ => HostStatus::Unknown,
        }
    }

    /// Whether no further lifecycle transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostStatus::Terminated)
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    /// Unique host identifier
    pub id: String,

    /// Owning provider adapter name
    pub provider: String,

    /// Distro/template identifier the host was built from
    pub distro: String,

    /// Canonical lifecycle status
    pub status: HostStatus,

    /// Zone/region the instance lives in
    pub zone: Option<String>,

    /// Backend machine type (e.g. "n1-standard-8")
    pub machine_type: Option<String>,

    /// Externally routable address; absent until the backend attaches an
    /// access configuration, never an empty string
    pub public_address: Option<String>,

    /// Backend-native instance identifier returned at provision time
    pub external_id: Option<String>,

    /// User who requested the host
    pub started_by: String,

    /// Record creation time
    pub created_at: DateTime<Utc>,

    /// Time of the last status transition
    pub status_changed_at: DateTime<Utc>,
}

impl Host {
    /// Create a new, unprovisioned host record
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        distro: impl Into<String>,
        started_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            provider: provider.into(),
            distro: distro.into(),
            status: HostStatus::Uninitialized,
            zone: None,
            machine_type: None,
            public_address: None,
            external_id: None,
            started_by: started_by.into(),
            created_at: now,
            status_changed_at: now,
        }
    }

    /// Check if the host is up
    pub fn is_running(&self) -> bool {
        self.status == HostStatus::Running
    }

    /// Check if the host has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
