//! Event ledger entry model
//!
//! Every state change in the fleet is recorded as an [`EventLogEntry`]
//! whose payload shape is selected by (resource type, event type). Two
//! grandfathered task event kinds may still carry their resource type
//! nested inside the payload document; see [`resolve_resource_type`].

use chrono::{DateTime, Utc};
use drydock_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_HOST_PROVISIONED: &str = "HOST_PROVISIONED";
pub const EVENT_HOST_STARTED: &str = "HOST_STARTED";
pub const EVENT_HOST_STOPPED: &str = "HOST_STOPPED";
pub const EVENT_HOST_TERMINATED: &str = "HOST_TERMINATED";
pub const EVENT_HOST_TASK_FINISHED: &str = "HOST_TASK_FINISHED";
pub const EVENT_TASK_SYSTEM_INFO: &str = "TASK_SYSTEM_INFO";
pub const EVENT_TASK_PROCESS_INFO: &str = "TASK_PROCESS_INFO";

/// Payload key under which legacy entries nested their resource type
pub const NESTED_RESOURCE_TYPE_KEY: &str = "r_type";

/// Kind of resource an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    Host,
    Task,
}

impl ResourceType {
    /// Tag as stored in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Host => "HOST",
            ResourceType::Task => "TASK",
        }
    }

    /// Parse a stored tag
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOST" => Some(ResourceType::Host),
            "TASK" => Some(ResourceType::Task),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload for host lifecycle transitions (started/stopped/terminated)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HostStatusPayload {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub old_status: String,
    #[serde(default)]
    pub new_status: String,
    #[serde(default)]
    pub successful: bool,
}

/// Payload for provisioning outcomes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HostProvisionedPayload {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub distro: String,
    /// Backend-native identifier; empty when provisioning failed
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub successful: bool,
}

/// Payload recorded when a host finishes running a CI task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HostTaskFinishedPayload {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub task_status: String,
}

/// Legacy task system metrics payload
///
/// One of the two grandfathered kinds that historically nested the
/// resource type inside the payload. The field is kept so old documents
/// decode, but new entries leave it empty and it is never serialized then.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskSystemInfoPayload {
    #[serde(
        default,
        rename = "r_type",
        skip_serializing_if = "String::is_empty"
    )]
    pub resource_type: String,
    #[serde(default)]
    pub hostname: String,
}

/// Legacy task process metrics payload; same grandfathering as
/// [`TaskSystemInfoPayload`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskProcessInfoPayload {
    #[serde(
        default,
        rename = "r_type",
        skip_serializing_if = "String::is_empty"
    )]
    pub resource_type: String,
    #[serde(default)]
    pub pids: Vec<u32>,
}

/// Tagged union of all event payload shapes
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    HostStatus(HostStatusPayload),
    HostProvisioned(HostProvisionedPayload),
    HostTaskFinished(HostTaskFinishedPayload),
    TaskSystemInfo(TaskSystemInfoPayload),
    TaskProcessInfo(TaskProcessInfoPayload),
}

impl EventPayload {
    /// Resource kind this payload belongs to
    pub fn resource_type(&self) -> ResourceType {
        match self {
            EventPayload::HostStatus(_)
            | EventPayload::HostProvisioned(_)
            | EventPayload::HostTaskFinished(_) => ResourceType::Host,
            EventPayload::TaskSystemInfo(_) | EventPayload::TaskProcessInfo(_) => {
                ResourceType::Task
            }
        }
    }

    /// Serialize to the nested document form
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            EventPayload::HostStatus(p) => serde_json::to_value(p)?,
            EventPayload::HostProvisioned(p) => serde_json::to_value(p)?,
            EventPayload::HostTaskFinished(p) => serde_json::to_value(p)?,
            EventPayload::TaskSystemInfo(p) => serde_json::to_value(p)?,
            EventPayload::TaskProcessInfo(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Decode the document form; the concrete shape is selected by the
    /// entry's event type
    pub fn from_value(event_type: &str, value: Value) -> Result<Self> {
        let payload = match event_type {
            EVENT_HOST_STARTED | EVENT_HOST_STOPPED | EVENT_HOST_TERMINATED => {
                EventPayload::HostStatus(serde_json::from_value(value)?)
            }
            EVENT_HOST_PROVISIONED => EventPayload::HostProvisioned(serde_json::from_value(value)?),
            EVENT_HOST_TASK_FINISHED => {
                EventPayload::HostTaskFinished(serde_json::from_value(value)?)
            }
            EVENT_TASK_SYSTEM_INFO => EventPayload::TaskSystemInfo(serde_json::from_value(value)?),
            EVENT_TASK_PROCESS_INFO => {
                EventPayload::TaskProcessInfo(serde_json::from_value(value)?)
            }
            other => {
                return Err(Error::Validation(format!(
                    "no payload shape registered for event type '{other}'"
                )))
            }
        };
        Ok(payload)
    }
}

/// Whether an event kind is grandfathered to carry a nested resource type
pub fn is_legacy_event_type(event_type: &str) -> bool {
    event_type == EVENT_TASK_SYSTEM_INFO || event_type == EVENT_TASK_PROCESS_INFO
}

/// Reconcile the two historical resource-type locations
///
/// The top-level tag always wins. A nested `r_type` inside the payload is
/// honored only for the two grandfathered kinds; any other entry missing
/// the top-level tag fails validation.
pub fn resolve_resource_type(
    top_level: Option<&str>,
    event_type: &str,
    data: &Value,
) -> Result<ResourceType> {
    if let Some(tag) = top_level.filter(|t| !t.is_empty()) {
        return ResourceType::parse(tag)
            .ok_or_else(|| Error::Validation(format!("unknown resource type '{tag}'")));
    }

    if is_legacy_event_type(event_type) {
        if let Some(tag) = data.get(NESTED_RESOURCE_TYPE_KEY).and_then(Value::as_str) {
            return ResourceType::parse(tag)
                .ok_or_else(|| Error::Validation(format!("unknown resource type '{tag}'")));
        }
    }

    Err(Error::Validation(format!(
        "event of type '{event_type}' carries no resource type"
    )))
}

/// One ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    /// Monotonic identity, assigned by storage at insert
    pub id: Option<i64>,

    pub resource_type: ResourceType,
    pub resource_id: String,
    pub event_type: String,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// When a downstream consumer handled the entry; `None` = unprocessed
    pub processed_at: Option<DateTime<Utc>>,

    /// Nested payload document; never absent for a valid entry
    pub data: Option<EventPayload>,
}

impl EventLogEntry {
    /// New unprocessed entry timestamped now
    pub fn new(resource_id: impl Into<String>, event_type: impl Into<String>, data: EventPayload) -> Self {
        Self {
            id: None,
            resource_type: data.resource_type(),
            resource_id: resource_id.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            processed_at: None,
            data: Some(data),
        }
    }

    /// Derived processed state
    pub fn processed(&self) -> (bool, Option<DateTime<Utc>>) {
        (self.processed_at.is_some(), self.processed_at)
    }
}
