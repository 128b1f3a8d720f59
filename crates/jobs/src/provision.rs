//! Provision a concrete instance for a new host record

use crate::job::{load_host, with_retry, Job, JobContext, JobStatus};
use async_trait::async_trait;
use drydock_cloud::ProviderSettings;
use drydock_core::{Error, Host, HostStatus, Result};
use drydock_db::event::{EventPayload, HostProvisionedPayload, EVENT_HOST_PROVISIONED};
use drydock_db::EventLogEntry;
use tracing::{error, info};

/// Job moving one host Uninitialized → Building
pub struct ProvisionHostJob {
    id: String,
    host_id: String,
    user: String,
    settings: ProviderSettings,
    status: JobStatus,
    error: Option<Error>,
}

impl ProvisionHostJob {
    /// Build a provision job for a host
    pub fn new(host: &Host, user: impl Into<String>, ts: &str, settings: ProviderSettings) -> Self {
        Self {
            id: format!("host-provision-{}-{ts}", host.id),
            host_id: host.id.clone(),
            user: user.into(),
            settings,
            status: JobStatus::NotStarted,
            error: None,
        }
    }

    async fn log_outcome(&self, ctx: &JobContext, host: &Host, external_id: &str, successful: bool) -> Result<()> {
        let mut entry = EventLogEntry::new(
            &host.id,
            EVENT_HOST_PROVISIONED,
            EventPayload::HostProvisioned(HostProvisionedPayload {
                provider: host.provider.clone(),
                distro: host.distro.clone(),
                external_id: external_id.to_string(),
                successful,
            }),
        );
        ctx.events.log_event(&mut entry).await
    }

    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        let host = load_host(ctx, &self.host_id).await?;

        match host.status {
            // a redelivered request after the instance was already created
            HostStatus::Building if host.external_id.is_some() => {
                info!(host = %host.id, "host is already provisioned");
                return Ok(());
            }
            HostStatus::Uninitialized => {}
            other => {
                self.log_outcome(ctx, &host, "", false).await?;
                return Err(Error::PreconditionViolation(format!(
                    "cannot provision host '{}' in status '{other}'",
                    host.id
                )));
            }
        }

        ctx.ensure_active("provision host")?;
        let provider = ctx.providers.get(&host.provider)?;
        let external_id =
            with_retry(ctx, "create instance", || provider.create_instance(&host, &self.settings))
                .await?;

        // the instance exists now; record placement even under cancellation
        let snapshot = with_retry(ctx, "confirm instance", || provider.get_instance(&host)).await?;
        ctx.hosts
            .record_provisioned(
                &host.id,
                &external_id,
                snapshot.zone.as_deref(),
                snapshot.machine_type.as_deref(),
            )
            .await?;
        self.log_outcome(ctx, &host, &external_id, true).await?;

        info!(host = %host.id, %external_id, "host provisioned");
        Ok(())
    }
}

#[async_trait]
impl Job for ProvisionHostJob {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&mut self, ctx: &JobContext) {
        if self.status != JobStatus::NotStarted {
            error!(job = %self.id, "job instances are single-use; ignoring repeat run");
            return;
        }
        self.status = JobStatus::Running;
        match self.execute(ctx).await {
            Ok(()) => self.status = JobStatus::Completed,
            Err(err) => {
                error!(job = %self.id, error = %err, "provision job failed");
                self.error = Some(err);
                self.status = JobStatus::Errored;
            }
        }
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}
