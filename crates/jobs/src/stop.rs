//! Stop a running host

use crate::job::{load_host, log_host_transition, with_retry, Job, JobContext, JobStatus};
use async_trait::async_trait;
use drydock_core::{Error, Host, HostStatus, Result};
use drydock_db::event::EVENT_HOST_STOPPED;
use tracing::{error, info};

/// Job moving one host Running → Stopped
pub struct StopHostJob {
    id: String,
    host_id: String,
    user: String,
    status: JobStatus,
    error: Option<Error>,
}

impl StopHostJob {
    /// Build a stop job for a host
    pub fn new(host: &Host, user: impl Into<String>, ts: &str) -> Self {
        Self {
            id: format!("host-stop-{}-{ts}", host.id),
            host_id: host.id.clone(),
            user: user.into(),
            status: JobStatus::NotStarted,
            error: None,
        }
    }

    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        let host = load_host(ctx, &self.host_id).await?;

        match host.status {
            HostStatus::Stopped => {
                info!(host = %host.id, "host is already stopped, nothing to stop");
                return Ok(());
            }
            HostStatus::Running => {}
            other => {
                log_host_transition(ctx, &host, EVENT_HOST_STOPPED, &self.user, HostStatus::Stopped, false)
                    .await?;
                return Err(Error::PreconditionViolation(format!(
                    "cannot stop host '{}' in status '{other}'",
                    host.id
                )));
            }
        }

        ctx.ensure_active("stop host")?;
        let provider = ctx.providers.get(&host.provider)?;

        // a backend that is already stopping (or stopped) the instance is
        // not an error; skip the redundant stop call
        let snapshot = with_retry(ctx, "inspect instance", || provider.get_instance(&host)).await?;
        if !matches!(snapshot.status, HostStatus::Stopping | HostStatus::Stopped) {
            with_retry(ctx, "stop instance", || provider.stop_instance(&host)).await?;
        }

        ctx.hosts
            .transition(&host.id, HostStatus::Running, HostStatus::Stopped, None)
            .await?;
        log_host_transition(ctx, &host, EVENT_HOST_STOPPED, &self.user, HostStatus::Stopped, true)
            .await?;

        info!(host = %host.id, user = %self.user, "host stopped");
        Ok(())
    }
}

#[async_trait]
impl Job for StopHostJob {
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
                error!(job = %self.id, error = %err, "stop job failed");
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
