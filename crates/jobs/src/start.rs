//! Start a stopped host

use crate::job::{load_host, log_host_transition, with_retry, Job, JobContext, JobStatus};
use async_trait::async_trait;
use drydock_core::{Error, Host, HostStatus, Result};
use drydock_db::event::EVENT_HOST_STARTED;
use tracing::{error, info};

/// Job moving one host Stopped → Running
pub struct StartHostJob {
    id: String,
    host_id: String,
    user: String,
    status: JobStatus,
    error: Option<Error>,
}

impl StartHostJob {
    /// Build a start job for a host
    ///
    /// `ts` is the caller-generated timestamp token ([`crate::TS_FORMAT`])
    /// folded into the job identity so the queue can deduplicate
    /// redeliveries; the pre-condition check below is what actually makes
    /// redelivery safe.
    pub fn new(host: &Host, user: impl Into<String>, ts: &str) -> Self {
        Self {
            id: format!("host-start-{}-{ts}", host.id),
            host_id: host.id.clone(),
            user: user.into(),
            status: JobStatus::NotStarted,
            error: None,
        }
    }

    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        let host = load_host(ctx, &self.host_id).await?;

        match host.status {
            // post-condition already holds; redelivery is a safe no-op
            HostStatus::Running => {
                info!(host = %host.id, "host is already running, nothing to start");
                return Ok(());
            }
            HostStatus::Stopped => {}
            other => {
                log_host_transition(ctx, &host, EVENT_HOST_STARTED, &self.user, HostStatus::Running, false)
                    .await?;
                return Err(Error::PreconditionViolation(format!(
                    "cannot start host '{}' in status '{other}'",
                    host.id
                )));
            }
        }

        ctx.ensure_active("start host")?;
        let provider = ctx.providers.get(&host.provider)?;
        with_retry(ctx, "start instance", || provider.start_instance(&host)).await?;

        // the backend has started the instance; from here the local record
        // must catch up even if a cancellation arrives
        let snapshot = with_retry(ctx, "confirm instance", || provider.get_instance(&host)).await?;
        ctx.hosts
            .transition(
                &host.id,
                HostStatus::Stopped,
                HostStatus::Running,
                snapshot.public_address.as_deref(),
            )
            .await?;
        log_host_transition(ctx, &host, EVENT_HOST_STARTED, &self.user, HostStatus::Running, true)
            .await?;

        info!(host = %host.id, user = %self.user, "host started");
        Ok(())
    }
}

#[async_trait]
impl Job for StartHostJob {
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
                error!(job = %self.id, error = %err, "start job failed");
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
