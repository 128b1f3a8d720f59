//! Terminate a host
//!
//! Termination is logical: the instance is deallocated at the backend and
//! the record moves to `Terminated`, but the record itself is never
//! deleted.

use crate::job::{load_host, log_host_transition, with_retry, Job, JobContext, JobStatus};
use async_trait::async_trait;
use drydock_core::{Error, Host, HostStatus, Result};
use drydock_db::event::EVENT_HOST_TERMINATED;
use tracing::{error, info};

/// Job moving one host to its terminal status
pub struct TerminateHostJob {
    id: String,
    host_id: String,
    user: String,
    status: JobStatus,
    error: Option<Error>,
}

impl TerminateHostJob {
    /// Build a terminate job for a host
    pub fn new(host: &Host, user: impl Into<String>, ts: &str) -> Self {
        Self {
            id: format!("host-terminate-{}-{ts}", host.id),
            host_id: host.id.clone(),
            user: user.into(),
            status: JobStatus::NotStarted,
            error: None,
        }
    }

    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        let host = load_host(ctx, &self.host_id).await?;

        if host.status == HostStatus::Terminated {
            info!(host = %host.id, "host is already terminated");
            return Ok(());
        }

        ctx.ensure_active("terminate host")?;
        let provider = ctx.providers.get(&host.provider)?;

        // any non-terminal state can be torn down; the CAS below is on the
        // status observed here, so a concurrent transition loses cleanly
        with_retry(ctx, "delete instance", || provider.delete_instance(&host)).await?;

        ctx.hosts
            .transition(&host.id, host.status, HostStatus::Terminated, None)
            .await?;
        log_host_transition(ctx, &host, EVENT_HOST_TERMINATED, &self.user, HostStatus::Terminated, true)
            .await?;

        info!(host = %host.id, user = %self.user, "host terminated");
        Ok(())
    }
}

#[async_trait]
impl Job for TerminateHostJob {
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
                error!(job = %self.id, error = %err, "terminate job failed");
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
