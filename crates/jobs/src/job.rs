//! Job framework contract
//!
//! A job performs one host lifecycle transition with
//! exactly-once-in-effect semantics under at-least-once dispatch. The
//! dispatching queue owns the job for its execution lifetime; the job owns
//! neither the host record nor the ledger it writes to.

use async_trait::async_trait;
use drydock_cloud::ProviderRegistry;
use drydock_core::{Error, Host, HostStatus, Result};
use drydock_db::event::{EventPayload, HostStatusPayload};
use drydock_db::{EventLogEntry, EventLogger, HostRepository};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Format for the caller-supplied timestamp token in job identities
pub const TS_FORMAT: &str = "%Y-%m-%d.%H-%M-%S";

/// Default provider-call attempt budget
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runtime state of one job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    NotStarted,
    Running,
    Completed,
    Errored,
}

impl JobStatus {
    /// Whether the job ran to successful completion
    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// Everything a job needs to execute, threaded through `run`
#[derive(Clone)]
pub struct JobContext {
    pub providers: ProviderRegistry,
    pub hosts: HostRepository,
    pub events: EventLogger,

    /// Provider-call attempt budget; backoff between dispatches is the
    /// queue's concern, not ours
    pub max_attempts: u32,

    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Context with the default attempt budget and a fresh token
    pub fn new(providers: ProviderRegistry, hosts: HostRepository, events: EventLogger) -> Self {
        Self {
            providers,
            hosts,
            events,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cancellation: CancellationToken::new(),
        }
    }

    /// Override the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Fail fast if the job has been cancelled
    ///
    /// Checked before side effects only: once a provider call has
    /// succeeded, the local update must still complete so provider and
    /// record never diverge.
    pub fn ensure_active(&self, op: &str) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled(format!("{op} aborted before any side effect")));
        }
        Ok(())
    }
}

/// One retryable unit of lifecycle work
///
/// `run` executes to completion or failure and is safe to call exactly
/// once per instance; `status` and `error` are readable repeatedly after.
#[async_trait]
pub trait Job: Send {
    /// Queue-facing identity, including the caller's dedup token
    fn id(&self) -> &str;

    async fn run(&mut self, ctx: &JobContext);

    fn status(&self) -> JobStatus;

    fn error(&self) -> Option<&Error>;
}

/// Retryable vs fatal, judged here and never by the adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

impl ErrorClass {
    /// Classify an error for the retry loop
    ///
    /// Auth, provisioning, and storage failures can clear up on retry; a
    /// lookup failure means the instance is gone, and local contract
    /// violations never improve by retrying.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::ProviderAuth(_)
            | Error::ProviderProvision(_)
            | Error::Database(_)
            | Error::Io(_) => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }
}

pub(crate) type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Drive one provider call through the attempt budget
pub(crate) async fn with_retry<'a, T, F>(ctx: &JobContext, op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> OpFuture<'a, T>,
{
    let budget = ctx.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if ErrorClass::classify(&err) == ErrorClass::Fatal || attempt >= budget {
                    return Err(err);
                }
                warn!(op, attempt, error = %err, "provider call failed, retrying");
            }
        }
    }
}

/// Load the job's target host or fail
pub(crate) async fn load_host(ctx: &JobContext, host_id: &str) -> Result<Host> {
    ctx.hosts
        .find_by_id(host_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("host '{host_id}' does not exist")))
}

/// Append the single ledger entry describing a transition outcome
pub(crate) async fn log_host_transition(
    ctx: &JobContext,
    host: &Host,
    event_type: &str,
    user: &str,
    new_status: HostStatus,
    successful: bool,
) -> Result<()> {
    let mut entry = EventLogEntry::new(
        &host.id,
        event_type,
        EventPayload::HostStatus(HostStatusPayload {
            user: user.to_string(),
            old_status: host.status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
            successful,
        }),
    );
    ctx.events.log_event(&mut entry).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ErrorClass::classify(&Error::ProviderAuth("expired".into())),
            ErrorClass::Retryable
        );
        assert_eq!(
            ErrorClass::classify(&Error::ProviderProvision("quota".into())),
            ErrorClass::Retryable
        );
        assert_eq!(
            ErrorClass::classify(&Error::Database("locked".into())),
            ErrorClass::Retryable
        );
        assert_eq!(
            ErrorClass::classify(&Error::ProviderLookup("gone".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            ErrorClass::classify(&Error::PreconditionViolation("terminated".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            ErrorClass::classify(&Error::Cancelled("aborted".into())),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_job_status() {
        assert!(JobStatus::Completed.is_completed());
        assert!(!JobStatus::Errored.is_completed());
        assert!(!JobStatus::NotStarted.is_completed());
    }
}
