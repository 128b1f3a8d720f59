//! # Drydock Jobs
//!
//! Retryable lifecycle jobs for Drydock hosts. Each job performs one
//! transition with at-least-once, idempotent semantics: a pre-condition
//! check at the top of every job makes redelivery a safe no-op, provider
//! failures are classified retryable or fatal here (never by the
//! adapters), and every terminal outcome leaves at most one host record
//! mutation and at most one ledger entry behind.

pub mod job;
pub mod provision;
pub mod start;
pub mod stop;
pub mod terminate;

pub use job::{ErrorClass, Job, JobContext, JobStatus, DEFAULT_MAX_ATTEMPTS, TS_FORMAT};
pub use provision::ProvisionHostJob;
pub use start::StartHostJob;
pub use stop::StopHostJob;
pub use terminate::TerminateHostJob;

/// Jobs module version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
