//! Host lifecycle jobs, end to end against the mock provider

use drydock_cloud::{MockFlags, MockInstance, MockProvider, ProviderRegistry, ProviderSettings};
use drydock_core::{Error, Host, HostStatus};
use drydock_db::event::{EventPayload, EVENT_HOST_STARTED, EVENT_HOST_STOPPED, EVENT_HOST_TERMINATED};
use drydock_db::{EventLogger, HostRepository};
use drydock_jobs::{
    Job, JobContext, ProvisionHostJob, StartHostJob, StopHostJob, TerminateHostJob,
};
use std::sync::Arc;

struct Fixture {
    ctx: JobContext,
    mock: Arc<MockProvider>,
    hosts: HostRepository,
    events: EventLogger,
}

async fn fixture() -> Fixture {
    let pool = drydock_db::connect_memory().await.unwrap();
    let hosts = HostRepository::new(pool.clone());
    hosts.init_schema().await.unwrap();
    let events = EventLogger::new(pool);
    events.init_schema().await.unwrap();

    let mock = Arc::new(MockProvider::new());
    let mut providers = ProviderRegistry::new();
    providers.register(mock.clone());

    let ctx = JobContext::new(providers, hosts.clone(), events.clone());
    Fixture { ctx, mock, hosts, events }
}

async fn insert_host(fx: &Fixture, id: &str, status: HostStatus) -> Host {
    let mut host = Host::new(id, "mock", "ubuntu-2204", "user");
    host.status = status;
    fx.hosts.insert(&host).await.unwrap();
    host
}

/// Assert how many transition events one host has, and the outcome of the
/// most recent one.
async fn check_host_event(fx: &Fixture, host_id: &str, event_type: &str, count: usize, successful: bool) {
    let entries = fx.events.find_by_resource(host_id).await.unwrap();
    assert_eq!(entries.len(), count, "unexpected event count for {host_id}");
    let last = entries.last().expect("expected at least one event");
    assert_eq!(last.event_type, event_type);
    match last.data.as_ref().unwrap() {
        EventPayload::HostStatus(payload) => assert_eq!(payload.successful, successful),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn start_job_moves_stopped_host_to_running() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-stopped", HostStatus::Stopped).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Stopped));
    fx.mock.set_flags(MockFlags {
        has_access_config: true,
        ..MockFlags::default()
    });

    let mut job = StartHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.error().is_none(), "unexpected error: {:?}", job.error());
    assert!(job.status().is_completed());

    let started = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(started.status, HostStatus::Running);
    assert_eq!(started.public_address.as_deref(), Some("0.0.0.0"));

    check_host_event(&fx, &host.id, EVENT_HOST_STARTED, 1, true).await;
}

#[tokio::test]
async fn start_job_on_running_host_is_a_noop() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-running", HostStatus::Running).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Running));

    let mut job = StartHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.error().is_none());
    assert!(job.status().is_completed());

    // no provider call, no duplicate ledger entry
    assert_eq!(fx.mock.calls("start_instance"), 0);
    assert!(fx.events.find_by_resource(&host.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn start_job_fails_fatally_from_unreachable_status() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-building", HostStatus::Building).await;

    let mut job = StartHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(matches!(job.error(), Some(Error::PreconditionViolation(_))));

    // no provider call was made, and the failure was recorded exactly once
    assert_eq!(fx.mock.calls("start_instance"), 0);
    check_host_event(&fx, &host.id, EVENT_HOST_STARTED, 1, false).await;

    let unchanged = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, HostStatus::Building);
}

#[tokio::test]
async fn start_job_provider_failure_leaves_no_trace() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-stopped", HostStatus::Stopped).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Stopped));
    fx.mock.set_flags(MockFlags {
        fail_start: true,
        ..MockFlags::default()
    });

    let mut job = StartHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(matches!(job.error(), Some(Error::ProviderProvision(_))));
    assert!(!job.status().is_completed());

    // the retryable failure burned the whole attempt budget
    assert_eq!(fx.mock.calls("start_instance"), fx.ctx.max_attempts as usize);

    let unchanged = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, HostStatus::Stopped);
    assert!(fx.events.find_by_resource(&host.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn stop_job_moves_running_host_to_stopped() {
    let fx = fixture().await;
    let mut host = insert_host(&fx, "host-running", HostStatus::Running).await;
    host.public_address = Some("0.0.0.0".to_string());
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Running));

    let mut job = StopHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.error().is_none(), "unexpected error: {:?}", job.error());

    let stopped = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(stopped.status, HostStatus::Stopped);
    assert_eq!(stopped.public_address, None);

    assert_eq!(fx.mock.calls("stop_instance"), 1);
    check_host_event(&fx, &host.id, EVENT_HOST_STOPPED, 1, true).await;
}

#[tokio::test]
async fn stop_job_tolerates_backend_already_stopping() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-running", HostStatus::Running).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Running));
    // snapshots will report Stopping regardless of the stored status
    fx.mock.set_flags(MockFlags {
        is_active: false,
        ..MockFlags::default()
    });

    let mut job = StopHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.error().is_none(), "unexpected error: {:?}", job.error());

    // the redundant stop call was skipped, but the record still converged
    assert_eq!(fx.mock.calls("stop_instance"), 0);
    let stopped = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(stopped.status, HostStatus::Stopped);
    check_host_event(&fx, &host.id, EVENT_HOST_STOPPED, 1, true).await;
}

#[tokio::test]
async fn stop_job_on_stopped_host_is_a_noop() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-stopped", HostStatus::Stopped).await;

    let mut job = StopHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.error().is_none());
    assert!(job.status().is_completed());
    assert!(fx.events.find_by_resource(&host.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn terminate_job_is_idempotent() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-running", HostStatus::Running).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Running));

    let mut job = TerminateHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.error().is_none(), "unexpected error: {:?}", job.error());

    let terminated = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(terminated.status, HostStatus::Terminated);
    check_host_event(&fx, &host.id, EVENT_HOST_TERMINATED, 1, true).await;

    // redelivery short-circuits without a second delete or entry
    let mut again = TerminateHostJob::new(&host, "user", "2026-08-29.12-01-00");
    again.run(&fx.ctx).await;
    assert!(again.error().is_none());
    assert_eq!(fx.mock.calls("delete_instance"), 1);
    check_host_event(&fx, &host.id, EVENT_HOST_TERMINATED, 1, true).await;
}

#[tokio::test]
async fn provision_job_records_backend_identity() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-new", HostStatus::Uninitialized).await;
    let settings = ProviderSettings::new("n1-standard-8", "ubuntu-2204");

    let mut job = ProvisionHostJob::new(&host, "user", "2026-08-29.12-00-00", settings);
    job.run(&fx.ctx).await;
    assert!(job.error().is_none(), "unexpected error: {:?}", job.error());

    let provisioned = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(provisioned.status, HostStatus::Building);
    assert_eq!(provisioned.external_id.as_deref(), Some("host-new"));
    assert_eq!(provisioned.zone.as_deref(), Some("us-east1-c"));

    let entries = fx.events.find_by_resource(&host.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    match entries[0].data.as_ref().unwrap() {
        EventPayload::HostProvisioned(payload) => {
            assert!(payload.successful);
            assert_eq!(payload.external_id, "host-new");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_job_aborts_before_side_effects() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-stopped", HostStatus::Stopped).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Stopped));
    fx.ctx.cancellation.cancel();

    let mut job = StartHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(matches!(job.error(), Some(Error::Cancelled(_))));

    assert_eq!(fx.mock.calls("start_instance"), 0);
    assert!(fx.events.find_by_resource(&host.id).await.unwrap().is_empty());
    let unchanged = fx.hosts.find_by_id(&host.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, HostStatus::Stopped);
}

#[tokio::test]
async fn job_instances_are_single_use() {
    let fx = fixture().await;
    let host = insert_host(&fx, "host-stopped", HostStatus::Stopped).await;
    fx.mock.set(&host.id, MockInstance::with_status(HostStatus::Stopped));

    let mut job = StartHostJob::new(&host, "user", "2026-08-29.12-00-00");
    job.run(&fx.ctx).await;
    assert!(job.status().is_completed());

    // the second run is ignored; state and side effects stay put
    job.run(&fx.ctx).await;
    assert!(job.status().is_completed());
    assert!(job.error().is_none());
    assert_eq!(fx.mock.calls("start_instance"), 1);
    check_host_event(&fx, &host.id, EVENT_HOST_STARTED, 1, true).await;
}
