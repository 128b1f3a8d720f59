//! Host record repository over SQLite
//!
//! Status transitions use a compare-and-swap on the observed pre-state, so
//! a losing concurrent job fails with `NotFound` instead of corrupting the
//! record.

use chrono::{DateTime, Utc};
use drydock_core::{Error, Host, HostStatus, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

fn db_err(context: &str, err: sqlx::Error) -> Error {
    Error::Database(format!("{context}: {err}"))
}

/// Host record repository
#[derive(Clone)]
pub struct HostRepository {
    pool: SqlitePool,
}

impl HostRepository {
    /// Create a repository over a pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the hosts table
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                distro TEXT NOT NULL,
                status TEXT NOT NULL,
                zone TEXT,
                machine_type TEXT,
                public_address TEXT,
                external_id TEXT,
                started_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status_changed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to create hosts table", e))?;
        Ok(())
    }

    /// Insert a new host record
    pub async fn insert(&self, host: &Host) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hosts (id, provider, distro, status, zone, machine_type,
                               public_address, external_id, started_by, created_at, status_changed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&host.id)
        .bind(&host.provider)
        .bind(&host.distro)
        .bind(host.status.as_str())
        .bind(&host.zone)
        .bind(&host.machine_type)
        .bind(&host.public_address)
        .bind(&host.external_id)
        .bind(&host.started_by)
        .bind(host.created_at)
        .bind(host.status_changed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to insert host", e))?;
        Ok(())
    }

    /// Fetch one host record
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Host>> {
        let row = sqlx::query("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("failed to fetch host", e))?;

        row.as_ref().map(row_to_host).transpose()
    }

    /// All host records
    pub async fn list(&self) -> Result<Vec<Host>> {
        let rows = sqlx::query("SELECT * FROM hosts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("failed to list hosts", e))?;

        rows.iter().map(row_to_host).collect()
    }

    /// Apply one status transition, conditional on the observed pre-state
    ///
    /// `public_address` replaces the stored address wholesale; passing
    /// `None` clears it. Zero affected rows means the pre-state no longer
    /// held and the caller lost the race.
    pub async fn transition(
        &self,
        id: &str,
        expected: HostStatus,
        new: HostStatus,
        public_address: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE hosts SET status = ?, status_changed_at = ?, public_address = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(new.as_str())
        .bind(Utc::now())
        .bind(public_address)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to update host status", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "host '{id}' was not in status '{expected}'"
            )));
        }
        debug!(host = id, from = %expected, to = %new, "host transitioned");
        Ok(())
    }

    /// Record the outcome of provisioning: backend identity plus placement,
    /// conditional on the record still being unprovisioned
    pub async fn record_provisioned(
        &self,
        id: &str,
        external_id: &str,
        zone: Option<&str>,
        machine_type: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE hosts SET status = ?, status_changed_at = ?, external_id = ?, zone = ?, machine_type = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(HostStatus::Building.as_str())
        .bind(Utc::now())
        .bind(external_id)
        .bind(zone)
        .bind(machine_type)
        .bind(id)
        .bind(HostStatus::Uninitialized.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to record provisioned host", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "host '{id}' was not awaiting provisioning"
            )));
        }
        Ok(())
    }
}

fn row_to_host(row: &SqliteRow) -> Result<Host> {
    let status_text: String = row.try_get("status").map_err(|e| db_err("bad host row", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| db_err("bad host row", e))?;
    let status_changed_at: DateTime<Utc> = row
        .try_get("status_changed_at")
        .map_err(|e| db_err("bad host row", e))?;

    Ok(Host {
        id: row.try_get("id").map_err(|e| db_err("bad host row", e))?,
        provider: row.try_get("provider").map_err(|e| db_err("bad host row", e))?,
        distro: row.try_get("distro").map_err(|e| db_err("bad host row", e))?,
        status: HostStatus::parse(&status_text),
        zone: row.try_get("zone").map_err(|e| db_err("bad host row", e))?,
        machine_type: row
            .try_get("machine_type")
            .map_err(|e| db_err("bad host row", e))?,
        public_address: row
            .try_get("public_address")
            .map_err(|e| db_err("bad host row", e))?,
        external_id: row
            .try_get("external_id")
            .map_err(|e| db_err("bad host row", e))?,
        started_by: row
            .try_get("started_by")
            .map_err(|e| db_err("bad host row", e))?,
        created_at,
        status_changed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> HostRepository {
        let pool = crate::connect_memory().await.unwrap();
        let repo = HostRepository::new(pool);
        repo.init_schema().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repo().await;
        let mut host = Host::new("h-1", "mock", "ubuntu-2204", "alice");
        host.status = HostStatus::Stopped;
        repo.insert(&host).await.unwrap();

        let fetched = repo.find_by_id("h-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "h-1");
        assert_eq!(fetched.status, HostStatus::Stopped);
        assert_eq!(fetched.public_address, None);

        assert!(repo.find_by_id("h-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_cas() {
        let repo = repo().await;
        let mut host = Host::new("h-1", "mock", "ubuntu-2204", "alice");
        host.status = HostStatus::Stopped;
        repo.insert(&host).await.unwrap();

        repo.transition("h-1", HostStatus::Stopped, HostStatus::Running, Some("203.0.113.7"))
            .await
            .unwrap();
        let fetched = repo.find_by_id("h-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, HostStatus::Running);
        assert_eq!(fetched.public_address.as_deref(), Some("203.0.113.7"));

        // a second job still expecting Stopped loses the race
        let err = repo
            .transition("h-1", HostStatus::Stopped, HostStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transition_clears_address() {
        let repo = repo().await;
        let mut host = Host::new("h-1", "mock", "ubuntu-2204", "alice");
        host.status = HostStatus::Running;
        host.public_address = Some("203.0.113.7".to_string());
        repo.insert(&host).await.unwrap();

        repo.transition("h-1", HostStatus::Running, HostStatus::Stopped, None)
            .await
            .unwrap();
        let fetched = repo.find_by_id("h-1").await.unwrap().unwrap();
        assert_eq!(fetched.public_address, None);
    }

    #[tokio::test]
    async fn test_record_provisioned() {
        let repo = repo().await;
        let host = Host::new("h-1", "gce", "ubuntu-2204", "alice");
        repo.insert(&host).await.unwrap();

        repo.record_provisioned("h-1", "h-1", Some("us-east1-c"), Some("n1-standard-8"))
            .await
            .unwrap();
        let fetched = repo.find_by_id("h-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, HostStatus::Building);
        assert_eq!(fetched.external_id.as_deref(), Some("h-1"));
        assert_eq!(fetched.zone.as_deref(), Some("us-east1-c"));

        // re-provisioning an already-built record is refused
        let err = repo
            .record_provisioned("h-1", "h-1", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
