//! `SQLite` implementation of [`Store`].

use alloc::sync::Arc;
use core::str::FromStr as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use secrecy::{ExposeSecret as _, SecretString};
use sqlx::{
    QueryBuilder, Row as _, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use tracing::info;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::model::{
    AuditEntry, AuditFilter, AuditPage, Host, ProbeReport, Workload, WorkloadStatus,
};

const HOST_COLUMNS: &str = "id, name, address, port, ssh_user, ssh_private_key, status, workload_count, last_checked";
const WORKLOAD_COLUMNS: &str = "id, name, host_id, compose_path, app_url, auto_stop_mins, status, started_at, timer_ends_at";
const AUDIT_COLUMNS: &str = "id, actor_id, actor_name, action, resource_type, resource_id, resource_name, detail, origin_address, origin_client, created_at";

/// Store backed by a `SQLite` database file (or `:memory:`).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let pool = if path.as_os_str() == ":memory:" {
            // Every connection to `:memory:` is a separate database, so keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().connect_with(options).await?
        };

        sqlx::migrate!().run(&pool).await?;
        info!("Database ready at {}", path.display());
        Ok(Self { pool })
    }

    /// In-memory database, mostly for tests and throwaway runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::open(Path::new(":memory:")).await
    }
}

fn corrupt(table: &'static str, id: &str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        table,
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn to_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(|t| t.timestamp_millis())
}

fn from_millis(table: &'static str, id: &str, raw: Option<i64>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.map(|ms| {
        DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt(table, id, "timestamp out of range"))
    })
    .transpose()
}

fn host_from_row(row: &SqliteRow) -> StoreResult<Host> {
    const T: &str = "hosts";
    let raw_id: String = row.try_get("id")?;
    let key: Option<String> = row.try_get("ssh_private_key")?;
    Ok(Host {
        id: Uuid::parse_str(&raw_id).map_err(|e| corrupt(T, &raw_id, e))?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        port: u16::try_from(row.try_get::<i64, _>("port")?).map_err(|e| corrupt(T, &raw_id, e))?,
        user: row.try_get("ssh_user")?,
        private_key: key
            .filter(|k| !k.is_empty())
            .map(|k| Arc::new(SecretString::from(k))),
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e| corrupt(T, &raw_id, e))?,
        last_checked: from_millis(T, &raw_id, row.try_get("last_checked")?)?,
        workload_count: u32::try_from(row.try_get::<i64, _>("workload_count")?)
            .map_err(|e| corrupt(T, &raw_id, e))?,
    })
}

fn workload_from_row(row: &SqliteRow) -> StoreResult<Workload> {
    const T: &str = "workloads";
    let raw_id: String = row.try_get("id")?;
    let raw_host: String = row.try_get("host_id")?;
    Ok(Workload {
        id: Uuid::parse_str(&raw_id).map_err(|e| corrupt(T, &raw_id, e))?,
        name: row.try_get("name")?,
        host_id: Uuid::parse_str(&raw_host).map_err(|e| corrupt(T, &raw_id, e))?,
        compose_path: row.try_get("compose_path")?,
        app_url: row.try_get("app_url")?,
        auto_stop_mins: u32::try_from(row.try_get::<i64, _>("auto_stop_mins")?)
            .map_err(|e| corrupt(T, &raw_id, e))?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e| corrupt(T, &raw_id, e))?,
        started_at: from_millis(T, &raw_id, row.try_get("started_at")?)?,
        timer_ends_at: from_millis(T, &raw_id, row.try_get("timer_ends_at")?)?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StoreResult<AuditEntry> {
    const T: &str = "audit_entries";
    let raw_id: String = row.try_get("id")?;
    Ok(AuditEntry {
        id: Uuid::parse_str(&raw_id).map_err(|e| corrupt(T, &raw_id, e))?,
        actor_id: row.try_get("actor_id")?,
        actor_name: row.try_get("actor_name")?,
        action: row
            .try_get::<String, _>("action")?
            .parse()
            .map_err(|e| corrupt(T, &raw_id, e))?,
        resource_type: row
            .try_get::<String, _>("resource_type")?
            .parse()
            .map_err(|e| corrupt(T, &raw_id, e))?,
        resource_id: row.try_get("resource_id")?,
        resource_name: row.try_get("resource_name")?,
        detail: row.try_get("detail")?,
        origin_address: row.try_get("origin_address")?,
        origin_client: row.try_get("origin_client")?,
        created_at: from_millis(T, &raw_id, Some(row.try_get("created_at")?))?
            .ok_or_else(|| corrupt(T, &raw_id, "missing created_at"))?,
    })
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(ref actor_id) = filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor_id.clone());
    }
    if let Some(action) = filter.action {
        qb.push(" AND action = ").push_bind(action.to_string());
    }
    if let Some(resource_type) = filter.resource_type {
        qb.push(" AND resource_type = ")
            .push_bind(resource_type.to_string());
    }
}

impl Store for SqliteStore {
    fn host(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Host>>> {
        Box::pin(async move {
            let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = ? AND deleted_at IS NULL");
            sqlx::query(&sql)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(host_from_row)
                .transpose()
        })
    }

    fn hosts(&self) -> BoxFuture<'_, StoreResult<Vec<Host>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {HOST_COLUMNS} FROM hosts WHERE deleted_at IS NULL ORDER BY name, created_at"
            );
            sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(host_from_row)
                .collect()
        })
    }

    fn insert_host<'op>(&'op self, host: &'op Host) -> BoxFuture<'op, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO hosts (id, name, address, port, ssh_user, ssh_private_key, status, workload_count, last_checked, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(host.id.to_string())
            .bind(&host.name)
            .bind(&host.address)
            .bind(i64::from(host.port))
            .bind(&host.user)
            .bind(
                host.private_key
                    .as_ref()
                    .map(|key| key.expose_secret().to_string()),
            )
            .bind(host.status.to_string())
            .bind(i64::from(host.workload_count))
            .bind(to_millis(host.last_checked))
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn record_probe<'op>(
        &'op self,
        id: Uuid,
        report: &'op ProbeReport,
    ) -> BoxFuture<'op, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE hosts SET status = ?, workload_count = ?, last_checked = ?
                 WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(report.status.to_string())
            .bind(i64::from(report.workload_count))
            .bind(report.checked_at.timestamp_millis())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn update_host_settings<'op>(&'op self, host: &'op Host) -> BoxFuture<'op, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE hosts SET name = ?, address = ?, port = ?, ssh_user = ?, ssh_private_key = ?
                 WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(&host.name)
            .bind(&host.address)
            .bind(i64::from(host.port))
            .bind(&host.user)
            .bind(
                host.private_key
                    .as_ref()
                    .map(|key| key.expose_secret().to_string()),
            )
            .bind(host.id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_host(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let result =
                sqlx::query("UPDATE hosts SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                    .bind(at.timestamp_millis())
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn workload(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Workload>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {WORKLOAD_COLUMNS} FROM workloads WHERE id = ? AND deleted_at IS NULL"
            );
            sqlx::query(&sql)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(workload_from_row)
                .transpose()
        })
    }

    fn workloads(&self) -> BoxFuture<'_, StoreResult<Vec<Workload>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {WORKLOAD_COLUMNS} FROM workloads WHERE deleted_at IS NULL ORDER BY name, created_at"
            );
            sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(workload_from_row)
                .collect()
        })
    }

    fn running_workloads(&self) -> BoxFuture<'_, StoreResult<Vec<Workload>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {WORKLOAD_COLUMNS} FROM workloads WHERE status = ? AND deleted_at IS NULL ORDER BY timer_ends_at"
            );
            sqlx::query(&sql)
                .bind(WorkloadStatus::Running.to_string())
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(workload_from_row)
                .collect()
        })
    }

    fn insert_workload<'op>(&'op self, workload: &'op Workload) -> BoxFuture<'op, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO workloads (id, name, host_id, compose_path, app_url, auto_stop_mins, status, started_at, timer_ends_at, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(workload.id.to_string())
            .bind(&workload.name)
            .bind(workload.host_id.to_string())
            .bind(&workload.compose_path)
            .bind(workload.app_url.as_deref())
            .bind(i64::from(workload.auto_stop_mins))
            .bind(workload.status.to_string())
            .bind(to_millis(workload.started_at))
            .bind(to_millis(workload.timer_ends_at))
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn save_lifecycle<'op>(&'op self, workload: &'op Workload) -> BoxFuture<'op, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE workloads SET status = ?, started_at = ?, timer_ends_at = ?, auto_stop_mins = ?
                 WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(workload.status.to_string())
            .bind(to_millis(workload.started_at))
            .bind(to_millis(workload.timer_ends_at))
            .bind(i64::from(workload.auto_stop_mins))
            .bind(workload.id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn update_workload_settings<'op>(
        &'op self,
        workload: &'op Workload,
    ) -> BoxFuture<'op, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE workloads SET name = ?, host_id = ?, compose_path = ?, app_url = ?, auto_stop_mins = ?
                 WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(&workload.name)
            .bind(workload.host_id.to_string())
            .bind(&workload.compose_path)
            .bind(workload.app_url.as_deref())
            .bind(i64::from(workload.auto_stop_mins))
            .bind(workload.id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_workload(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE workloads SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(at.timestamp_millis())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn append_audit<'op>(&'op self, entry: &'op AuditEntry) -> BoxFuture<'op, StoreResult<()>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO audit_entries ({AUDIT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            );
            sqlx::query(&sql)
                .bind(entry.id.to_string())
                .bind(entry.actor_id.as_deref())
                .bind(&entry.actor_name)
                .bind(entry.action.to_string())
                .bind(entry.resource_type.to_string())
                .bind(&entry.resource_id)
                .bind(&entry.resource_name)
                .bind(&entry.detail)
                .bind(entry.origin_address.as_deref())
                .bind(entry.origin_client.as_deref())
                .bind(entry.created_at.timestamp_millis())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn audit_page<'op>(
        &'op self,
        filter: &'op AuditFilter,
        limit: u32,
        offset: u32,
    ) -> BoxFuture<'op, StoreResult<AuditPage>> {
        Box::pin(async move {
            let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_entries");
            push_audit_filters(&mut count, filter);
            let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

            let mut page = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_entries"
            ));
            push_audit_filters(&mut page, filter);
            page.push(" ORDER BY created_at DESC, seq DESC LIMIT ")
                .push_bind(i64::from(limit))
                .push(" OFFSET ")
                .push_bind(i64::from(offset));
            let entries = page
                .build()
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(audit_from_row)
                .collect::<StoreResult<Vec<_>>>()?;

            Ok(AuditPage {
                entries,
                total: u64::try_from(total).unwrap_or_default(),
            })
        })
    }
}
