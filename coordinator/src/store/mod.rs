//! Backing store for hosts, workloads and audit entries.
//!
//! The fleet logic only sees the [`Store`] trait; [`SqliteStore`] is the bundled implementation.

mod sqlite;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error as ThisError;
use uuid::Uuid;

use crate::model::{AuditEntry, AuditFilter, AuditPage, Host, ProbeReport, Workload};

pub use sqlite::SqliteStore;

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt {table} row {id}: {reason}")]
    Corrupt {
        table: &'static str,
        id: String,
        reason: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed record storage. Soft-deleted records are invisible to every read.
///
/// Writes that report `bool` return whether a live record matched.
pub trait Store: Send + Sync {
    fn host(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Host>>>;
    fn hosts(&self) -> BoxFuture<'_, StoreResult<Vec<Host>>>;
    fn insert_host<'op>(&'op self, host: &'op Host) -> BoxFuture<'op, StoreResult<()>>;
    /// Writes status, workload count and check time as a single update.
    fn record_probe<'op>(
        &'op self,
        id: Uuid,
        report: &'op ProbeReport,
    ) -> BoxFuture<'op, StoreResult<bool>>;
    /// Writes name, address, port, login and key. Probe results are left alone.
    fn update_host_settings<'op>(&'op self, host: &'op Host) -> BoxFuture<'op, StoreResult<bool>>;
    fn delete_host(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<bool>>;

    fn workload(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Workload>>>;
    fn workloads(&self) -> BoxFuture<'_, StoreResult<Vec<Workload>>>;
    fn running_workloads(&self) -> BoxFuture<'_, StoreResult<Vec<Workload>>>;
    fn insert_workload<'op>(&'op self, workload: &'op Workload) -> BoxFuture<'op, StoreResult<()>>;
    /// Persists status, timestamps and the auto-stop timeout of a workload.
    fn save_lifecycle<'op>(&'op self, workload: &'op Workload) -> BoxFuture<'op, StoreResult<bool>>;
    /// Writes name, owning host, compose path, URL and auto-stop timeout. Lifecycle fields are
    /// left alone.
    fn update_workload_settings<'op>(
        &'op self,
        workload: &'op Workload,
    ) -> BoxFuture<'op, StoreResult<bool>>;
    fn delete_workload(&self, id: Uuid, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<bool>>;

    fn append_audit<'op>(&'op self, entry: &'op AuditEntry) -> BoxFuture<'op, StoreResult<()>>;
    fn audit_page<'op>(
        &'op self,
        filter: &'op AuditFilter,
        limit: u32,
        offset: u32,
    ) -> BoxFuture<'op, StoreResult<AuditPage>>;
}
