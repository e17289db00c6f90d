//! Append-only record of state-changing actions.

use alloc::sync::Arc;
use core::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    model::{
        AuditAction, AuditEntry, AuditFilter, AuditPage, Host, RequestContext, ResourceType,
        Workload,
    },
    store::{Store, StoreResult},
};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// What happened to which resource. Name and type are copied, not referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub resource_name: String,
    pub detail: String,
}

impl AuditEvent {
    #[must_use]
    pub fn app(action: AuditAction, workload: &Workload, detail: String) -> Self {
        Self {
            action,
            resource_type: ResourceType::App,
            resource_id: workload.id.to_string(),
            resource_name: workload.name.clone(),
            detail,
        }
    }

    #[must_use]
    pub fn server(action: AuditAction, host: &Host, detail: String) -> Self {
        Self {
            action,
            resource_type: ResourceType::Server,
            resource_id: host.id.to_string(),
            resource_name: host.name.clone(),
            detail,
        }
    }
}

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Store>,
}

impl AuditTrail {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persists one entry attributed to `ctx`. A missing actor is recorded as `unknown`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn record(
        &self,
        ctx: &RequestContext,
        event: AuditEvent,
        at: DateTime<Utc>,
    ) -> StoreResult<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            actor_id: ctx.actor_id.clone(),
            actor_name: ctx.actor_label().to_string(),
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            resource_name: event.resource_name,
            detail: event.detail,
            origin_address: ctx.origin_address.clone(),
            origin_client: ctx.origin_client.clone(),
            created_at: at,
        };
        self.store.append_audit(&entry).await?;
        Ok(entry)
    }

    /// Newest-first page of entries matching every set filter.
    ///
    /// A zero `limit` means the default page size; larger values are capped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn query(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u32,
    ) -> StoreResult<AuditPage> {
        self.store
            .audit_page(filter, page_size(limit), offset)
            .await
    }
}

/// Effective page size for a requested `limit`: `0` means the default, anything else is capped.
#[must_use]
pub const fn page_size(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_PAGE_SIZE,
        n if n > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        n => n,
    }
}

/// `47m12s`, `1h2m0s`. Sub-second precision is dropped.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else {
        format!("{minutes}m{seconds}s")
    }
}

#[must_use]
pub(crate) fn start_detail(workload: &Workload, host: &Host) -> String {
    let auto_stop = match workload.auto_stop_mins {
        0 => "manual".to_string(),
        mins => format_duration(Duration::from_secs(u64::from(mins) * 60)),
    };
    format!(
        "App: {} on server {}, Auto-stop: {auto_stop}",
        workload.name, host.name
    )
}

#[must_use]
pub(crate) fn stop_detail(workload: &Workload, host: &Host, ran_for: Option<Duration>) -> String {
    let base = format!("App: {} on server {}", workload.name, host.name);
    match ran_for {
        Some(d) => format!("{base}, Duration: {}", format_duration(d)),
        None => base,
    }
}
