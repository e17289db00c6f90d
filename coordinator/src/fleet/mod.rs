//! Remote fleet control: host health reconciliation, workload lifecycle and the audit trail.
//!
//! [`Fleet`] is the caller-facing surface used by the HTTP API, the CLI and the background
//! drivers. Callers pass `now` and the [`RequestContext`] explicitly.

mod audit;
mod error;
mod lifecycle;
mod locks;
mod probe;
mod reconcile;
mod registry;

use alloc::sync::Arc;

use chrono::{DateTime, Utc};
use fleetctl_common::RemoteExecutor;
use tracing::error;
use uuid::Uuid;

pub use audit::{
    AuditEvent, AuditTrail, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, format_duration, page_size,
};
pub use error::{FleetError, FleetResult};
pub use lifecycle::{
    StartOutcome, StopOutcome, SweepSummary, bring_up_command, tear_down_command,
};
pub use probe::{COUNT_COMMAND, DEFAULT_REACHABILITY_TIMEOUT, ProbeSettings, VERIFY_COMMAND};
pub use registry::{DEFAULT_AUTO_STOP_MINS, HostUpdate, NewHost, NewWorkload, WorkloadUpdate};

use crate::{
    model::{AuditFilter, AuditPage, Host, RequestContext, Workload},
    store::Store,
};
use locks::WorkloadLocks;

/// Shared handle to the fleet. Cloning is cheap; clones share the lock table.
#[derive(Clone)]
pub struct Fleet {
    store: Arc<dyn Store>,
    executor: Arc<dyn RemoteExecutor>,
    audit: AuditTrail,
    probe_settings: ProbeSettings,
    locks: Arc<WorkloadLocks>,
}

impl Fleet {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<dyn RemoteExecutor>,
        probe_settings: ProbeSettings,
    ) -> Self {
        Self {
            audit: AuditTrail::new(Arc::clone(&store)),
            store,
            executor,
            probe_settings,
            locks: Arc::default(),
        }
    }

    #[must_use]
    pub const fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list_audit_entries(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u32,
    ) -> FleetResult<AuditPage> {
        Ok(self.audit.query(filter, limit, offset).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list_hosts(&self) -> FleetResult<Vec<Host>> {
        Ok(self.store.hosts().await?)
    }

    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list_workloads(&self) -> FleetResult<Vec<Workload>> {
        Ok(self.store.workloads().await?)
    }

    async fn host(&self, id: Uuid) -> FleetResult<Host> {
        self.store
            .host(id)
            .await?
            .ok_or(FleetError::HostNotFound(id))
    }

    /// Resolves a workload and its owning host, failing before any remote work is attempted.
    async fn resolve(&self, id: Uuid) -> FleetResult<(Workload, Host)> {
        let workload = self
            .store
            .workload(id)
            .await?
            .ok_or(FleetError::WorkloadNotFound(id))?;
        let host = self.host(workload.host_id).await?;
        if host.address.trim().is_empty() {
            return Err(FleetError::Validation(format!(
                "host {} has no address",
                host.name
            )));
        }
        Ok((workload, host))
    }

    /// Records an audit entry. Losing it degrades history but never fails the operation.
    async fn record_audit(&self, ctx: &RequestContext, event: AuditEvent, at: DateTime<Utc>) {
        let action = event.action;
        let resource = event.resource_id.clone();
        if let Err(e) = self.audit.record(ctx, event, at).await {
            error!(%action, %resource, actor = ctx.actor_label(), "Failed to write audit entry: {e}");
        }
    }
}
