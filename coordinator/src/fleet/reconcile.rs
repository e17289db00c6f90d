//! Applies health probes to hosts and persists the results.

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info};
use uuid::Uuid;

use super::{AuditEvent, Fleet, FleetError, FleetResult, probe::probe};
use crate::model::{AuditAction, Host, HostStatus, RequestContext};

impl Fleet {
    /// Re-probes one host and writes status, workload count and check time together.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not exist or the result cannot be stored.
    #[tracing::instrument(skip_all, fields(host = %id))]
    pub async fn probe_host(&self, id: Uuid, ctx: &RequestContext) -> FleetResult<Host> {
        let host = self.host(id).await?;
        let updated = self
            .refresh_one(&host)
            .await?
            .ok_or(FleetError::HostNotFound(id))?;
        self.record_audit(ctx, refresh_event(&updated), Utc::now())
            .await;
        Ok(updated)
    }

    /// Re-probes every host, auditing one `refresh_server` entry per host.
    ///
    /// # Errors
    ///
    /// Returns an error only if the host list cannot be read.
    #[tracing::instrument(skip_all)]
    pub async fn probe_all_hosts(&self, ctx: &RequestContext) -> FleetResult<Vec<Host>> {
        let updated = self.refresh_all().await?;
        let now = Utc::now();
        for host in &updated {
            self.record_audit(ctx, refresh_event(host), now).await;
        }
        Ok(updated)
    }

    /// Probes every host concurrently. One host's failure never affects the others.
    ///
    /// Not audited; this is what the periodic refresh driver calls.
    ///
    /// # Errors
    ///
    /// Returns an error only if the host list cannot be read.
    pub async fn refresh_all(&self) -> FleetResult<Vec<Host>> {
        let hosts = self.store.hosts().await?;
        let results = join_all(hosts.iter().map(|host| async move {
            match self.refresh_one(host).await {
                Ok(updated) => updated,
                Err(e) => {
                    error!(host = %host.id, "Failed to store probe result: {e}");
                    None
                }
            }
        }))
        .await;
        let updated: Vec<Host> = results.into_iter().flatten().collect();
        info!(
            total = hosts.len(),
            online = updated
                .iter()
                .filter(|h| h.status == HostStatus::Online)
                .count(),
            "Refreshed hosts"
        );
        Ok(updated)
    }

    /// `None` if the host was removed while it was being probed.
    async fn refresh_one(&self, host: &Host) -> FleetResult<Option<Host>> {
        let report = probe(self.executor.as_ref(), host, self.probe_settings).await;
        if !self.store.record_probe(host.id, &report).await? {
            return Ok(None);
        }
        let mut updated = host.clone();
        updated.apply_probe(&report);
        Ok(Some(updated))
    }
}

fn refresh_event(host: &Host) -> AuditEvent {
    AuditEvent::server(
        AuditAction::RefreshServer,
        host,
        format!(
            "Server: {}, Status: {}, Running apps: {}",
            host.name, host.status, host.workload_count
        ),
    )
}
