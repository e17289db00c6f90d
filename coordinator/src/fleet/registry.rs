//! Registration, editing and removal of hosts and workloads.

use alloc::sync::Arc;

use chrono::Utc;
use fleetctl_common::parse_private_key;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{AuditEvent, Fleet, FleetError, FleetResult, probe::probe};
use crate::model::{AuditAction, Host, HostStatus, RequestContext, Workload, WorkloadStatus};

pub const DEFAULT_AUTO_STOP_MINS: u32 = 60;
const DEFAULT_SSH_PORT: u16 = 22;

const fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Connection details of a host to register.
#[derive(Debug, Deserialize)]
pub struct NewHost {
    pub name: String,
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    /// PEM private key. Hosts without one are only checked for reachability.
    #[serde(default)]
    pub private_key: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkload {
    pub name: String,
    pub host_id: Uuid,
    pub compose_path: String,
    #[serde(default)]
    pub app_url: Option<String>,
    /// Defaults to [`DEFAULT_AUTO_STOP_MINS`]; 0 means manual stop only.
    #[serde(default)]
    pub auto_stop_mins: Option<u32>,
}

/// Fields to change on a registered host. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct HostUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    /// Replaces the stored key; a blank key removes it.
    pub private_key: Option<SecretString>,
}

/// Fields to change on a registered workload. Absent fields keep their value; lifecycle state is
/// never touched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadUpdate {
    pub name: Option<String>,
    pub host_id: Option<Uuid>,
    pub compose_path: Option<String>,
    /// A blank URL removes it.
    pub app_url: Option<String>,
    pub auto_stop_mins: Option<u32>,
}

fn changed_fields(changed: &[&str]) -> String {
    if changed.is_empty() {
        "none".to_string()
    } else {
        changed.join(", ")
    }
}

fn require(field: &str, value: &str) -> FleetResult<()> {
    if value.trim().is_empty() {
        return Err(FleetError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl Fleet {
    /// Validates and probes a new host, then persists it with the observed status.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing fields or an unparsable key.
    #[tracing::instrument(skip_all, fields(name = %new.name, actor = ctx.actor_label()))]
    pub async fn register_host(&self, new: NewHost, ctx: &RequestContext) -> FleetResult<Host> {
        require("name", &new.name)?;
        require("address", &new.address)?;
        require("user", &new.user)?;
        if new.port == 0 {
            return Err(FleetError::Validation("port must not be 0".to_string()));
        }
        let private_key = match new.private_key {
            Some(key) if !key.expose_secret().trim().is_empty() => {
                parse_private_key(key.expose_secret())
                    .map_err(|e| FleetError::Validation(format!("private key: {e}")))?;
                Some(Arc::new(key))
            }
            _ => None,
        };

        let mut host = Host {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            address: new.address.trim().to_string(),
            port: new.port,
            user: new.user.trim().to_string(),
            private_key,
            status: HostStatus::Offline,
            last_checked: None,
            workload_count: 0,
        };
        let report = probe(self.executor.as_ref(), &host, self.probe_settings).await;
        host.apply_probe(&report);
        self.store.insert_host(&host).await?;

        info!(host = %host.id, status = %host.status, "Host registered");
        let detail = format!(
            "Server: {} ({}@{}:{})",
            host.name, host.user, host.address, host.port
        );
        self.record_audit(
            ctx,
            AuditEvent::server(AuditAction::CreateServer, &host, detail),
            Utc::now(),
        )
        .await;
        Ok(host)
    }

    /// Edits a host's name or connection details. The recorded status stays as last probed.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown host and a validation error for blank fields, port 0 or
    /// an unparsable key.
    #[tracing::instrument(skip(self, update, ctx), fields(actor = ctx.actor_label()))]
    pub async fn update_host(
        &self,
        id: Uuid,
        update: HostUpdate,
        ctx: &RequestContext,
    ) -> FleetResult<Host> {
        let mut host = self.host(id).await?;
        let mut changed = Vec::new();
        if let Some(name) = update.name {
            require("name", &name)?;
            host.name = name.trim().to_string();
            changed.push("name");
        }
        if let Some(address) = update.address {
            require("address", &address)?;
            host.address = address.trim().to_string();
            changed.push("address");
        }
        if let Some(port) = update.port {
            if port == 0 {
                return Err(FleetError::Validation("port must not be 0".to_string()));
            }
            host.port = port;
            changed.push("port");
        }
        if let Some(user) = update.user {
            require("user", &user)?;
            host.user = user.trim().to_string();
            changed.push("user");
        }
        if let Some(key) = update.private_key {
            host.private_key = if key.expose_secret().trim().is_empty() {
                None
            } else {
                parse_private_key(key.expose_secret())
                    .map_err(|e| FleetError::Validation(format!("private key: {e}")))?;
                Some(Arc::new(key))
            };
            changed.push("private_key");
        }

        if !self.store.update_host_settings(&host).await? {
            return Err(FleetError::HostNotFound(id));
        }
        info!(host = %host.name, ?changed, "Host updated");
        let detail = format!(
            "Server: {} ({}@{}:{}), Changed: {}",
            host.name,
            host.user,
            host.address,
            host.port,
            changed_fields(&changed)
        );
        self.record_audit(
            ctx,
            AuditEvent::server(AuditAction::UpdateServer, &host, detail),
            Utc::now(),
        )
        .await;
        Ok(host)
    }

    /// Soft-deletes a host. Its workloads stay registered but cannot be started or stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not exist.
    #[tracing::instrument(skip(self, ctx), fields(actor = ctx.actor_label()))]
    pub async fn remove_host(&self, id: Uuid, ctx: &RequestContext) -> FleetResult<()> {
        let host = self.host(id).await?;
        let now = Utc::now();
        if !self.store.delete_host(id, now).await? {
            return Err(FleetError::HostNotFound(id));
        }
        info!(host = %host.name, "Host removed");
        let detail = format!("Server: {}", host.name);
        self.record_audit(
            ctx,
            AuditEvent::server(AuditAction::DeleteServer, &host, detail),
            now,
        )
        .await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a validation error for missing fields, or not-found if the host is unknown.
    #[tracing::instrument(skip_all, fields(name = %new.name, actor = ctx.actor_label()))]
    pub async fn register_workload(
        &self,
        new: NewWorkload,
        ctx: &RequestContext,
    ) -> FleetResult<Workload> {
        require("name", &new.name)?;
        require("compose_path", &new.compose_path)?;
        let host = self.host(new.host_id).await?;

        let workload = Workload {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            host_id: host.id,
            compose_path: new.compose_path.trim().to_string(),
            app_url: new.app_url.filter(|url| !url.trim().is_empty()),
            auto_stop_mins: new.auto_stop_mins.unwrap_or(DEFAULT_AUTO_STOP_MINS),
            status: WorkloadStatus::Stopped,
            started_at: None,
            timer_ends_at: None,
        };
        self.store.insert_workload(&workload).await?;

        info!(workload = %workload.id, host = %host.name, "Workload registered");
        let detail = format!("App: {} on server {}", workload.name, host.name);
        self.record_audit(
            ctx,
            AuditEvent::app(AuditAction::CreateApp, &workload, detail),
            Utc::now(),
        )
        .await;
        Ok(workload)
    }

    /// Edits a workload's configuration. A running workload keeps running with its current timer;
    /// a new auto-stop timeout or compose path applies from the next start or stop.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown workload or target host, and a validation error for blank
    /// fields.
    #[tracing::instrument(skip(self, update, ctx), fields(actor = ctx.actor_label()))]
    pub async fn update_workload(
        &self,
        id: Uuid,
        update: WorkloadUpdate,
        ctx: &RequestContext,
    ) -> FleetResult<Workload> {
        let _guard = self.locks.acquire(id).await;
        let mut workload = self
            .store
            .workload(id)
            .await?
            .ok_or(FleetError::WorkloadNotFound(id))?;
        let mut changed = Vec::new();
        if let Some(name) = update.name {
            require("name", &name)?;
            workload.name = name.trim().to_string();
            changed.push("name");
        }
        if let Some(host_id) = update.host_id {
            workload.host_id = self.host(host_id).await?.id;
            changed.push("host_id");
        }
        if let Some(compose_path) = update.compose_path {
            require("compose_path", &compose_path)?;
            workload.compose_path = compose_path.trim().to_string();
            changed.push("compose_path");
        }
        if let Some(url) = update.app_url {
            workload.app_url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
            changed.push("app_url");
        }
        if let Some(mins) = update.auto_stop_mins {
            workload.auto_stop_mins = mins;
            changed.push("auto_stop_mins");
        }

        if !self.store.update_workload_settings(&workload).await? {
            return Err(FleetError::WorkloadNotFound(id));
        }
        info!(workload = %workload.name, ?changed, "Workload updated");
        let detail = format!(
            "App: {}, Changed: {}",
            workload.name,
            changed_fields(&changed)
        );
        self.record_audit(
            ctx,
            AuditEvent::app(AuditAction::UpdateApp, &workload, detail),
            Utc::now(),
        )
        .await;
        Ok(workload)
    }

    /// Soft-deletes a workload. A running workload is not torn down.
    ///
    /// # Errors
    ///
    /// Returns an error if the workload does not exist.
    #[tracing::instrument(skip(self, ctx), fields(actor = ctx.actor_label()))]
    pub async fn remove_workload(&self, id: Uuid, ctx: &RequestContext) -> FleetResult<()> {
        let _guard = self.locks.acquire(id).await;
        let workload = self
            .store
            .workload(id)
            .await?
            .ok_or(FleetError::WorkloadNotFound(id))?;
        let now = Utc::now();
        if !self.store.delete_workload(id, now).await? {
            return Err(FleetError::WorkloadNotFound(id));
        }
        info!(workload = %workload.name, status = %workload.status, "Workload removed");
        let detail = format!("App: {}, Status: {}", workload.name, workload.status);
        self.record_audit(
            ctx,
            AuditEvent::app(AuditAction::DeleteApp, &workload, detail),
            now,
        )
        .await;
        Ok(())
    }
}
