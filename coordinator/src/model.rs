//! Records managed by the coordinator: hosts, workloads and audit entries.

use alloc::sync::Arc;
use core::time::Duration;

use chrono::{DateTime, Utc};
use fleetctl_common::SessionTarget;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Host reachability as last observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    /// Also the status of a host that was never probed.
    #[default]
    Offline,
}

serde_plain::derive_display_from_serialize!(HostStatus);
serde_plain::derive_fromstr_from_deserialize!(HostStatus);

/// Lifecycle status of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    #[default]
    Stopped,
    Running,
}

serde_plain::derive_display_from_serialize!(WorkloadStatus);
serde_plain::derive_fromstr_from_deserialize!(WorkloadStatus);

/// A registered remote machine.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    /// Decrypted key material. Never serialized.
    #[serde(skip)]
    pub private_key: Option<Arc<SecretString>>,
    pub status: HostStatus,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_checked: Option<DateTime<Utc>>,
    /// Running containers counted by the last successful probe.
    pub workload_count: u32,
}

impl Host {
    /// Whether a login principal and a non-blank key are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.user.trim().is_empty()
            && self
                .private_key
                .as_ref()
                .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    /// Connection parameters for a remote session. A missing key yields an empty one, which the
    /// executor rejects as unparsable.
    #[must_use]
    pub fn session_target(&self) -> SessionTarget {
        SessionTarget {
            address: self.address.clone(),
            port: self.port,
            user: self.user.clone(),
            private_key: self
                .private_key
                .clone()
                .unwrap_or_else(|| Arc::new(SecretString::from(""))),
        }
    }

    /// Overwrites the probe-derived fields in one step.
    pub fn apply_probe(&mut self, report: &ProbeReport) {
        self.status = report.status;
        self.workload_count = report.workload_count;
        self.last_checked = Some(report.checked_at);
    }
}

/// Result of one health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub status: HostStatus,
    pub workload_count: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub checked_at: DateTime<Utc>,
}

/// A compose-based application bound to one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub id: Uuid,
    pub name: String,
    pub host_id: Uuid,
    /// Remote directory containing the compose definition.
    pub compose_path: String,
    pub app_url: Option<String>,
    /// Auto-stop timeout in minutes; 0 means manual stop only.
    pub auto_stop_mins: u32,
    pub status: WorkloadStatus,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub timer_ends_at: Option<DateTime<Utc>>,
}

/// Remaining auto-stop time of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStop {
    /// No timer is armed.
    Manual,
    Remaining(Duration),
}

impl Workload {
    /// True once a running workload's timer has elapsed at `now`.
    #[must_use]
    pub fn is_due_for_auto_stop(&self, now: DateTime<Utc>) -> bool {
        self.status == WorkloadStatus::Running && self.timer_ends_at.is_some_and(|end| end <= now)
    }

    #[must_use]
    pub fn time_remaining(&self, now: DateTime<Utc>) -> AutoStop {
        match self.timer_ends_at {
            Some(end) if self.status == WorkloadStatus::Running => {
                AutoStop::Remaining((end - now).to_std().unwrap_or(Duration::ZERO))
            }
            _ => AutoStop::Manual,
        }
    }

    /// `running` iff a start timestamp is set, and a timer only while running with a timeout.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let running = self.status == WorkloadStatus::Running;
        running == self.started_at.is_some()
            && self.timer_ends_at.is_some() == (running && self.auto_stop_mins > 0)
    }
}

/// Closed vocabulary of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StartApp,
    StopApp,
    AutoStopApp,
    CreateApp,
    UpdateApp,
    DeleteApp,
    CreateServer,
    UpdateServer,
    DeleteServer,
    RefreshServer,
    CreateUser,
    UpdateUser,
    DeleteUser,
}

serde_plain::derive_display_from_serialize!(AuditAction);
serde_plain::derive_fromstr_from_deserialize!(AuditAction);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    App,
    Server,
    User,
}

serde_plain::derive_display_from_serialize!(ResourceType);
serde_plain::derive_fromstr_from_deserialize!(ResourceType);

/// Who asked for an operation and from where. Used for attribution only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub origin_address: Option<String>,
    pub origin_client: Option<String>,
}

/// Actor name recorded when the caller could not be identified.
pub const UNKNOWN_ACTOR: &str = "unknown";
/// Actor name used by the coordinator's own background drivers.
pub const SYSTEM_ACTOR: &str = "system";

impl RequestContext {
    #[must_use]
    pub fn system() -> Self {
        Self {
            actor_name: Some(SYSTEM_ACTOR.to_string()),
            origin_client: Some(env!("CARGO_PKG_NAME").to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn actor_label(&self) -> &str {
        self.actor_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_ACTOR)
    }
}

/// One immutable audit trail record. Resource name and type are copies taken at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<String>,
    pub actor_name: String,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub resource_name: String,
    pub detail: String,
    pub origin_address: Option<String>,
    pub origin_client: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional, AND-combined audit query filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<ResourceType>,
}

/// One page of audit entries, newest first, with the unpaged match count.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: u64,
}
