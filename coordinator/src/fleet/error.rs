use fleetctl_common::RemoteError;
use thiserror::Error as ThisError;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors returned by the caller-facing fleet operations.
#[derive(Debug, ThisError)]
pub enum FleetError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("host {0} not found")]
    HostNotFound(Uuid),
    #[error("workload {0} not found")]
    WorkloadNotFound(Uuid),
    #[error("remote execution failed: {0}")]
    RemoteExecution(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FleetError {
    /// Stable machine-readable reason, suitable for branching in clients.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match *self {
            Self::Validation(_) => "validation_error",
            Self::HostNotFound(_) => "host_not_found",
            Self::WorkloadNotFound(_) => "workload_not_found",
            Self::RemoteExecution(ref e) => e.kind(),
            Self::Store(_) => "store_error",
        }
    }
}

pub type FleetResult<T> = Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_keep_their_tier() {
        let err = FleetError::from(RemoteError::Connect {
            endpoint: "10.1.1.1:22".to_string(),
            phase: fleetctl_common::ConnectPhase::Tcp,
            message: "connection refused".to_string(),
        });
        assert_eq!(err.kind(), "connect_error");
        assert!(err.to_string().contains("10.1.1.1:22"), "{err}");
        assert_eq!(
            FleetError::HostNotFound(Uuid::nil()).kind(),
            "host_not_found"
        );
    }
}
