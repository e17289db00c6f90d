//! Point-in-time health check of a single host.

use core::time::Duration;

use chrono::Utc;
use fleetctl_common::RemoteExecutor;
use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, warn};

use crate::model::{Host, HostStatus, ProbeReport};

/// No-op command proving that a session can be opened and used.
pub const VERIFY_COMMAND: &str = "echo 'connection test'";
/// Prints the number of running containers on the host.
pub const COUNT_COMMAND: &str = "docker ps -q | wc -l";

pub const DEFAULT_REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    /// Upper bound for the bare TCP reachability check.
    pub reachability_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            reachability_timeout: DEFAULT_REACHABILITY_TIMEOUT,
        }
    }
}

/// Probes `host` and reports its status and workload count.
///
/// Never fails: every problem on the way is the `offline` signal being measured.
#[tracing::instrument(skip_all, fields(host = %host.id, endpoint = %format_args!("{}:{}", host.address, host.port)))]
pub(crate) async fn probe(
    executor: &dyn RemoteExecutor,
    host: &Host,
    settings: ProbeSettings,
) -> ProbeReport {
    let (status, workload_count) = observe(executor, host, settings).await;
    debug!(%status, workload_count, "Probe finished");
    ProbeReport {
        status,
        workload_count,
        checked_at: Utc::now(),
    }
}

async fn observe(
    executor: &dyn RemoteExecutor,
    host: &Host,
    settings: ProbeSettings,
) -> (HostStatus, u32) {
    if host.address.trim().is_empty() {
        debug!("Host has no address");
        return (HostStatus::Offline, 0);
    }

    match timeout(
        settings.reachability_timeout,
        TcpStream::connect((host.address.as_str(), host.port)),
    )
    .await
    {
        Ok(Ok(stream)) => drop(stream),
        Ok(Err(e)) => {
            debug!("Host unreachable: {e}");
            return (HostStatus::Offline, 0);
        }
        Err(_elapsed) => {
            debug!(
                "Host unreachable: no answer within {}s",
                settings.reachability_timeout.as_secs()
            );
            return (HostStatus::Offline, 0);
        }
    }

    if !host.has_credentials() {
        // Reachability is all that can be said without credentials.
        return (HostStatus::Online, 0);
    }

    let target = host.session_target();
    if let Err(e) = executor.execute(&target, VERIFY_COMMAND).await {
        warn!("Session verification failed: {e}");
        return (HostStatus::Offline, 0);
    }

    let workload_count = match executor.execute(&target, COUNT_COMMAND).await {
        Ok(output) => parse_count(&output).unwrap_or_else(|| {
            warn!(output = %output.trim(), "Could not parse workload count");
            0
        }),
        Err(e) => {
            warn!("Workload count failed: {e}");
            0
        }
    };
    (HostStatus::Online, workload_count)
}

fn parse_count(output: &str) -> Option<u32> {
    output.trim().parse().ok()
}
