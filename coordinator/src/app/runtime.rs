//! Background drivers: periodic host refresh and the auto-stop sweep.

use core::time::Duration;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument as _, debug, error, info};

use crate::{config::SchedulerConfig, fleet::Fleet};

/// Start the background drivers enabled in `scheduler`.
pub(super) fn start_background_tasks(fleet: &Fleet, scheduler: SchedulerConfig) {
    if scheduler.refresh_interval_secs > 0 {
        let fleet = fleet.clone();
        let period = Duration::from_secs(scheduler.refresh_interval_secs);
        tokio::spawn(
            async move {
                refresh_hosts_periodically(fleet, period).await;
            }
            .instrument(tracing::info_span!("driver.refresh")),
        );
    } else {
        info!("Periodic host refresh disabled");
    }

    if scheduler.expiry_interval_secs > 0 {
        let fleet = fleet.clone();
        let period = Duration::from_secs(scheduler.expiry_interval_secs);
        tokio::spawn(
            async move {
                stop_expired_periodically(fleet, period).await;
            }
            .instrument(tracing::info_span!("driver.expiry")),
        );
    } else {
        info!("Auto-stop driver disabled");
    }
}

async fn refresh_hosts_periodically(fleet: Fleet, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match fleet.refresh_all().await {
            Ok(hosts) => debug!(hosts = hosts.len(), "Periodic refresh done"),
            Err(e) => error!("Periodic refresh failed: {e}"),
        }
    }
}

async fn stop_expired_periodically(fleet: Fleet, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = fleet.stop_expired_workloads(Utc::now()).await {
            error!("Auto-stop sweep failed: {e}");
        }
    }
}
