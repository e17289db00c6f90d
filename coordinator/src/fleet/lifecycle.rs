//! Start/stop transitions of compose workloads and the auto-stop sweep.

use core::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    AuditEvent, Fleet, FleetError, FleetResult,
    audit::{start_detail, stop_detail},
};
use crate::model::{AuditAction, Host, RequestContext, Workload, WorkloadStatus};

/// Quotes `value` as a single POSIX shell word.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[must_use]
pub fn bring_up_command(compose_path: &str) -> String {
    format!("cd {} && docker-compose up -d", shell_quote(compose_path))
}

#[must_use]
pub fn tear_down_command(compose_path: &str) -> String {
    format!("cd {} && docker-compose down", shell_quote(compose_path))
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    /// Combined output of the bring-up command.
    pub output: String,
    /// When the auto-stop timer fires; `None` for manual stop only.
    pub timer_ends_at: Option<DateTime<Utc>>,
    /// Where the started application can be reached, if configured.
    pub app_url: Option<String>,
}

impl StartOutcome {
    /// Timer expiry as unix seconds, `0` meaning no auto-stop.
    #[must_use]
    pub fn timer_ends_at_epoch_seconds(&self) -> i64 {
        self.timer_ends_at.map_or(0, |at| at.timestamp())
    }
}

/// Result of a successful stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    /// Combined output of the tear-down command.
    pub output: String,
    /// How long the workload ran; `None` when it had no start timestamp.
    pub ran_for: Option<Duration>,
}

/// Counts from one auto-stop sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub stopped: usize,
    pub failed: usize,
}

impl Fleet {
    /// Brings a workload up on its host and arms the auto-stop timer.
    ///
    /// A positive `timeout_minutes` becomes the workload's auto-stop timeout, anything else means
    /// manual stop only. Starting a running workload re-issues the command and restarts the clock.
    ///
    /// # Errors
    ///
    /// Fails without touching the record if the workload or its host is unknown, or if the
    /// remote command fails.
    #[tracing::instrument(skip(self, now, ctx), fields(actor = ctx.actor_label()))]
    pub async fn start_workload(
        &self,
        id: Uuid,
        timeout_minutes: i64,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> FleetResult<StartOutcome> {
        let auto_stop_mins = u32::try_from(timeout_minutes.max(0)).map_err(|_| {
            FleetError::Validation(format!("timeout of {timeout_minutes} minutes is too large"))
        })?;

        let _guard = self.locks.acquire(id).await;
        let (mut workload, host) = self.resolve(id).await?;

        let output = self
            .executor
            .execute(
                &host.session_target(),
                &bring_up_command(&workload.compose_path),
            )
            .await
            .inspect_err(|e| warn!(workload = %workload.name, "Start failed: {e}"))?;

        workload.status = WorkloadStatus::Running;
        workload.started_at = Some(now);
        workload.auto_stop_mins = auto_stop_mins;
        workload.timer_ends_at = (auto_stop_mins > 0)
            .then(|| now + chrono::Duration::minutes(i64::from(auto_stop_mins)));
        if !self.store.save_lifecycle(&workload).await? {
            return Err(FleetError::WorkloadNotFound(id));
        }

        info!(workload = %workload.name, host = %host.name, timer_ends_at = ?workload.timer_ends_at, "Workload started");
        self.record_audit(
            ctx,
            AuditEvent::app(
                AuditAction::StartApp,
                &workload,
                start_detail(&workload, &host),
            ),
            now,
        )
        .await;

        Ok(StartOutcome {
            output,
            timer_ends_at: workload.timer_ends_at,
            app_url: workload.app_url,
        })
    }

    /// Tears a workload down and clears its run timestamps.
    ///
    /// Stopping an already stopped workload still issues the command; the run duration is then
    /// omitted.
    ///
    /// # Errors
    ///
    /// Fails without touching the record if the workload or its host is unknown, or if the
    /// remote command fails.
    #[tracing::instrument(skip(self, now, ctx), fields(actor = ctx.actor_label()))]
    pub async fn stop_workload(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> FleetResult<StopOutcome> {
        let guard = self.locks.acquire(id).await;
        let (workload, host) = self.resolve(id).await?;
        let outcome = self
            .stop_locked(workload, &host, now, ctx, AuditAction::StopApp)
            .await;
        drop(guard);
        outcome
    }

    /// Stops every running workload whose timer has elapsed at `now`, as the `system` actor.
    ///
    /// Failures are logged per workload and do not end the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the running workloads cannot be listed.
    #[tracing::instrument(skip_all)]
    pub async fn stop_expired_workloads(&self, now: DateTime<Utc>) -> FleetResult<SweepSummary> {
        let due: Vec<Workload> = self
            .store
            .running_workloads()
            .await?
            .into_iter()
            .filter(|w| w.is_due_for_auto_stop(now))
            .collect();
        if due.is_empty() {
            return Ok(SweepSummary::default());
        }

        let ctx = RequestContext::system();
        let results = join_all(due.iter().map(|w| self.stop_if_expired(w.id, now, &ctx))).await;

        let mut summary = SweepSummary::default();
        for (workload, result) in due.iter().zip(results) {
            match result {
                Ok(true) => summary.stopped += 1,
                Ok(false) => debug!(workload = %workload.name, "Timer was reset before the sweep reached it"),
                Err(e) => {
                    warn!(workload = %workload.name, "Auto-stop failed: {e}");
                    summary.failed += 1;
                }
            }
        }
        info!(stopped = summary.stopped, failed = summary.failed, "Auto-stop sweep finished");
        Ok(summary)
    }

    /// Re-checks the timer under the workload lock, since a restart may have re-armed it.
    async fn stop_if_expired(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> FleetResult<bool> {
        let _guard = self.locks.acquire(id).await;
        let (workload, host) = self.resolve(id).await?;
        if !workload.is_due_for_auto_stop(now) {
            return Ok(false);
        }
        self.stop_locked(workload, &host, now, ctx, AuditAction::AutoStopApp)
            .await?;
        Ok(true)
    }

    async fn stop_locked(
        &self,
        mut workload: Workload,
        host: &Host,
        now: DateTime<Utc>,
        ctx: &RequestContext,
        action: AuditAction,
    ) -> FleetResult<StopOutcome> {
        let output = self
            .executor
            .execute(
                &host.session_target(),
                &tear_down_command(&workload.compose_path),
            )
            .await
            .inspect_err(|e| warn!(workload = %workload.name, "Stop failed: {e}"))?;

        // A start timestamp in the future (clock skew) counts as zero runtime.
        let ran_for = workload
            .started_at
            .map(|started| (now - started).to_std().unwrap_or(Duration::ZERO));
        workload.status = WorkloadStatus::Stopped;
        workload.started_at = None;
        workload.timer_ends_at = None;
        if !self.store.save_lifecycle(&workload).await? {
            return Err(FleetError::WorkloadNotFound(workload.id));
        }

        info!(workload = %workload.name, host = %host.name, ?ran_for, %action, "Workload stopped");
        self.record_audit(
            ctx,
            AuditEvent::app(action, &workload, stop_detail(&workload, host, ran_for)),
            now,
        )
        .await;

        Ok(StopOutcome { output, ran_for })
    }
}
