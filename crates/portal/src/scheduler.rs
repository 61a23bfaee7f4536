//! Daily whole-population reconciliation.
//!
//! One sequential worker walks every active student once per day, pacing
//! requests so the fragile portal is never hammered. Sequential execution is
//! the backpressure mechanism, not an optimization target.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tracing::{debug, error, info, warn};

use standings_core::db::repository::StandingsRepository;
use standings_core::error::Result;
use standings_core::models::reconciliation::ReconciliationStatus;
use standings_core::models::standing::PortalSyncState;

use crate::sync::SyncEngine;

/// Outcome counts of one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub students_attempted: i64,
    pub refreshed: i64,
    pub credential_failures: i64,
    pub transient_failures: i64,
    pub skipped: i64,
}

/// Delay until the next local midnight, when the daily sweep fires.
pub fn duration_until_next_run(now: DateTime<Local>) -> Duration {
    let next_midnight = (now.date_naive() + chrono::Days::new(1)).and_time(chrono::NaiveTime::MIN);
    match Local.from_local_datetime(&next_midnight).earliest() {
        Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
        // A DST transition swallowed midnight; fall back to a flat day.
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Time-triggered job that refreshes the whole active student population.
pub struct ReconciliationScheduler<R: StandingsRepository> {
    repo: Arc<R>,
    engine: SyncEngine<R>,
    pace: Duration,
}

impl<R: StandingsRepository> ReconciliationScheduler<R> {
    pub fn new(repo: Arc<R>, engine: SyncEngine<R>, pace_ms: u64) -> Self {
        Self {
            repo,
            engine,
            pace: Duration::from_millis(pace_ms),
        }
    }

    /// Run sweeps at every local midnight until the shutdown future
    /// completes. Shutdown mid-sweep stops immediately; the aborted sweep is
    /// not resumed.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let wait = duration_until_next_run(Local::now());
            info!(seconds = wait.as_secs(), "next reconciliation sweep scheduled");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    info!("reconciliation scheduler stopped");
                    return Ok(());
                }
            }
            tokio::select! {
                result = self.run_once() => match result {
                    Ok(summary) => info!(
                        attempted = summary.students_attempted,
                        refreshed = summary.refreshed,
                        credential_failures = summary.credential_failures,
                        transient_failures = summary.transient_failures,
                        skipped = summary.skipped,
                        "reconciliation sweep finished"
                    ),
                    Err(e) => error!(error = %e, "reconciliation sweep failed"),
                },
                _ = &mut shutdown => {
                    info!("reconciliation scheduler stopped mid-sweep");
                    return Ok(());
                }
            }
        }
    }

    /// One full sweep over the active population. Per-student portal
    /// failures are absorbed into that student's own record or log line;
    /// only repository failures abort the sweep.
    pub async fn run_once(&self) -> Result<ReconciliationSummary> {
        let run = self.repo.create_reconciliation_run().await?;
        info!(run_id = run.id, "starting reconciliation sweep");

        match self.execute_sweep().await {
            Ok(summary) => {
                self.repo
                    .update_reconciliation_run(
                        run.id,
                        ReconciliationStatus::Completed,
                        summary.students_attempted,
                        summary.refreshed,
                        summary.credential_failures,
                        summary.transient_failures,
                        summary.skipped,
                        None,
                    )
                    .await?;
                Ok(summary)
            }
            Err(e) => {
                let error_msg = e.to_string();
                let _ = self
                    .repo
                    .update_reconciliation_run(
                        run.id,
                        ReconciliationStatus::Failed,
                        0,
                        0,
                        0,
                        0,
                        0,
                        Some(&error_msg),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn execute_sweep(&self) -> Result<ReconciliationSummary> {
        let students = self.repo.list_active_students().await?;
        let states: HashMap<String, PortalSyncState> = self
            .repo
            .list_sync_states()
            .await?
            .into_iter()
            .map(|s| (s.student_id.clone(), s))
            .collect();

        let mut summary = ReconciliationSummary::default();

        for student in &students {
            // A flagged student cannot be refreshed automatically until they
            // re-authenticate through the on-demand path.
            if states
                .get(&student.student_id)
                .is_some_and(|s| s.login_error)
            {
                debug!(student_id = %student.student_id, "skipping student with login error");
                summary.skipped += 1;
                continue;
            }

            summary.students_attempted += 1;
            match self.engine.refresh(student, None).await {
                Ok((state, _)) => {
                    if state.login_error {
                        summary.credential_failures += 1;
                    } else {
                        summary.refreshed += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        student_id = %student.student_id,
                        error = %e,
                        "refresh failed; continuing with remaining students"
                    );
                    summary.transient_failures += 1;
                }
            }

            tokio::time::sleep(self.pace).await;
        }

        Ok(summary)
    }
}
