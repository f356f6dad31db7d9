//! The cycle loop: fire, retry, sleep, repeat. Cooperative
//! cancellation and exactly one notification per cycle outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use driftwatch_common::{
    new_session_id, DriftwatchError, ScanStatus, ScanSummary, SchedulerConfig,
};
use driftwatch_history::{CycleCompletion, CycleStatus, HistoryStore};
use driftwatch_scan::{ScanWorkflow, TargetLoader};

use crate::notify::Notifier;

/// Terminal outcome of one cycle (all attempts included).
enum CycleOutcome {
    Completed(ScanSummary),
    Interrupted(ScanSummary),
    Failed(ScanSummary),
}

/// Owns the scheduling loop. At most one cycle runs at a time; a second
/// `run` on a running scheduler returns an error instead of starting a
/// parallel loop.
pub struct Scheduler {
    config: SchedulerConfig,
    target_source: String,
    history: HistoryStore,
    loader: TargetLoader,
    workflow: Arc<ScanWorkflow>,
    notifier: Arc<dyn Notifier>,
    running: AtomicBool,
    interrupt_notified: AtomicBool,
}

impl Scheduler {
    /// Build a scheduler. Opening the history store here is deliberate:
    /// if it fails, the scheduler refuses to start.
    pub async fn new(
        config: SchedulerConfig,
        target_source: String,
        workflow: Arc<ScanWorkflow>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, DriftwatchError> {
        config.validate()?;
        let history = HistoryStore::open(&config.history_db_path).await?;

        Ok(Self {
            config,
            target_source,
            history,
            loader: TargetLoader::new(),
            workflow,
            notifier,
            running: AtomicBool::new(false),
            interrupt_notified: AtomicBool::new(false),
        })
    }

    /// Whether the interrupt notification for the current run has been
    /// dispatched.
    pub fn interrupt_notified(&self) -> bool {
        self.interrupt_notified.load(Ordering::SeqCst)
    }

    /// Re-arm the interrupt latch. Intended for tests.
    pub fn reset_interrupt_latch(&self) {
        self.interrupt_notified.store(false, Ordering::SeqCst);
    }

    /// Run the loop until `cancel` fires. The first cycle fires
    /// immediately; afterwards the next fire time is derived from the
    /// last completed cycle.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), DriftwatchError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DriftwatchError::Validation(
                "scheduler is already running".into(),
            ));
        }

        let result = self.run_loop(cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_loop(&self, cancel: &CancellationToken) -> Result<(), DriftwatchError> {
        info!(
            cycle_secs = self.config.cycle.as_secs(),
            "Scheduler started, firing first cycle immediately"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.run_cycle(cancel).await;

            if cancel.is_cancelled() {
                break;
            }

            let delay = self.next_fire_delay().await;
            if !delay.is_zero() {
                info!(secs = delay.as_secs(), "Waiting for next cycle");
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// `last completed start + cycle`, clamped to now. No completed cycle
    /// (or a failed history read) means fire immediately; firing sooner
    /// than intended is the accepted degradation.
    async fn next_fire_delay(&self) -> Duration {
        let last = match self.history.last_completed_start().await {
            Ok(last) => last,
            Err(e) => {
                warn!(error = %e, "Could not read last completed cycle, firing immediately");
                None
            }
        };
        fire_delay(last, self.config.cycle, Utc::now())
    }

    /// One cycle: load targets, run up to `retry_attempts + 1` workflow
    /// attempts under a shared session id, record exactly one history row,
    /// dispatch exactly one terminal notification.
    async fn run_cycle(&self, cancel: &CancellationToken) {
        let session_id = new_session_id();

        let loaded = match self.loader.load_and_select(&self.target_source).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(session = %session_id, error = %e, "Target loading failed");
                let mut summary = ScanSummary::started(&session_id, &self.target_source, 0);
                summary.status = ScanStatus::Failed;
                summary.attempts = 1;
                summary.errors.push(format!("target loading failed: {e}"));
                self.finish_cycle(None, CycleOutcome::Failed(summary)).await;
                return;
            }
        };

        let start_time = Utc::now();
        let cycle_id = match self
            .history
            .record_start(
                &session_id,
                &loaded.source_label,
                loaded.targets.len(),
                start_time,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                // Surfaced but not fatal to the cycle already in flight
                warn!(session = %session_id, error = %e, "Could not record scan start");
                None
            }
        };

        let mut attempt_errors: Vec<String> = Vec::new();
        let max_attempts = self.config.retry_attempts + 1;
        let mut attempt = 0u32;

        let outcome = loop {
            attempt += 1;

            let mut pending =
                ScanSummary::started(&session_id, &loaded.source_label, loaded.targets.len());
            pending.started_at = start_time;
            pending.attempts = attempt;
            self.notify_start(&pending).await;

            info!(
                session = %session_id,
                attempt,
                max_attempts,
                targets = loaded.targets.len(),
                "Cycle attempt starting"
            );

            match self
                .workflow
                .execute(&session_id, &loaded.source_label, &loaded.targets, cancel)
                .await
            {
                Ok(mut summary) => {
                    summary.started_at = start_time;
                    summary.attempts = attempt;
                    summary.errors.splice(0..0, attempt_errors.clone());
                    if summary.status == ScanStatus::Interrupted {
                        break CycleOutcome::Interrupted(summary);
                    }
                    break CycleOutcome::Completed(summary);
                }
                Err(e) if e.is_cancelled() => {
                    let mut summary = pending;
                    summary.status = ScanStatus::Interrupted;
                    summary.errors = attempt_errors.clone();
                    break CycleOutcome::Interrupted(summary);
                }
                Err(e) => {
                    error!(session = %session_id, attempt, error = %e, "Cycle attempt failed");
                    attempt_errors.push(format!("attempt {attempt}: {e}"));

                    if attempt >= max_attempts {
                        let mut summary = pending;
                        summary.status = ScanStatus::Failed;
                        summary.errors = attempt_errors.clone();
                        break CycleOutcome::Failed(summary);
                    }

                    info!(
                        session = %session_id,
                        delay_secs = self.config.retry_delay.as_secs(),
                        "Retrying after delay"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                        _ = cancel.cancelled() => {
                            let mut summary = pending;
                            summary.status = ScanStatus::Interrupted;
                            summary.errors = attempt_errors.clone();
                            break CycleOutcome::Interrupted(summary);
                        }
                    }
                }
            }
        };

        self.finish_cycle(cycle_id, outcome).await;
    }

    /// Record the terminal history row and dispatch the one terminal
    /// notification for this cycle.
    async fn finish_cycle(&self, cycle_id: Option<i64>, outcome: CycleOutcome) {
        let (summary, status, log_summary) = match &outcome {
            CycleOutcome::Completed(summary) => {
                let log = if summary.errors.is_empty() {
                    format!("completed after {} attempt(s)", summary.attempts)
                } else {
                    format!(
                        "completed after {} attempt(s); {}",
                        summary.attempts,
                        summary.errors.join("; ")
                    )
                };
                (summary, CycleStatus::Completed, log)
            }
            CycleOutcome::Interrupted(summary) => {
                (summary, CycleStatus::Failed, "interrupted".to_string())
            }
            CycleOutcome::Failed(summary) => (
                summary,
                CycleStatus::Failed,
                format!(
                    "failed after {} attempt(s): {}",
                    summary.attempts,
                    summary.errors.join("; ")
                ),
            ),
        };

        if let Some(cycle_id) = cycle_id {
            let completion = CycleCompletion {
                end_time: Utc::now(),
                status,
                log_summary,
                new_urls: summary.totals.new as i64,
                old_urls: summary.totals.old as i64,
                existing_urls: summary.totals.existing as i64,
                report_file_path: summary.report_paths.first().cloned(),
            };
            if let Err(e) = self.history.record_completion(cycle_id, completion).await {
                warn!(session = %summary.session_id, error = %e, "Could not record cycle completion");
            }
        }

        match outcome {
            CycleOutcome::Completed(summary) => {
                info!(session = %summary.session_id, "Cycle completed. {summary}");
                if let Err(e) = self.notifier.on_scan_complete(&summary).await {
                    warn!(error = %e, "Completion notification failed");
                }
            }
            CycleOutcome::Interrupted(summary) => {
                info!(session = %summary.session_id, "Cycle interrupted");
                self.notify_interrupt_once(&summary).await;
            }
            CycleOutcome::Failed(summary) => {
                error!(session = %summary.session_id, attempts = summary.attempts, "Cycle failed");
                if let Err(e) = self.notifier.on_scan_failure(&summary).await {
                    warn!(error = %e, "Failure notification failed");
                }
            }
        }
    }

    async fn notify_start(&self, summary: &ScanSummary) {
        if let Err(e) = self.notifier.on_scan_start(summary).await {
            warn!(error = %e, "Start notification failed");
        }
    }

    /// The latch: cancellation can race with failure paths, but the
    /// interrupt notification goes out at most once per run.
    async fn notify_interrupt_once(&self, summary: &ScanSummary) {
        if self.interrupt_notified.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.notifier.on_scan_interrupt(summary).await {
            warn!(error = %e, "Interrupt notification failed");
        }
    }
}

/// Pure fire-time arithmetic, separated for testing.
fn fire_delay(
    last_completed_start: Option<DateTime<Utc>>,
    cycle: Duration,
    now: DateTime<Utc>,
) -> Duration {
    let Some(last) = last_completed_start else {
        return Duration::ZERO;
    };
    let Ok(cycle_chrono) = chrono::Duration::from_std(cycle) else {
        return Duration::ZERO;
    };
    let next = last + cycle_chrono;
    if next <= now {
        Duration::ZERO
    } else {
        (next - now).to_std().unwrap_or(Duration::ZERO)
    }
}
