use async_trait::async_trait;

use driftwatch_common::ScanSummary;

/// Pluggable notification backend for the scheduler. All hooks are
/// best-effort: failures are logged by the caller and never affect the
/// cycle outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A cycle attempt is starting.
    async fn on_scan_start(&self, summary: &ScanSummary) -> anyhow::Result<()>;

    /// The cycle completed; `summary.report_paths` lists the artifacts.
    async fn on_scan_complete(&self, summary: &ScanSummary) -> anyhow::Result<()>;

    /// The cycle was interrupted by a stop signal or cancellation.
    async fn on_scan_interrupt(&self, summary: &ScanSummary) -> anyhow::Result<()>;

    /// The cycle failed after exhausting its retries.
    async fn on_scan_failure(&self, summary: &ScanSummary) -> anyhow::Result<()>;
}
