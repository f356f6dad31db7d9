use async_trait::async_trait;

use driftwatch_common::ScanSummary;

use super::backend::Notifier;

/// Notification backend that does nothing. Used when no transport is
/// configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn on_scan_start(&self, _summary: &ScanSummary) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_scan_complete(&self, _summary: &ScanSummary) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_scan_interrupt(&self, _summary: &ScanSummary) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_scan_failure(&self, _summary: &ScanSummary) -> anyhow::Result<()> {
        Ok(())
    }
}
