use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use driftwatch_common::ScanSummary;

use super::backend::Notifier;

/// Fans one notification out to several backends. A failing backend is
/// logged and skipped; the rest still receive the event.
pub struct NotifierRouter {
    backends: Vec<Arc<dyn Notifier>>,
}

impl NotifierRouter {
    pub fn new(backends: Vec<Arc<dyn Notifier>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl Notifier for NotifierRouter {
    async fn on_scan_start(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        for backend in &self.backends {
            if let Err(e) = backend.on_scan_start(summary).await {
                warn!(error = %e, "Notification backend failed on scan start");
            }
        }
        Ok(())
    }

    async fn on_scan_complete(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        for backend in &self.backends {
            if let Err(e) = backend.on_scan_complete(summary).await {
                warn!(error = %e, "Notification backend failed on scan complete");
            }
        }
        Ok(())
    }

    async fn on_scan_interrupt(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        for backend in &self.backends {
            if let Err(e) = backend.on_scan_interrupt(summary).await {
                warn!(error = %e, "Notification backend failed on scan interrupt");
            }
        }
        Ok(())
    }

    async fn on_scan_failure(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        for backend in &self.backends {
            if let Err(e) = backend.on_scan_failure(summary).await {
                warn!(error = %e, "Notification backend failed on scan failure");
            }
        }
        Ok(())
    }
}
