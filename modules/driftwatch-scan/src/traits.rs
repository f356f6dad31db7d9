//! Collaborator contracts consumed by the scan workflow.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use driftwatch_common::{DriftwatchError, ProbeResult, Target, UrlDiffResult};

/// Discovers URLs from seed targets. Must honor cancellation; partial
/// results on error are acceptable and preferred over losing the batch.
#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(
        &self,
        seeds: &[Target],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, DriftwatchError>;
}

/// Probes a URL list. Never drops a URL silently: a URL that could not be
/// probed comes back as an error record, not an absence. Results carry the
/// response time in fractional seconds.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, urls: &[String], cancel: &CancellationToken) -> Vec<ProbeResult>;
}

/// Renders cycle artifacts and returns their paths.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn generate(
        &self,
        session_id: &str,
        diffs: &[UrlDiffResult],
    ) -> Result<Vec<PathBuf>, DriftwatchError>;
}
