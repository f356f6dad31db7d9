//! Historical corpus: everything ever seen per root target.
//!
//! The core reads a root's snapshot before diffing and atomically replaces
//! it after. The on-disk format is this crate's business; callers see only
//! the `Corpus` trait.

mod jsonl;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use driftwatch_common::{DriftwatchError, ProbeResult};

pub use jsonl::JsonlCorpus;
pub use memory::MemoryCorpus;

/// Snapshot-level metadata. `session_id` identifies the writing session so
/// the differ can discard residue from a crashed attempt of the same cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub session_id: Option<String>,
    pub record_count: usize,
    pub written_at: Option<DateTime<Utc>>,
}

/// All records previously persisted for one root target.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    pub records: Vec<ProbeResult>,
    pub metadata: CorpusMetadata,
}

/// Persisted per-root probe collection.
#[async_trait]
pub trait Corpus: Send + Sync {
    /// All records previously persisted for the root. A root that was never
    /// written reads as an empty snapshot, not an error.
    async fn read_all(&self, root_target: &str) -> Result<CorpusSnapshot, DriftwatchError>;

    /// Atomically replace the root's snapshot with `records`.
    async fn write(
        &self,
        cancel: &CancellationToken,
        records: &[ProbeResult],
        session_id: &str,
        root_target: &str,
    ) -> Result<(), DriftwatchError>;
}
