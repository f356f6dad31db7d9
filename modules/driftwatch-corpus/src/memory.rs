use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use driftwatch_common::{DriftwatchError, ProbeResult};

use crate::{Corpus, CorpusMetadata, CorpusSnapshot};

/// In-memory corpus for tests. Supports injected read/write failures so
/// callers can exercise the degraded paths.
#[derive(Default)]
pub struct MemoryCorpus {
    partitions: Mutex<HashMap<String, (CorpusMetadata, Vec<ProbeResult>)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a root's snapshot directly, as if written by `session_id`.
    pub fn seed(&self, root_target: &str, session_id: &str, records: Vec<ProbeResult>) {
        let metadata = CorpusMetadata {
            session_id: Some(session_id.to_string()),
            record_count: records.len(),
            written_at: Some(Utc::now()),
        };
        self.partitions
            .lock()
            .unwrap()
            .insert(root_target.to_string(), (metadata, records));
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Records currently stored for a root, empty if never written.
    pub fn records(&self, root_target: &str) -> Vec<ProbeResult> {
        self.partitions
            .lock()
            .unwrap()
            .get(root_target)
            .map(|(_, records)| records.clone())
            .unwrap_or_default()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.lock().unwrap().len()
    }
}

#[async_trait]
impl Corpus for MemoryCorpus {
    async fn read_all(&self, root_target: &str) -> Result<CorpusSnapshot, DriftwatchError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DriftwatchError::Corpus("injected read failure".into()));
        }
        let partitions = self.partitions.lock().unwrap();
        Ok(partitions
            .get(root_target)
            .map(|(metadata, records)| CorpusSnapshot {
                records: records.clone(),
                metadata: metadata.clone(),
            })
            .unwrap_or_default())
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
        records: &[ProbeResult],
        session_id: &str,
        root_target: &str,
    ) -> Result<(), DriftwatchError> {
        if cancel.is_cancelled() {
            return Err(DriftwatchError::Cancelled);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DriftwatchError::Corpus("injected write failure".into()));
        }
        self.seed(root_target, session_id, records.to_vec());
        Ok(())
    }
}
