use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use driftwatch_common::{DriftwatchError, ProbeResult};

use crate::{Corpus, CorpusMetadata, CorpusSnapshot};

/// One `.jsonl` snapshot file per root target under a base directory.
/// First line is the metadata header, then one record per line. Writes go
/// to a temp file and are renamed over the old snapshot, so readers never
/// observe a half-written partition.
pub struct JsonlCorpus {
    base_path: PathBuf,
}

impl JsonlCorpus {
    /// Create the corpus over `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, DriftwatchError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            DriftwatchError::Config(format!(
                "cannot create corpus directory {}: {e}",
                base_path.display()
            ))
        })?;
        Ok(Self { base_path })
    }

    fn partition_path(&self, root_target: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", partition_slug(root_target)))
    }
}

/// Filesystem-safe partition name for a root target URL. Scheme is kept so
/// http and https roots stay distinct partitions.
fn partition_slug(root_target: &str) -> String {
    let cleaned: String = root_target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let mut slug: String = cleaned.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    slug.truncate(120);
    slug
}

#[async_trait]
impl Corpus for JsonlCorpus {
    async fn read_all(&self, root_target: &str) -> Result<CorpusSnapshot, DriftwatchError> {
        let path = self.partition_path(root_target);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %root_target, "No corpus partition yet");
                return Ok(CorpusSnapshot::default());
            }
            Err(e) => {
                return Err(DriftwatchError::Corpus(format!(
                    "cannot read corpus partition {}: {e}",
                    path.display()
                )))
            }
        };

        let mut lines = raw.lines();
        let header = match lines.next() {
            Some(line) if !line.trim().is_empty() => line,
            _ => return Ok(CorpusSnapshot::default()),
        };

        let metadata: CorpusMetadata = serde_json::from_str(header).map_err(|e| {
            DriftwatchError::Corpus(format!(
                "corrupt corpus header in {}: {e}",
                path.display()
            ))
        })?;

        let mut records = Vec::new();
        for (idx, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProbeResult>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // One bad line must not lose the whole corpus
                    warn!(
                        path = %path.display(),
                        line = idx + 2,
                        error = %e,
                        "Skipping unparseable corpus record"
                    );
                }
            }
        }

        Ok(CorpusSnapshot { records, metadata })
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

        let path = self.partition_path(root_target);
        let tmp = self
            .base_path
            .join(format!(".{}.tmp-{}", partition_slug(root_target), uuid::Uuid::new_v4()));

        let metadata = CorpusMetadata {
            session_id: Some(session_id.to_string()),
            record_count: records.len(),
            written_at: Some(Utc::now()),
        };

        let mut body = serde_json::to_string(&metadata)
            .map_err(|e| DriftwatchError::Corpus(format!("cannot encode corpus header: {e}")))?;
        body.push('\n');
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| {
                DriftwatchError::Corpus(format!(
                    "cannot encode corpus record {}: {e}",
                    record.input_url
                ))
            })?;
            body.push_str(&line);
            body.push('\n');
        }

        write_atomic(&tmp, &path, body.as_bytes()).await.map_err(|e| {
            DriftwatchError::Corpus(format!(
                "cannot write corpus partition {}: {e}",
                path.display()
            ))
        })?;

        debug!(
            root = %root_target,
            records = records.len(),
            session = %session_id,
            "Corpus partition replaced"
        );
        Ok(())
    }
}

async fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(tmp, bytes).await?;
    match tokio::fs::rename(tmp, dest).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(tmp).await;
            Err(e)
        }
    }
}
