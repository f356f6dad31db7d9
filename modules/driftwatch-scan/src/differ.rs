//! URL differ: classifies the current cycle's probes against the
//! historical corpus as new / existing / old and reconciles first-seen
//! timestamps.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use driftwatch_common::{
    canonicalize_url, DifferConfig, DriftwatchError, ProbeResult, UrlDiffResult, UrlStatus,
};
use driftwatch_corpus::Corpus;

/// Classifies one root target's current probes against its corpus.
pub struct UrlDiffer {
    config: DifferConfig,
    corpus: Arc<dyn Corpus>,
}

impl UrlDiffer {
    pub fn new(config: DifferConfig, corpus: Arc<dyn Corpus>) -> Self {
        Self { config, corpus }
    }

    /// Diff `current` against the historical corpus for `root_target`.
    ///
    /// On a corpus read failure every current URL is classified *new* and
    /// the cause lands in the result's `error` field; the corpus is
    /// rebuildable, so callers persist anyway.
    pub async fn diff(
        &self,
        current: Vec<ProbeResult>,
        root_target: &str,
        session_id: &str,
    ) -> Result<UrlDiffResult, DriftwatchError> {
        if root_target.trim().is_empty() {
            return Err(DriftwatchError::Validation(
                "differ called with empty root target".into(),
            ));
        }

        let current = KeyedRecords::build(current, &self.config, "current");

        let historical = match self.corpus.read_all(root_target).await {
            Ok(snapshot) => {
                // A snapshot written by this very session is residue from a
                // crashed earlier attempt; classifying against it would turn
                // freshly discovered URLs into "existing".
                if snapshot.metadata.session_id.as_deref() == Some(session_id) {
                    info!(
                        root = %root_target,
                        session = %session_id,
                        "Ignoring corpus snapshot written by the current session"
                    );
                    Vec::new()
                } else {
                    snapshot.records
                }
            }
            Err(e) => {
                warn!(root = %root_target, error = %e, "Corpus read failed, classifying all current URLs as new");
                return Ok(all_new(current, root_target, e.to_string()));
            }
        };

        let historical = KeyedRecords::build(historical, &self.config, "historical");

        let mut results = Vec::with_capacity(current.order.len() + historical.order.len());
        let mut new = 0usize;
        let mut existing = 0usize;
        let mut old = 0usize;

        for key in &current.order {
            let mut record = current.by_key[key].clone();
            match historical.by_key.get(key) {
                Some(prior) => {
                    record.url_status = UrlStatus::Existing;
                    record.oldest_scan_timestamp = match prior.oldest_scan_timestamp {
                        Some(prior_oldest) if prior_oldest <= record.timestamp => Some(prior_oldest),
                        _ => Some(record.timestamp),
                    };
                    existing += 1;
                }
                None => {
                    record.url_status = UrlStatus::New;
                    record.oldest_scan_timestamp = Some(record.timestamp);
                    new += 1;
                }
            }
            results.push(record);
        }

        // URLs that disappeared: carry the historical record verbatim so the
        // corpus remembers when each was last actually observed.
        for key in &historical.order {
            if current.by_key.contains_key(key) {
                continue;
            }
            let mut record = historical.by_key[key].clone();
            record.url_status = UrlStatus::Old;
            results.push(record);
            old += 1;
        }

        Ok(UrlDiffResult {
            root_target_url: root_target.to_string(),
            new,
            existing,
            old,
            results,
            error: None,
        })
    }
}

fn all_new(current: KeyedRecords, root_target: &str, error: String) -> UrlDiffResult {
    let mut results = Vec::with_capacity(current.order.len());
    for key in &current.order {
        let mut record = current.by_key[key].clone();
        record.url_status = UrlStatus::New;
        record.oldest_scan_timestamp = Some(record.timestamp);
        results.push(record);
    }
    UrlDiffResult {
        root_target_url: root_target.to_string(),
        new: results.len(),
        existing: 0,
        old: 0,
        results,
        error: Some(error),
    }
}

/// Records keyed for classification, with first-occurrence ordering kept so
/// diff output is deterministic.
struct KeyedRecords {
    order: Vec<String>,
    by_key: HashMap<String, ProbeResult>,
}

impl KeyedRecords {
    fn build(records: Vec<ProbeResult>, config: &DifferConfig, side: &str) -> Self {
        let mut order = Vec::with_capacity(records.len());
        let mut by_key: HashMap<String, ProbeResult> = HashMap::with_capacity(records.len());

        for record in records {
            if record.input_url.trim().is_empty() {
                warn!(side, "Skipping probe result with empty input URL");
                continue;
            }
            let key = diff_key(&record.input_url, config);
            if by_key.insert(key.clone(), record).is_some() {
                // Last write wins, position of the first occurrence kept
                warn!(side, key = %key, "Duplicate input URL in diff input");
            } else {
                order.push(key);
            }
        }

        Self { order, by_key }
    }
}

fn diff_key(input_url: &str, config: &DifferConfig) -> String {
    let mut key = if config.normalize_urls {
        canonicalize_url(input_url).unwrap_or_else(|_| input_url.trim().to_string())
    } else {
        input_url.trim().to_string()
    };
    if !config.case_sensitive {
        key = key.to_lowercase();
    }
    key
}
