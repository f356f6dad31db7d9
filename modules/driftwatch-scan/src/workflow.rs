//! Scan workflow: one end-to-end pipeline per session of crawl, probe,
//! diff per root target, persist, report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftwatch_common::{
    DriftwatchError, ProbeResult, ScanStatus, ScanSummary, Target, UrlDiffResult, WorkflowConfig,
};
use driftwatch_corpus::Corpus;

use crate::differ::UrlDiffer;
use crate::traits::{Crawler, Prober, Reporter};

/// Composes crawler, prober, differ, corpus, and reporter into a single
/// cancellable pipeline. Cancellation is checked before every stage and
/// between iterations of the per-root persistence loop; records already
/// persisted stay persisted.
pub struct ScanWorkflow {
    config: WorkflowConfig,
    crawler: Arc<dyn Crawler>,
    prober: Arc<dyn Prober>,
    differ: UrlDiffer,
    corpus: Arc<dyn Corpus>,
    reporter: Arc<dyn Reporter>,
}

impl ScanWorkflow {
    pub fn new(
        config: WorkflowConfig,
        crawler: Arc<dyn Crawler>,
        prober: Arc<dyn Prober>,
        differ: UrlDiffer,
        corpus: Arc<dyn Corpus>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            crawler,
            prober,
            differ,
            corpus,
            reporter,
        }
    }

    /// Run one session. Returns Ok with an `interrupted` summary on
    /// cancellation; Err only for failures that should trigger a retry.
    pub async fn execute(
        &self,
        session_id: &str,
        source_label: &str,
        seeds: &[Target],
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, DriftwatchError> {
        let started = Instant::now();
        let mut summary = ScanSummary::started(session_id, source_label, seeds.len());
        let mut all_diffs: Vec<UrlDiffResult> = Vec::new();

        let threshold = self.config.batch_size_threshold;
        let batches: Vec<&[Target]> = if threshold > 0 && seeds.len() > threshold {
            info!(
                session = %session_id,
                seeds = seeds.len(),
                batch_size = threshold,
                "Batch mode: subdividing seeds"
            );
            seeds.chunks(threshold).collect()
        } else {
            vec![seeds]
        };

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.status = ScanStatus::Interrupted;
                break;
            }
            debug!(session = %session_id, batch = index, targets = batch.len(), "Running batch");
            let (batch_summary, diffs) = self.run_batch(session_id, source_label, batch, cancel).await?;
            all_diffs.extend(diffs);
            summary.merge(batch_summary);
        }

        // One report per session, across all batches
        if summary.status != ScanStatus::Interrupted && !all_diffs.is_empty() {
            match self.reporter.generate(session_id, &all_diffs).await {
                Ok(paths) => summary.report_paths = paths,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Report generation failed");
                    summary.errors.push(format!("report generation failed: {e}"));
                }
            }
        }

        summary.target_count = seeds.len();
        summary.duration_secs = started.elapsed().as_secs_f64();
        info!(session = %session_id, "Scan workflow finished. {summary}");
        Ok(summary)
    }

    async fn run_batch(
        &self,
        session_id: &str,
        source_label: &str,
        seeds: &[Target],
        cancel: &CancellationToken,
    ) -> Result<(ScanSummary, Vec<UrlDiffResult>), DriftwatchError> {
        let mut summary = ScanSummary::started(session_id, source_label, seeds.len());
        let mut diffs: Vec<UrlDiffResult> = Vec::new();

        // Stage 1: crawl
        if cancel.is_cancelled() {
            summary.status = ScanStatus::Interrupted;
            return Ok((summary, diffs));
        }
        let discovered = if seeds.is_empty() {
            info!(session = %session_id, "No seeds, skipping crawl");
            Vec::new()
        } else {
            self.crawl_stage(session_id, seeds, cancel, &mut summary).await
        };
        summary.probe_stats.discovered = discovered.len();

        // Stage 2: probe
        if cancel.is_cancelled() {
            summary.status = ScanStatus::Interrupted;
            return Ok((summary, diffs));
        }
        let probes = self.probe_stage(session_id, &discovered, cancel, &mut summary).await;

        // Commit point: everything after this touches the corpus.
        if cancel.is_cancelled() {
            summary.status = ScanStatus::Interrupted;
            return Ok((summary, diffs));
        }

        // Stage 3: root assignment
        let grouped = group_by_root(probes, seeds);

        // Stage 4: diff and persist, one root at a time
        for (root, records) in grouped {
            if cancel.is_cancelled() {
                summary.status = ScanStatus::Interrupted;
                return Ok((summary, diffs));
            }

            let diff = self.differ.diff(records, &root, session_id).await?;

            if let Some(cause) = &diff.error {
                // Degraded diff: the corpus read failed and every current URL
                // was classified new. Persisting rebuilds the corpus.
                warn!(session = %session_id, root = %root, cause = %cause, "Proceeding with degraded diff");
                summary.errors.push(format!("corpus read failed for {root}: {cause}"));
            }

            match self.corpus.write(cancel, &diff.results, session_id, &root).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    summary.status = ScanStatus::Interrupted;
                    return Ok((summary, diffs));
                }
                Err(e) => {
                    // Corpus write failure is fatal to the cycle
                    return Err(DriftwatchError::Corpus(format!(
                        "failed to persist corpus for {root}: {e}"
                    )));
                }
            }

            info!(session = %session_id, "{diff}");
            summary.totals.accumulate(&diff);
            diffs.push(diff);
        }

        Ok((summary, diffs))
    }

    async fn crawl_stage(
        &self,
        session_id: &str,
        seeds: &[Target],
        cancel: &CancellationToken,
        summary: &mut ScanSummary,
    ) -> Vec<String> {
        let crawl = self.crawler.crawl(seeds, cancel);
        let outcome = tokio::time::timeout(self.config.crawler_timeout, crawl).await;

        let mut discovered: Vec<String> = seeds.iter().map(|s| s.normalized_url.clone()).collect();
        match outcome {
            Ok(Ok(urls)) => {
                debug!(session = %session_id, count = urls.len(), "Crawl discovered URLs");
                discovered.extend(urls);
            }
            Ok(Err(e)) => {
                warn!(session = %session_id, error = %e, "Crawl failed, probing seeds only");
                summary.errors.push(format!("crawl failed: {e}"));
            }
            Err(_) => {
                warn!(
                    session = %session_id,
                    timeout_secs = self.config.crawler_timeout.as_secs(),
                    "Crawl timed out, probing what we have"
                );
                summary.errors.push("crawl timed out".to_string());
            }
        }

        // Seeds and crawl output can overlap
        let mut seen = std::collections::HashSet::new();
        discovered.retain(|url| seen.insert(url.clone()));
        discovered
    }

    async fn probe_stage(
        &self,
        session_id: &str,
        discovered: &[String],
        cancel: &CancellationToken,
        summary: &mut ScanSummary,
    ) -> Vec<ProbeResult> {
        let mut probes = self.prober.probe(discovered, cancel).await;

        // Every discovered URL must reach the differ; synthesize error
        // records for anything the probe engine dropped.
        let probed: std::collections::HashSet<&str> =
            probes.iter().map(|p| p.input_url.as_str()).collect();
        let missing: Vec<&String> = discovered
            .iter()
            .filter(|url| !probed.contains(url.as_str()))
            .collect();
        for url in missing {
            debug!(session = %session_id, url = %url, "Synthesizing error result for unprobed URL");
            probes.push(ProbeResult::error_result(url.clone(), "", "no probe result"));
        }

        summary.probe_stats.probed = probes.len();
        summary.probe_stats.successful = probes.iter().filter(|p| p.is_success()).count();
        summary.probe_stats.failed = probes.len() - summary.probe_stats.successful;
        probes
    }
}

/// Attribute each probe to a root target by longest containment match
/// against the seed list; ties and misses go to the first matching (or
/// first overall) seed. Groups come back in seed order.
fn group_by_root(probes: Vec<ProbeResult>, seeds: &[Target]) -> Vec<(String, Vec<ProbeResult>)> {
    let mut groups: HashMap<String, Vec<ProbeResult>> = HashMap::new();

    for mut probe in probes {
        let root = match assign_root(&probe.input_url, seeds) {
            Some(root) => root,
            None => match seeds.first() {
                Some(first) => {
                    debug!(url = %probe.input_url, "No seed contains URL, attributing to first seed");
                    first.normalized_url.clone()
                }
                None => continue,
            },
        };
        probe.root_target_url = root.clone();
        groups.entry(root).or_default().push(probe);
    }

    // Deterministic order: seeds first, then any stragglers
    let mut ordered = Vec::with_capacity(groups.len());
    for seed in seeds {
        if let Some(records) = groups.remove(&seed.normalized_url) {
            ordered.push((seed.normalized_url.clone(), records));
        }
    }
    let mut rest: Vec<_> = groups.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    ordered.extend(rest);
    ordered
}

fn assign_root(url: &str, seeds: &[Target]) -> Option<String> {
    let parsed = url::Url::parse(url).ok();
    let host = parsed.as_ref().and_then(|u| u.host_str());

    let mut best: Option<(usize, &Target)> = None;
    for seed in seeds {
        let score = containment_score(url, host, seed);
        if let Some(score) = score {
            // Strictly-greater keeps the first seed on ties
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, seed));
            }
        }
    }
    best.map(|(_, seed)| seed.normalized_url.clone())
}

/// Longest-prefix containment: a URL belongs to a seed if the seed's
/// canonical form is a prefix of it, or failing that if the hosts match
/// (including subdomains). Longer matches are more specific.
fn containment_score(url: &str, host: Option<&str>, seed: &Target) -> Option<usize> {
    let seed_url = seed.normalized_url.as_str();
    if let Some(rest) = url.strip_prefix(seed_url) {
        // Path-boundary check so /app does not claim /apple
        if seed_url.ends_with('/')
            || rest.is_empty()
            || rest.starts_with('/')
            || rest.starts_with('?')
        {
            return Some(1000 + seed_url.len());
        }
    }
    let seed_host = url::Url::parse(seed_url).ok()?.host_str()?.to_string();
    let host = host?;
    if host == seed_host || host.ends_with(&format!(".{seed_host}")) {
        return Some(seed_host.len());
    }
    None
}
