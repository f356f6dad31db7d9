//! End-to-end workflow tests over scripted collaborators and the
//! in-memory corpus.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use driftwatch_common::{
    DifferConfig, DriftwatchError, ProbeResult, ScanStatus, Target, UrlDiffResult, UrlStatus,
    WorkflowConfig,
};
use driftwatch_corpus::MemoryCorpus;
use driftwatch_scan::{Crawler, Prober, Reporter, ScanWorkflow, UrlDiffer};

const SESSION: &str = "20260801-120000";

fn target(url: &str) -> Target {
    Target::new(url, driftwatch_common::canonicalize_url(url).unwrap())
}

/// Crawler that returns a fixed URL list.
struct ScriptedCrawler {
    urls: Vec<String>,
}

#[async_trait]
impl Crawler for ScriptedCrawler {
    async fn crawl(
        &self,
        _seeds: &[Target],
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>, DriftwatchError> {
        Ok(self.urls.clone())
    }
}

/// Prober that answers every URL except the ones it is told to drop.
/// Optionally cancels the token after responding, to simulate a stop
/// signal landing right at the probe/persist boundary.
struct ScriptedProber {
    drop_urls: Vec<String>,
    cancel_after: bool,
}

impl ScriptedProber {
    fn answering_all() -> Self {
        Self {
            drop_urls: Vec::new(),
            cancel_after: false,
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, urls: &[String], cancel: &CancellationToken) -> Vec<ProbeResult> {
        let results = urls
            .iter()
            .filter(|url| !self.drop_urls.contains(url))
            .map(|url| {
                let mut result = ProbeResult::new(url.clone(), "");
                result.status_code = 200;
                result
            })
            .collect();
        if self.cancel_after {
            cancel.cancel();
        }
        results
    }
}

/// Reporter that records invocations.
#[derive(Default)]
struct CollectingReporter {
    calls: AtomicUsize,
    last_diffs: Mutex<Vec<UrlDiffResult>>,
}

#[async_trait]
impl Reporter for CollectingReporter {
    async fn generate(
        &self,
        session_id: &str,
        diffs: &[UrlDiffResult],
    ) -> Result<Vec<PathBuf>, DriftwatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_diffs.lock().unwrap() = diffs.to_vec();
        Ok(vec![PathBuf::from(format!(
            "{session_id}_automated_report.html"
        ))])
    }
}

struct Fixture {
    workflow: ScanWorkflow,
    corpus: Arc<MemoryCorpus>,
    reporter: Arc<CollectingReporter>,
}

fn fixture(crawled: Vec<String>, prober: ScriptedProber, config: WorkflowConfig) -> Fixture {
    let corpus = Arc::new(MemoryCorpus::new());
    let reporter = Arc::new(CollectingReporter::default());
    let differ = UrlDiffer::new(DifferConfig::default(), corpus.clone());
    let workflow = ScanWorkflow::new(
        config,
        Arc::new(ScriptedCrawler { urls: crawled }),
        Arc::new(prober),
        differ,
        corpus.clone(),
        reporter.clone(),
    );
    Fixture {
        workflow,
        corpus,
        reporter,
    }
}

#[tokio::test]
async fn pipeline_persists_classified_union_per_root() {
    let seeds = vec![target("http://a.example"), target("http://b.example")];
    let fx = fixture(
        vec![
            "http://a.example/page".to_string(),
            "http://b.example/page".to_string(),
        ],
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );

    let summary = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, ScanStatus::Completed);
    assert_eq!(summary.totals.new, 4, "two seeds and two crawled pages, all new");
    assert_eq!(fx.corpus.partition_count(), 2);

    let a_records = fx.corpus.records("http://a.example/");
    assert_eq!(a_records.len(), 2);
    assert!(a_records.iter().all(|r| r.url_status == UrlStatus::New));
    assert!(a_records.iter().all(|r| r.root_target_url == "http://a.example/"));
    assert_eq!(fx.reporter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.report_paths.len(), 1);
}

#[tokio::test]
async fn unprobed_urls_are_synthesized_as_error_records() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        vec!["http://a.example/missing".to_string()],
        ScriptedProber {
            drop_urls: vec!["http://a.example/missing".to_string()],
            cancel_after: false,
        },
        WorkflowConfig::default(),
    );

    let summary = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.probe_stats.discovered, 2);
    assert_eq!(summary.probe_stats.probed, 2);
    assert_eq!(summary.probe_stats.failed, 1);

    let records = fx.corpus.records("http://a.example/");
    let missing = records
        .iter()
        .find(|r| r.input_url == "http://a.example/missing")
        .expect("the unprobed URL must still reach the corpus");
    assert_eq!(missing.status_code, 0);
    assert!(missing.error.is_some());
}

#[tokio::test]
async fn cancellation_at_commit_point_leaves_corpus_untouched() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        vec!["http://a.example/page".to_string()],
        ScriptedProber {
            drop_urls: Vec::new(),
            cancel_after: true,
        },
        WorkflowConfig::default(),
    );

    let summary = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, ScanStatus::Interrupted);
    assert_eq!(summary.probe_stats.probed, 2, "probe stats survive the interrupt");
    assert_eq!(fx.corpus.partition_count(), 0, "nothing persisted before the commit point");
    assert_eq!(fx.reporter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn already_cancelled_token_interrupts_immediately() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        Vec::new(),
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.status, ScanStatus::Interrupted);
    assert_eq!(summary.probe_stats.probed, 0);
    assert_eq!(fx.corpus.partition_count(), 0);
}

#[tokio::test]
async fn batch_mode_merges_summaries_and_reports_once() {
    let seeds = vec![
        target("http://a.example"),
        target("http://b.example"),
        target("http://c.example"),
    ];
    let config = WorkflowConfig {
        batch_size_threshold: 1,
        ..Default::default()
    };
    let fx = fixture(Vec::new(), ScriptedProber::answering_all(), config);

    let summary = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, ScanStatus::Completed);
    assert_eq!(summary.target_count, 3);
    assert_eq!(summary.totals.new, 3);
    assert_eq!(fx.corpus.partition_count(), 3);
    assert_eq!(
        fx.reporter.calls.load(Ordering::SeqCst),
        1,
        "one report per session regardless of batching"
    );
    assert_eq!(fx.reporter.last_diffs.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn corpus_write_failure_is_fatal_to_the_cycle() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        Vec::new(),
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );
    fx.corpus.fail_writes(true);

    let err = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DriftwatchError::Corpus(_)));
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn corpus_read_failure_degrades_but_still_persists() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        Vec::new(),
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );

    // Reads fail, writes succeed: the corpus is rebuilt from current data
    fx.corpus.fail_reads(true);

    let summary = fx
        .workflow
        .execute(SESSION, "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, ScanStatus::Completed);
    assert!(summary.errors.iter().any(|e| e.contains("corpus read failed")));

    fx.corpus.fail_reads(false);
    let records = fx.corpus.records("http://a.example/");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url_status, UrlStatus::New);
}

#[tokio::test]
async fn oldest_scan_timestamp_survives_cycles_unchanged() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        vec!["http://a.example/page".to_string()],
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );

    fx.workflow
        .execute("20260801-120000", "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    let first_cycle: std::collections::HashMap<String, _> = fx
        .corpus
        .records("http://a.example/")
        .into_iter()
        .map(|r| (r.input_url.clone(), r.oldest_scan_timestamp))
        .collect();

    // Two more cycles over the same URLs
    for session in ["20260801-130000", "20260801-140000"] {
        fx.workflow
            .execute(session, "inline", &seeds, &CancellationToken::new())
            .await
            .unwrap();
    }

    for record in fx.corpus.records("http://a.example/") {
        assert_eq!(record.url_status, UrlStatus::Existing);
        assert_eq!(
            record.oldest_scan_timestamp, first_cycle[&record.input_url],
            "first-seen must not move for {}",
            record.input_url
        );
        let oldest = record.oldest_scan_timestamp.unwrap();
        assert!(oldest <= record.timestamp);
    }
}

#[tokio::test]
async fn disappeared_url_survives_in_corpus_as_old() {
    let seeds = vec![target("http://a.example")];

    // First cycle sees an extra page
    let fx = fixture(
        vec!["http://a.example/page".to_string()],
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );
    fx.workflow
        .execute("20260801-120000", "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    let first_page = fx
        .corpus
        .records("http://a.example/")
        .into_iter()
        .find(|r| r.input_url == "http://a.example/page")
        .unwrap();

    // Second cycle: the page is gone, only the seed answers
    let corpus = fx.corpus.clone();
    let reporter = Arc::new(CollectingReporter::default());
    let differ = UrlDiffer::new(DifferConfig::default(), corpus.clone());
    let workflow = ScanWorkflow::new(
        WorkflowConfig::default(),
        Arc::new(ScriptedCrawler { urls: Vec::new() }),
        Arc::new(ScriptedProber::answering_all()),
        differ,
        corpus.clone(),
        reporter,
    );
    let summary = workflow
        .execute("20260801-130000", "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.totals.old, 1);
    assert_eq!(summary.totals.existing, 1);

    let page = corpus
        .records("http://a.example/")
        .into_iter()
        .find(|r| r.input_url == "http://a.example/page")
        .expect("old URL stays in the corpus");
    assert_eq!(page.url_status, UrlStatus::Old);
    // The historical observation is preserved verbatim
    assert_eq!(page.timestamp, first_page.timestamp);
    assert_eq!(page.oldest_scan_timestamp, first_page.oldest_scan_timestamp);
}

#[tokio::test]
async fn second_cycle_classifies_against_first() {
    let seeds = vec![target("http://a.example")];
    let fx = fixture(
        vec!["http://a.example/page".to_string()],
        ScriptedProber::answering_all(),
        WorkflowConfig::default(),
    );

    fx.workflow
        .execute("20260801-120000", "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    // Same URLs, later session: everything becomes existing
    let summary = fx
        .workflow
        .execute("20260801-130000", "inline", &seeds, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.totals.existing, 2);
    assert_eq!(summary.totals.new, 0);
    assert_eq!(summary.totals.old, 0);
}
