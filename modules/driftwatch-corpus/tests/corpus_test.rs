//! Round-trip tests for the JSONL corpus.

use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use driftwatch_common::ProbeResult;
use driftwatch_corpus::{Corpus, JsonlCorpus};

fn probe(url: &str, root: &str) -> ProbeResult {
    let mut p = ProbeResult::new(url, root);
    p.status_code = 200;
    p.title = Some("Home".into());
    p.oldest_scan_timestamp = Some(p.timestamp);
    p
}

#[tokio::test]
async fn write_then_read_returns_same_records() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonlCorpus::new(dir.path()).unwrap();
    let root = "http://example.com";
    let cancel = CancellationToken::new();

    let records = vec![
        probe("http://example.com/a", root),
        probe("http://example.com/b", root),
    ];
    corpus.write(&cancel, &records, "20260801-010203", root).await.unwrap();

    let snapshot = corpus.read_all(root).await.unwrap();
    assert_eq!(snapshot.records.len(), 2);
    assert_eq!(snapshot.metadata.session_id.as_deref(), Some("20260801-010203"));
    assert_eq!(snapshot.metadata.record_count, 2);

    let mut urls: Vec<_> = snapshot.records.iter().map(|r| r.input_url.as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec!["http://example.com/a", "http://example.com/b"]);
}

#[tokio::test]
async fn missing_partition_reads_empty() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonlCorpus::new(dir.path()).unwrap();

    let snapshot = corpus.read_all("http://never-written.example").await.unwrap();
    assert!(snapshot.records.is_empty());
    assert!(snapshot.metadata.session_id.is_none());
}

#[tokio::test]
async fn write_replaces_prior_snapshot() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonlCorpus::new(dir.path()).unwrap();
    let root = "http://example.com";
    let cancel = CancellationToken::new();

    corpus
        .write(&cancel, &[probe("http://example.com/old", root)], "s1", root)
        .await
        .unwrap();
    corpus
        .write(&cancel, &[probe("http://example.com/new", root)], "s2", root)
        .await
        .unwrap();

    let snapshot = corpus.read_all(root).await.unwrap();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].input_url, "http://example.com/new");
    assert_eq!(snapshot.metadata.session_id.as_deref(), Some("s2"));
}

#[tokio::test]
async fn roots_are_separate_partitions() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonlCorpus::new(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    corpus
        .write(&cancel, &[probe("http://a.example/x", "http://a.example")], "s1", "http://a.example")
        .await
        .unwrap();
    corpus
        .write(&cancel, &[probe("https://a.example/y", "https://a.example")], "s1", "https://a.example")
        .await
        .unwrap();

    // Scheme distinguishes partitions
    let http = corpus.read_all("http://a.example").await.unwrap();
    let https = corpus.read_all("https://a.example").await.unwrap();
    assert_eq!(http.records[0].input_url, "http://a.example/x");
    assert_eq!(https.records[0].input_url, "https://a.example/y");
}

#[tokio::test]
async fn cancelled_write_is_refused() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonlCorpus::new(dir.path()).unwrap();
    let root = "http://example.com";

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = corpus
        .write(&cancel, &[probe("http://example.com/a", root)], "s1", root)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    // Nothing was persisted
    let snapshot = corpus.read_all(root).await.unwrap();
    assert!(snapshot.records.is_empty());
}

#[tokio::test]
async fn timestamps_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonlCorpus::new(dir.path()).unwrap();
    let root = "http://example.com";
    let cancel = CancellationToken::new();

    let mut record = probe("http://example.com/a", root);
    let before = Utc::now();
    record.oldest_scan_timestamp = Some(before);
    corpus.write(&cancel, &[record.clone()], "s1", root).await.unwrap();

    let snapshot = corpus.read_all(root).await.unwrap();
    let read = &snapshot.records[0];
    assert_eq!(
        read.oldest_scan_timestamp.unwrap().timestamp_micros(),
        before.timestamp_micros()
    );
    assert_eq!(read.timestamp.timestamp_micros(), record.timestamp.timestamp_micros());
}
