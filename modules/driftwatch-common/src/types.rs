use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical probe subject: the URL as given plus its canonical form.
/// Equality and deduplication use the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub original_url: String,
    pub normalized_url: String,
}

impl Target {
    pub fn new(original_url: impl Into<String>, normalized_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            normalized_url: normalized_url.into(),
        }
    }
}

/// Classification of a URL relative to the historical corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    New,
    Existing,
    Old,
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Existing => write!(f, "existing"),
            Self::Old => write!(f, "old"),
        }
    }
}

/// One observation of one URL at one instant.
///
/// For URLs classified `old` the record is the historical one verbatim;
/// the current cycle never rewrites its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub input_url: String,
    pub final_url: Option<String>,
    /// The seed this URL is attributed to; partition key for the corpus.
    pub root_target_url: String,
    /// HTTP status code; 0 when no response was obtained.
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub web_server: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    pub asn: Option<u32>,
    pub asn_org: Option<String>,
    /// Response time in fractional seconds.
    pub duration_secs: f64,
    /// When this observation was made.
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub url_status: UrlStatus,
    /// First time this URL was ever observed under this root target.
    /// Invariant: `oldest_scan_timestamp <= timestamp` whenever set.
    pub oldest_scan_timestamp: Option<DateTime<Utc>>,
}

impl ProbeResult {
    /// A bare observation for a URL that has not been probed yet.
    pub fn new(input_url: impl Into<String>, root_target_url: impl Into<String>) -> Self {
        Self {
            input_url: input_url.into(),
            final_url: None,
            root_target_url: root_target_url.into(),
            status_code: 0,
            content_length: None,
            content_type: None,
            title: None,
            web_server: None,
            headers: HashMap::new(),
            body: None,
            technologies: Vec::new(),
            ip_addresses: Vec::new(),
            asn: None,
            asn_org: None,
            duration_secs: 0.0,
            timestamp: Utc::now(),
            error: None,
            url_status: UrlStatus::New,
            oldest_scan_timestamp: None,
        }
    }

    /// Synthesize an error observation so the differ still sees the URL
    /// in the current cycle.
    pub fn error_result(
        input_url: impl Into<String>,
        root_target_url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(input_url, root_target_url);
        result.error = Some(message.into());
        result
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..400).contains(&self.status_code)
    }
}

/// Per-root diff summary: every current URL classified, plus the
/// historical records for URLs that disappeared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlDiffResult {
    pub root_target_url: String,
    pub new: usize,
    pub existing: usize,
    pub old: usize,
    /// Invariant: `results.len() == new + existing + old` and each record's
    /// `url_status` matches the bucket it was counted in.
    pub results: Vec<ProbeResult>,
    /// Set when the historical corpus could not be read; the counts then
    /// reflect an all-new classification.
    pub error: Option<String>,
}

impl UrlDiffResult {
    pub fn total(&self) -> usize {
        self.new + self.existing + self.old
    }
}

impl fmt::Display for UrlDiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: new={} existing={} old={}",
            self.root_target_url, self.new, self.existing, self.old
        )
    }
}

/// Aggregated diff counters across every root target in a cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiffTotals {
    pub new: usize,
    pub existing: usize,
    pub old: usize,
}

impl DiffTotals {
    pub fn accumulate(&mut self, diff: &UrlDiffResult) {
        self.new += diff.new;
        self.existing += diff.existing;
        self.old += diff.old;
    }
}

impl fmt::Display for DiffTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "new={} existing={} old={}", self.new, self.existing, self.old)
    }
}

/// Probe-stage statistics for a cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProbeStats {
    pub discovered: usize,
    pub probed: usize,
    pub successful: usize,
    pub failed: usize,
}

impl fmt::Display for ProbeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discovered={} probed={} ok={} failed={}",
            self.discovered, self.probed, self.successful, self.failed
        )
    }
}

/// Terminal state of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Completed,
    Interrupted,
    Failed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What one cycle produced. Built by the workflow, enriched by the
/// scheduler (attempt count), handed by value to notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub session_id: String,
    pub target_source: String,
    pub target_count: usize,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub totals: DiffTotals,
    pub probe_stats: ProbeStats,
    pub report_paths: Vec<PathBuf>,
    pub errors: Vec<String>,
    /// Attempts consumed for this cycle; filled in by the scheduler.
    pub attempts: u32,
}

impl ScanSummary {
    pub fn started(session_id: impl Into<String>, target_source: impl Into<String>, target_count: usize) -> Self {
        Self {
            session_id: session_id.into(),
            target_source: target_source.into(),
            target_count,
            status: ScanStatus::Completed,
            started_at: Utc::now(),
            duration_secs: 0.0,
            totals: DiffTotals::default(),
            probe_stats: ProbeStats::default(),
            report_paths: Vec::new(),
            errors: Vec::new(),
            attempts: 0,
        }
    }

    /// Merge a batch summary into this one (batch mode).
    pub fn merge(&mut self, other: ScanSummary) {
        self.totals.new += other.totals.new;
        self.totals.existing += other.totals.existing;
        self.totals.old += other.totals.old;
        self.probe_stats.discovered += other.probe_stats.discovered;
        self.probe_stats.probed += other.probe_stats.probed;
        self.probe_stats.successful += other.probe_stats.successful;
        self.probe_stats.failed += other.probe_stats.failed;
        self.report_paths.extend(other.report_paths);
        self.errors.extend(other.errors);
        // Interrupted and Failed dominate Completed
        if other.status != ScanStatus::Completed {
            self.status = other.status;
        }
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session={} source={} targets={} status={} {} {} duration={:.1}s",
            self.session_id,
            self.target_source,
            self.target_count,
            self.status,
            self.totals,
            self.probe_stats,
            self.duration_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_worst_status() {
        let mut a = ScanSummary::started("s", "inline", 2);
        let mut b = ScanSummary::started("s", "inline", 2);
        b.status = ScanStatus::Interrupted;
        a.merge(b);
        assert_eq!(a.status, ScanStatus::Interrupted);

        let c = ScanSummary::started("s", "inline", 2);
        a.merge(c);
        assert_eq!(a.status, ScanStatus::Interrupted, "completed must not mask an interrupt");
    }

    #[test]
    fn diff_result_total_matches_counts() {
        let diff = UrlDiffResult {
            root_target_url: "http://example.com".into(),
            new: 2,
            existing: 1,
            old: 1,
            results: Vec::new(),
            error: None,
        };
        assert_eq!(diff.total(), 4);
    }
}
