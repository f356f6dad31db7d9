use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Terminal (or in-flight) state of a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Started,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STARTED" => Some(Self::Started),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row from the scan_history table.
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub id: i64,
    pub scan_session_id: String,
    pub target_source: String,
    pub num_targets: i64,
    pub scan_start_time: DateTime<Utc>,
    pub scan_end_time: Option<DateTime<Utc>>,
    pub status: CycleStatus,
    pub log_summary: Option<String>,
    pub report_file_path: Option<String>,
    pub new_urls: i64,
    pub old_urls: i64,
    pub existing_urls: i64,
}

/// Parameters for closing out a cycle row. Written exactly once per cycle.
#[derive(Debug, Clone)]
pub struct CycleCompletion {
    pub end_time: DateTime<Utc>,
    pub status: CycleStatus,
    pub log_summary: String,
    pub new_urls: i64,
    pub old_urls: i64,
    pub existing_urls: i64,
    pub report_file_path: Option<PathBuf>,
}
