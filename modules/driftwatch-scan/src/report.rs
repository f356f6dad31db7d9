//! HTML report rendering for one session's diff results.

use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use driftwatch_common::{DriftwatchError, UrlDiffResult, UrlStatus};

use crate::traits::Reporter;

/// Writes one self-contained HTML artifact per session, named
/// `{session_id}_automated_report.html`.
pub struct HtmlReporter {
    output_dir: PathBuf,
}

impl HtmlReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn render(&self, session_id: &str, diffs: &[UrlDiffResult]) -> String {
        let (mut new, mut existing, mut old) = (0, 0, 0);
        for diff in diffs {
            new += diff.new;
            existing += diff.existing;
            old += diff.old;
        }

        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Driftwatch report {session}</title>\n\
             <style>\n\
             body {{ font-family: sans-serif; margin: 2em; }}\n\
             table {{ border-collapse: collapse; width: 100%; margin-bottom: 2em; }}\n\
             th, td {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; }}\n\
             .new {{ color: #1a7f37; }} .existing {{ color: #57606a; }} .old {{ color: #cf222e; }}\n\
             </style>\n</head>\n<body>\n\
             <h1>Scan {session}</h1>\n\
             <p>new: {new} &middot; existing: {existing} &middot; old: {old}</p>\n",
            session = escape(session_id),
        );

        for diff in diffs {
            let _ = write!(
                html,
                "<h2>{root}</h2>\n<p>new: {new} &middot; existing: {existing} &middot; old: {old}</p>\n",
                root = escape(&diff.root_target_url),
                new = diff.new,
                existing = diff.existing,
                old = diff.old,
            );
            if let Some(error) = &diff.error {
                let _ = write!(html, "<p class=\"old\">corpus error: {}</p>\n", escape(error));
            }
            html.push_str(
                "<table>\n<tr><th>URL</th><th>Status</th><th>Code</th><th>Title</th><th>First seen</th></tr>\n",
            );
            for record in &diff.results {
                let class = match record.url_status {
                    UrlStatus::New => "new",
                    UrlStatus::Existing => "existing",
                    UrlStatus::Old => "old",
                };
                let _ = write!(
                    html,
                    "<tr><td>{url}</td><td class=\"{class}\">{status}</td><td>{code}</td><td>{title}</td><td>{first}</td></tr>\n",
                    url = escape(&record.input_url),
                    status = record.url_status,
                    code = record.status_code,
                    title = escape(record.title.as_deref().unwrap_or("")),
                    first = record
                        .oldest_scan_timestamp
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                );
            }
            html.push_str("</table>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

#[async_trait]
impl Reporter for HtmlReporter {
    async fn generate(
        &self,
        session_id: &str,
        diffs: &[UrlDiffResult],
    ) -> Result<Vec<PathBuf>, DriftwatchError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                DriftwatchError::Report(format!(
                    "cannot create report directory {}: {e}",
                    self.output_dir.display()
                ))
            })?;

        let path = self
            .output_dir
            .join(format!("{session_id}_automated_report.html"));
        let html = self.render(session_id, diffs);

        tokio::fs::write(&path, html).await.map_err(|e| {
            DriftwatchError::Report(format!("cannot write report {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), "Report written");
        Ok(vec![path])
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
