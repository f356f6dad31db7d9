use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use driftwatch_common::ScanSummary;

use super::backend::Notifier;

/// Incoming-webhook notification backend (Slack-compatible payload).
pub struct WebhookNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned non-success");
            anyhow::bail!("webhook returned {status}");
        }

        Ok(())
    }

    fn text_payload(text: String) -> serde_json::Value {
        json!({
            "text": text,
            "unfurl_links": false,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn on_scan_start(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        let text = format!(
            ":mag: *Driftwatch scan started*\n\
             *Session:* `{}`\n\
             *Source:* {}\n\
             *Targets:* {}",
            summary.session_id, summary.target_source, summary.target_count,
        );
        self.post(Self::text_payload(text)).await
    }

    async fn on_scan_complete(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        let mut lines = vec![
            ":white_check_mark: *Driftwatch scan complete*".to_string(),
            format!("*Session:* `{}`", summary.session_id),
            format!(
                "*URLs:* {} new, {} existing, {} old",
                summary.totals.new, summary.totals.existing, summary.totals.old
            ),
            format!("*Duration:* {:.0}s", summary.duration_secs),
        ];
        for path in &summary.report_paths {
            lines.push(format!("*Report:* {}", path.display()));
        }
        if !summary.errors.is_empty() {
            lines.push(format!("*Warnings:* {}", summary.errors.join("; ")));
        }
        self.post(Self::text_payload(lines.join("\n"))).await
    }

    async fn on_scan_interrupt(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        let text = format!(
            ":octagonal_sign: *Driftwatch scan interrupted*\n\
             *Session:* `{}`\n\
             *Collected before stop:* {} new, {} existing, {} old",
            summary.session_id, summary.totals.new, summary.totals.existing, summary.totals.old,
        );
        self.post(Self::text_payload(text)).await
    }

    async fn on_scan_failure(&self, summary: &ScanSummary) -> anyhow::Result<()> {
        let text = format!(
            ":rotating_light: *Driftwatch scan failed*\n\
             *Session:* `{}`\n\
             *Attempts:* {}\n\
             *Errors:* {}",
            summary.session_id,
            summary.attempts,
            if summary.errors.is_empty() {
                "unknown".to_string()
            } else {
                summary.errors.join("; ")
            },
        );
        self.post(Self::text_payload(text)).await
    }
}
