//! Default probe engine: bounded-concurrency GET probes over reqwest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use driftwatch_common::ProbeResult;

use crate::traits::Prober;

const DEFAULT_USER_AGENT: &str = "DriftwatchBot/1.0";

/// Grace period for in-flight probes once cancellation fires.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Worker-pool prober. Every probed URL produces exactly one result; URLs
/// that fail or time out come back as error records with status 0.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
    threads: usize,
    user_agent: String,
    title_pattern: Regex,
}

impl HttpProber {
    pub fn new(client: reqwest::Client, timeout: Duration, threads: usize) -> Self {
        Self {
            client,
            timeout,
            threads: threads.max(1),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            title_pattern: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static pattern"),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, urls: &[String], cancel: &CancellationToken) -> Vec<ProbeResult> {
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut set: JoinSet<ProbeResult> = JoinSet::new();

        for url in urls {
            let semaphore = semaphore.clone();
            let worker = ProbeWorker {
                client: self.client.clone(),
                timeout: self.timeout,
                user_agent: self.user_agent.clone(),
                title_pattern: self.title_pattern.clone(),
            };
            let url = url.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                worker.probe_one(&url).await
            });
        }

        let mut results = Vec::with_capacity(urls.len());
        loop {
            tokio::select! {
                next = set.join_next() => match next {
                    Some(Ok(result)) => results.push(result),
                    Some(Err(e)) => warn!(error = %e, "Probe task failed"),
                    None => break,
                },
                _ = cancel.cancelled() => {
                    warn!(
                        collected = results.len(),
                        pending = set.len(),
                        "Probe cancelled, granting in-flight work a grace period"
                    );
                    drain_with_grace(&mut set, &mut results).await;
                    break;
                }
            }
        }

        results
    }
}

/// Collect what finishes within the grace window, then abandon the rest.
async fn drain_with_grace(set: &mut JoinSet<ProbeResult>, results: &mut Vec<ProbeResult>) {
    let deadline = tokio::time::Instant::now() + CANCEL_GRACE;
    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(result))) => results.push(result),
            Ok(Some(Err(_))) => {}
            Ok(None) => return,
            Err(_) => break,
        }
    }
    set.abort_all();
    while let Some(outcome) = set.join_next().await {
        if let Ok(result) = outcome {
            results.push(result);
        }
    }
}

/// Owned state for one spawned probe.
struct ProbeWorker {
    client: reqwest::Client,
    timeout: Duration,
    user_agent: String,
    title_pattern: Regex,
}

impl ProbeWorker {
    async fn probe_one(&self, url: &str) -> ProbeResult {
        let mut result = ProbeResult::new(url, "");
        let started = Instant::now();

        let request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send();

        let response = match request.await {
            Ok(response) => response,
            Err(e) => {
                result.duration_secs = started.elapsed().as_secs_f64();
                result.error = Some(e.to_string());
                return result;
            }
        };

        result.status_code = response.status().as_u16();
        result.final_url = Some(response.url().to_string());

        let mut headers = HashMap::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_string());
            }
        }
        result.content_type = headers.get("content-type").cloned();
        result.content_length = headers.get("content-length").and_then(|v| v.parse().ok());
        result.web_server = headers.get("server").cloned();
        result.technologies = detect_technologies(&headers);
        result.headers = headers;

        let is_html = result
            .content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);
        if is_html {
            match response.text().await {
                Ok(body) => {
                    result.title = self
                        .title_pattern
                        .captures(&body)
                        .and_then(|cap| cap.get(1))
                        .map(|m| m.as_str().trim().to_string());
                    if result.content_length.is_none() {
                        result.content_length = Some(body.len() as u64);
                    }
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Could not read response body");
                }
            }
        }

        result.ip_addresses = resolve_addresses(url).await;
        result.duration_secs = started.elapsed().as_secs_f64();
        result
    }
}

/// Best-effort DNS resolution for the probed host. Failures leave the
/// address list empty rather than failing the probe.
async fn resolve_addresses(url: &str) -> Vec<String> {
    let Ok(parsed) = url::Url::parse(url) else {
        return Vec::new();
    };
    let Some(host) = parsed.host_str().map(|h| h.to_string()) else {
        return Vec::new();
    };
    let port = parsed.port_or_known_default().unwrap_or(80);

    match tokio::net::lookup_host((host, port)).await {
        Ok(addresses) => {
            let mut ips: Vec<String> = addresses.map(|a| a.ip().to_string()).collect();
            ips.sort();
            ips.dedup();
            ips
        }
        Err(_) => Vec::new(),
    }
}

/// Cheap header-based technology hints.
fn detect_technologies(headers: &HashMap<String, String>) -> Vec<String> {
    let mut technologies = Vec::new();
    if let Some(powered_by) = headers.get("x-powered-by") {
        technologies.push(powered_by.clone());
    }
    if let Some(generator) = headers.get("x-generator") {
        technologies.push(generator.clone());
    }
    technologies
}
