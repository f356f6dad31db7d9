//! Default crawler: BFS link-following over the seeds' hosts.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use driftwatch_common::{canonicalize_url, DriftwatchError, Target};

use crate::traits::Crawler;

const DEFAULT_USER_AGENT: &str = "DriftwatchBot/1.0";

/// HTTP crawler with BFS link-following, same-host scoping, and per-request
/// politeness delay. Cancellation is honored between fetches; whatever was
/// discovered so far is returned.
pub struct HttpCrawler {
    client: reqwest::Client,
    user_agent: String,
    rate_limit: Duration,
    max_depth: usize,
    max_pages: usize,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    href_pattern: Regex,
}

impl HttpCrawler {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit: Duration::from_millis(200),
            max_depth: 3,
            max_pages: 200,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            href_pattern: Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("static pattern"),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Only follow links whose path contains one of these substrings.
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Self {
        self.include_patterns = patterns;
        self
    }

    /// Never follow links whose path contains one of these substrings.
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Check if a discovered link should be kept based on path patterns.
    fn should_follow(&self, url: &Url) -> bool {
        let path = url.path();

        if !self.include_patterns.is_empty() {
            let matches = self.include_patterns.iter().any(|p| path.contains(p.as_str()));
            if !matches {
                return false;
            }
        }

        if !self.exclude_patterns.is_empty() {
            let excluded = self.exclude_patterns.iter().any(|p| path.contains(p.as_str()));
            if excluded {
                return false;
            }
        }

        true
    }

    /// Extract candidate links from HTML, resolved against the page URL.
    fn extract_links(&self, base_url: &Url, html: &str) -> Vec<Url> {
        let mut links = Vec::new();
        for cap in self.href_pattern.captures_iter(html) {
            if let Some(href) = cap.get(1) {
                let href = href.as_str();
                if href.starts_with('#')
                    || href.starts_with("javascript:")
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:")
                {
                    continue;
                }
                if let Ok(resolved) = base_url.join(href) {
                    links.push(resolved);
                }
            }
        }
        links
    }

    async fn fetch(&self, url: &Url) -> Option<String> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .ok()?;

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            return None;
        }
        response.text().await.ok()
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn crawl(
        &self,
        seeds: &[Target],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, DriftwatchError> {
        let seed_hosts: HashSet<String> = seeds
            .iter()
            .filter_map(|s| Url::parse(&s.normalized_url).ok())
            .filter_map(|u| u.host_str().map(|h| h.to_string()))
            .collect();

        let mut queue: VecDeque<(Url, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut discovered: Vec<String> = Vec::new();

        for seed in seeds {
            if let Ok(url) = Url::parse(&seed.normalized_url) {
                if visited.insert(seed.normalized_url.clone()) {
                    discovered.push(url.to_string());
                    queue.push_back((url, 0));
                }
            }
        }

        let mut pages_fetched = 0usize;
        while let Some((url, depth)) = queue.pop_front() {
            if cancel.is_cancelled() {
                debug!(discovered = discovered.len(), "Crawl cancelled, returning partial results");
                break;
            }
            if pages_fetched >= self.max_pages {
                debug!(max_pages = self.max_pages, "Crawl page cap reached");
                break;
            }

            let Some(html) = self.fetch(&url).await else {
                continue;
            };
            pages_fetched += 1;

            for link in self.extract_links(&url, &html) {
                if link.scheme() != "http" && link.scheme() != "https" {
                    continue;
                }
                let Some(host) = link.host_str() else { continue };
                if !seed_hosts.contains(host) {
                    continue;
                }
                if !self.should_follow(&link) {
                    continue;
                }
                let canonical = match canonicalize_url(link.as_str()) {
                    Ok(canonical) => canonical,
                    Err(e) => {
                        warn!(url = %link, error = %e, "Dropping uncanonicalizable link");
                        continue;
                    }
                };
                if !visited.insert(canonical.clone()) {
                    continue;
                }
                discovered.push(canonical.clone());
                if depth < self.max_depth {
                    if let Ok(parsed) = Url::parse(&canonical) {
                        queue.push_back((parsed, depth + 1));
                    }
                }
            }

            // Politeness delay, abandoned on cancellation
            tokio::select! {
                _ = tokio::time::sleep(self.rate_limit) => {}
                _ = cancel.cancelled() => break,
            }
        }

        Ok(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_hrefs() {
        let crawler = HttpCrawler::new(reqwest::Client::new());
        let base = Url::parse("http://example.com/dir/page.html").unwrap();
        let html = r##"
            <a href="/abs">abs</a>
            <a href='rel'>rel</a>
            <a href="#frag">frag</a>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="tel:+1555">tel</a>
            <a href="http://other.example/x">other</a>
        "##;

        let links: Vec<String> = crawler
            .extract_links(&base, html)
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            links,
            vec![
                "http://example.com/abs",
                "http://example.com/dir/rel",
                "http://other.example/x",
            ]
        );
    }

    #[test]
    fn path_patterns_gate_link_following() {
        let crawler = HttpCrawler::new(reqwest::Client::new())
            .with_include_patterns(vec!["/docs".to_string()])
            .with_exclude_patterns(vec!["/docs/private".to_string()]);

        let keep = Url::parse("http://example.com/docs/guide").unwrap();
        let not_included = Url::parse("http://example.com/blog/post").unwrap();
        let excluded = Url::parse("http://example.com/docs/private/key").unwrap();

        assert!(crawler.should_follow(&keep));
        assert!(!crawler.should_follow(&not_included));
        assert!(!crawler.should_follow(&excluded));
    }

    #[tokio::test]
    async fn cancelled_crawl_returns_seeds_only() {
        let crawler = HttpCrawler::new(reqwest::Client::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let seeds = vec![Target::new("http://example.invalid", "http://example.invalid/")];
        let discovered = crawler.crawl(&seeds, &cancel).await.unwrap();
        // Seeds are always part of the discovery set
        assert_eq!(discovered, vec!["http://example.invalid/"]);
    }
}
