//! Article fetching
//!
//! Wraps an HTTP client with timeout and user agent, extracts readable
//! text from HTML, and applies length filters. Fetch failures are
//! recorded, never fatal to the run.

use chrono::Utc;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use veridex_contracts::FetchedSource;

/// Fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Articles shorter than this are discarded as boilerplate.
    pub min_text_length: usize,
    /// Extracted text is truncated to this length.
    pub max_text_length: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: "Veridex-Research/0.1".to_string(),
            min_text_length: 200,
            max_text_length: 40_000,
        }
    }
}

/// HTTP article fetcher.
#[derive(Debug)]
pub struct ArticleFetcher {
    config: FetcherConfig,
    client: reqwest::Client,
}

impl ArticleFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    /// Fetch one URL into a `FetchedSource`. The synthetic id `E{n}` ties
    /// the source to evidence items extracted from it.
    pub async fn fetch(&self, index: usize, url: &str, title_hint: &str) -> FetchedSource {
        let id = format!("E{}", index + 1);
        match self.fetch_text(url).await {
            Ok((title, text)) => {
                debug!("fetched {} ({} chars)", url, text.len());
                let usable = text.len() >= self.config.min_text_length;
                FetchedSource {
                    id,
                    url: url.to_string(),
                    title: if title.is_empty() {
                        title_hint.to_string()
                    } else {
                        title
                    },
                    full_text: text,
                    fetched_at: Utc::now(),
                    category: String::new(),
                    fetch_success: usable,
                    track_record_score: None,
                }
            }
            Err(message) => {
                warn!("fetch failed for {}: {}", url, message);
                FetchedSource {
                    id,
                    url: url.to_string(),
                    title: title_hint.to_string(),
                    full_text: String::new(),
                    fetched_at: Utc::now(),
                    category: String::new(),
                    fetch_success: false,
                    track_record_score: None,
                }
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<(String, String), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| e.to_string())?;
        if content_type.contains("html") || body.trim_start().starts_with('<') {
            Ok(extract_readable_text(&body, self.config.max_text_length))
        } else {
            let mut text = body;
            text.truncate(self.config.max_text_length);
            Ok((String::new(), text))
        }
    }
}

/// Extract the page title and readable body text from HTML, dropping
/// scripts, styles, and navigation chrome.
pub fn extract_readable_text(html: &str, max_length: usize) -> (String, String) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let mut text = String::new();
    if let Ok(selector) = Selector::parse("article p, main p, p, h1, h2, li") {
        for element in document.select(&selector) {
            let chunk: String = element.text().collect::<Vec<_>>().join(" ");
            let chunk = chunk.trim();
            if chunk.len() < 30 {
                continue;
            }
            text.push_str(chunk);
            text.push('\n');
            if text.len() >= max_length {
                break;
            }
        }
    }
    text.truncate(max_length);
    (title, text)
}
