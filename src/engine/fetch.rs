// src/engine/fetch.rs

//! Content retrieval with a static/rendered dual strategy.
//!
//! Static fetches are a plain HTTP GET followed by HTML parsing. URLs
//! matching the configured allow-list are rendered in a headless browser
//! instead, so script-built content is visible to selectors.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header;
use scraper::Html;
use tracing::debug;

use crate::engine::selector::{parse_selector, selector_candidates, validate_selector};
use crate::error::{AppError, Result};
use crate::models::FetchConfig;
use crate::utils::http;

#[cfg(feature = "render")]
use crate::engine::render;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// Retrieves page content for the check and discovery pipelines.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the visible text at `selector` on `url`.
    async fn fetch_content(&self, url: &str, selector: &str) -> Result<String>;

    /// Fetch the full markup of `url`, rendering when the site requires it.
    async fn fetch_raw_html(&self, url: &str) -> Result<String>;

    /// Fetch the full markup of `url` with a plain GET, never rendering.
    async fn fetch_static_html(&self, url: &str) -> Result<String>;
}

/// HTTP-backed fetcher dispatching between static and rendered retrieval.
pub struct HttpFetcher {
    config: FetchConfig,
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = http::create_client(config)?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn needs_rendering(&self, url: &str) -> bool {
        self.config
            .render_url_contains
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(|e| self.map_transport(url, e))?;
        response.text().await.map_err(|e| self.map_transport(url, e))
    }

    /// Remap transport timeouts to a budget-carrying failure.
    fn map_transport(&self, url: &str, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::timeout(url, self.config.static_timeout_secs)
        } else {
            AppError::Http(error)
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_content(&self, url: &str, selector: &str) -> Result<String> {
        // Validate before any network I/O
        validate_selector(selector)?;

        let normalized = selector.trim().to_string();
        let candidates = selector_candidates(&self.config.site_profiles, url, selector);

        if self.needs_rendering(url) {
            debug!("Using browser rendering for {url}");
            #[cfg(feature = "render")]
            return render::fetch_rendered_text(&self.config, url, &candidates, &normalized)
                .await;
            #[cfg(not(feature = "render"))]
            return Err(AppError::render(
                url,
                "page requires rendering, but this build lacks the 'render' feature",
            ));
        }

        let html = self.get_text(url).await?;
        extract_first_candidate(&html, &candidates, &normalized)
    }

    async fn fetch_raw_html(&self, url: &str) -> Result<String> {
        if self.needs_rendering(url) {
            debug!("Using browser rendering for {url}");
            #[cfg(feature = "render")]
            return render::fetch_rendered_html(&self.config, url).await;
            #[cfg(not(feature = "render"))]
            return Err(AppError::render(
                url,
                "page requires rendering, but this build lacks the 'render' feature",
            ));
        }

        self.get_text(url).await
    }

    async fn fetch_static_html(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }
}

/// Walk the candidate list over a parsed document.
///
/// The first candidate present in the document wins: non-empty trimmed text
/// is returned directly, and an element that exists but holds no text yields
/// an empty string rather than a miss. Only when no candidate matches any
/// node does the walk fail, carrying the original selector.
fn extract_first_candidate(html: &str, candidates: &[String], original: &str) -> Result<String> {
    let document = Html::parse_document(html);

    for candidate in candidates {
        let sel = parse_selector(candidate)?;
        let mut matched = false;
        let mut text = String::new();
        for element in document.select(&sel) {
            matched = true;
            text.push_str(&element.text().collect::<String>());
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() || matched {
            return Ok(trimmed.to_string());
        }
    }

    Err(AppError::selector_not_found(original))
}
