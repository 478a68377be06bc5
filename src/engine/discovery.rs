//! Rule-driven discovery of new event pages.
//!
//! Each active rule crawls an index page, extracts candidate links,
//! and upserts one event record per normalized URL. Rules and their
//! candidates run strictly one at a time to bound load on source sites.

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{error, info, warn};
use url::Url;

use crate::engine::dates::extract_dates;
use crate::engine::fetch::ContentFetcher;
use crate::engine::fingerprint::fingerprint;
use crate::engine::selector::parse_selector;
use crate::error::{AppError, Result};
use crate::models::EventFields;
use crate::notify::Messenger;
use crate::store::RecordStore;
use crate::utils::normalize_event_url;

const DEFAULT_EVENT_TITLE: &str = "New Event";
const TITLE_MAX_CHARS: usize = 100;

/// Whether a candidate URL produced a new event row or refreshed one.
enum Registration {
    Created,
    Updated,
}

/// Tally of one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Rules that were active and complete enough to run
    pub rules: usize,
    /// Event records created (each one notified)
    pub created: usize,
    /// Event records refreshed silently
    pub updated: usize,
    /// Candidate URLs that failed and were skipped
    pub failed: usize,
}

/// Crawls rule source pages and registers the event pages they link to.
pub struct DiscoveryEngine {
    fetcher: Arc<dyn ContentFetcher>,
    store: Arc<dyn RecordStore>,
    messenger: Arc<dyn Messenger>,
}

impl DiscoveryEngine {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn RecordStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            fetcher,
            store,
            messenger,
        }
    }

    /// Run every active rule. Rule failures are logged and isolated, so
    /// the pass always reports a tally unless the rules cannot be listed
    /// at all.
    pub async fn run(&self) -> Result<DiscoveryOutcome> {
        info!("Starting discovery phase");
        let rules = self.store.list_rules().await?;

        let mut outcome = DiscoveryOutcome::default();
        for rule in rules.iter().filter(|rule| rule.is_active) {
            let label = rule.label.as_deref().unwrap_or_default();

            // Rules missing any ingredient are skipped, not failed.
            let Some((source_url, link_selector, url_pattern, target_selector)) =
                rule.crawl_parts()
            else {
                continue;
            };

            outcome.rules += 1;
            if let Err(rule_error) = self
                .run_rule(
                    label,
                    source_url,
                    link_selector,
                    url_pattern,
                    target_selector,
                    &mut outcome,
                )
                .await
            {
                error!("Discovery failed for rule {label}: {rule_error}");
            }
        }

        Ok(outcome)
    }

    async fn run_rule(
        &self,
        label: &str,
        source_url: &str,
        link_selector: &str,
        url_pattern: &str,
        target_selector: &str,
        outcome: &mut DiscoveryOutcome,
    ) -> Result<()> {
        let links = self
            .discover_links(source_url, link_selector, url_pattern)
            .await?;
        info!("Discovered {} links for rule {label}", links.len());

        for raw_url in links {
            let url = normalize_event_url(&raw_url);
            match self.register_event(label, &url, target_selector).await {
                Ok(Registration::Created) => outcome.created += 1,
                Ok(Registration::Updated) => outcome.updated += 1,
                Err(candidate_error) => {
                    outcome.failed += 1;
                    error!("Failed to process discovered URL {url}: {candidate_error}");
                }
            }
        }

        Ok(())
    }

    /// Extract candidate event URLs from the rule's index page.
    async fn discover_links(
        &self,
        source_url: &str,
        link_selector: &str,
        url_pattern: &str,
    ) -> Result<Vec<String>> {
        info!("Starting discovery on {source_url} with selector {link_selector}");
        let pattern = Regex::new(url_pattern).map_err(|e| AppError::pattern(url_pattern, e))?;

        let html = self.fetcher.fetch_raw_html(source_url).await?;
        collect_links(&html, link_selector, source_url, &pattern)
    }

    /// Crawl one candidate page and register its event record, keyed by
    /// exact URL equality. Only brand-new records are announced.
    async fn register_event(
        &self,
        label: &str,
        url: &str,
        target_selector: &str,
    ) -> Result<Registration> {
        info!("Crawling discovered event: {url}");

        let (content, fell_back) = match self.fetcher.fetch_content(url, target_selector).await {
            Ok(content) => (content, false),
            Err(fetch_error) => {
                warn!(
                    "Selector '{target_selector}' failed on {url}, falling back to body: {fetch_error}"
                );
                (self.fetcher.fetch_content(url, "body").await?, true)
            }
        };

        let dates = extract_dates(&content);
        let title = self.resolve_title(url, &content, fell_back).await;

        let fields = EventFields {
            title,
            url: url.to_string(),
            start_date: dates.start,
            end_date: dates.end,
            fingerprint: fingerprint(&content),
            found_at: Utc::now(),
        };

        match self.store.find_event_by_url(url).await? {
            Some(existing) => {
                self.store.update_event(&existing.id, &fields).await?;
                info!("Updated existing event: {url}");
                Ok(Registration::Updated)
            }
            None => {
                self.store.create_event(&fields).await?;
                info!("Registered new event: {url}");
                let framing = format!("【新着】{label}: {}", fields.title);
                self.messenger.send_change_notification(url, Some(&framing)).await?;
                Ok(Registration::Created)
            }
        }
    }

    /// Derive a display title, preferring the extracted text and falling
    /// back to a static re-fetch of the page markup.
    async fn resolve_title(&self, url: &str, content: &str, fell_back: bool) -> String {
        let mut title = if fell_back {
            String::new()
        } else {
            first_meaningful_line(content)
        };

        if title.chars().count() < 2 {
            title = match self.fetcher.fetch_static_html(url).await {
                Ok(html) => title_from_markup(&html),
                Err(_) => DEFAULT_EVENT_TITLE.to_string(),
            };
        }

        let truncated: String = title.chars().take(TITLE_MAX_CHARS).collect();
        if truncated.is_empty() {
            DEFAULT_EVENT_TITLE.to_string()
        } else {
            truncated
        }
    }
}

/// Pull absolute, pattern-matching, deduplicated link targets out of an
/// index page. Unresolvable links are skipped silently.
fn collect_links(
    html: &str,
    link_selector: &str,
    source_url: &str,
    pattern: &Regex,
) -> Result<Vec<String>> {
    let selector = parse_selector(link_selector)?;
    let Ok(base) = Url::parse(source_url) else {
        return Ok(Vec::new());
    };

    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let absolute = resolved.to_string();
        if pattern.is_match(&absolute) && !links.contains(&absolute) {
            links.push(absolute);
        }
    }

    Ok(links)
}

/// First trimmed line that is not empty and does not look like markup
/// or serialized data.
fn first_meaningful_line(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('{') && !line.starts_with('('))
        .unwrap_or_default()
        .to_string()
}

/// Title priority chain over raw page markup: a descriptive image alt,
/// then the first h1, then the title tag with brand noise stripped.
fn title_from_markup(html: &str) -> String {
    let document = Html::parse_document(html);

    if let Ok(images) = Selector::parse("img") {
        for element in document.select(&images) {
            if let Some(alt) = element.value().attr("alt") {
                if alt.chars().count() > 5 && !alt.contains('{') {
                    return alt.to_string();
                }
            }
        }
    }

    if let Ok(headings) = Selector::parse("h1") {
        if let Some(element) = document.select(&headings).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return text;
            }
        }
    }

    if let Ok(titles) = Selector::parse("title") {
        let text: String = document.select(&titles).flat_map(|el| el.text()).collect();
        let cleaned = text.replace("Amazon", "");
        let cut = cleaned
            .find(|c: char| c.is_whitespace() || c == '|' || c == ':' || c == '-')
            .map_or(cleaned.as_str(), |index| &cleaned[..index]);
        return cut.trim().to_string();
    }

    String::new()
}
