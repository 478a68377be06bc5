// src/models/discovery.rs

//! Discovery rules and the event records they produce.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A recipe for finding new event pages from an index page.
///
/// Read-only to the engine; rules are authored externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRule {
    /// Store record id
    pub id: String,

    /// Display name used in notifications
    pub label: Option<String>,

    /// Index page to crawl
    pub source_url: Option<String>,

    /// Selector matching anchor elements on the index page
    pub link_selector: Option<String>,

    /// Regular expression tested against resolved absolute URLs
    pub url_pattern: Option<String>,

    /// Selector applied to each discovered page
    pub target_selector: Option<String>,

    /// Inactive rules are skipped entirely
    pub is_active: bool,
}

impl DiscoveryRule {
    /// The four crawl ingredients, present only when the rule carries
    /// all of them.
    pub fn crawl_parts(&self) -> Option<(&str, &str, &str, &str)> {
        Some((
            self.source_url.as_deref()?,
            self.link_selector.as_deref()?,
            self.url_pattern.as_deref()?,
            self.target_selector.as_deref()?,
        ))
    }
}

/// A deduplicated record of one URL found by a discovery rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredEvent {
    /// Store record id
    pub id: String,

    /// Derived display title
    pub title: Option<String>,

    /// Normalized page URL; the dedup key
    pub url: Option<String>,

    /// Extracted event start date
    pub start_date: Option<NaiveDate>,

    /// Extracted event end date
    pub end_date: Option<NaiveDate>,

    /// Fingerprint of the page content at the last sighting
    pub last_fingerprint: Option<String>,

    /// When the URL was first seen
    pub found_at: Option<DateTime<Utc>>,
}

/// Field set written when creating or refreshing an event record.
///
/// `found_at` is persisted on create only; updates keep the first
/// sighting time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub title: String,
    pub url: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub fingerprint: String,
    pub found_at: DateTime<Utc>,
}
