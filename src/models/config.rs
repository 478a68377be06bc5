//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Content fetching behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.static_timeout_secs == 0 {
            return Err(AppError::validation(
                "fetch.static_timeout_secs must be > 0",
            ));
        }
        if self.fetch.render_timeout_secs == 0 {
            return Err(AppError::validation(
                "fetch.render_timeout_secs must be > 0",
            ));
        }
        if self.fetch.selector_wait_secs == 0 {
            return Err(AppError::validation(
                "fetch.selector_wait_secs must be > 0",
            ));
        }
        if self.fetch.render_url_contains.iter().any(|p| p.is_empty()) {
            return Err(AppError::validation(
                "fetch.render_url_contains entries must be non-empty",
            ));
        }
        for profile in &self.fetch.site_profiles {
            if profile.url_contains.is_empty() {
                return Err(AppError::validation(
                    "site profile url_contains must be non-empty",
                ));
            }
            if profile.selector.trim().is_empty() {
                return Err(AppError::validation(
                    "site profile selector must be non-empty",
                ));
            }
        }
        Ok(())
    }
}

/// Content fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for all fetches
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout for static HTTP fetches, in seconds
    #[serde(default = "defaults::static_timeout")]
    pub static_timeout_secs: u64,

    /// Overall budget for a headless-browser fetch, in seconds
    #[serde(default = "defaults::render_timeout")]
    pub render_timeout_secs: u64,

    /// Bounded wait for a selector to appear after rendering, in seconds
    #[serde(default = "defaults::selector_wait")]
    pub selector_wait_secs: u64,

    /// URL substrings that force the headless-browser fetch path
    #[serde(default = "defaults::render_url_contains")]
    pub render_url_contains: Vec<String>,

    /// Per-site selector fallback tables
    #[serde(default = "defaults::site_profiles")]
    pub site_profiles: Vec<SiteProfile>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            static_timeout_secs: defaults::static_timeout(),
            render_timeout_secs: defaults::render_timeout(),
            selector_wait_secs: defaults::selector_wait(),
            render_url_contains: defaults::render_url_contains(),
            site_profiles: defaults::site_profiles(),
        }
    }
}

/// Selector fallback table for one known site.
///
/// When a fetched URL contains `url_contains` and the requested selector
/// equals `selector`, the fallbacks are tried in order after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    /// URL substring identifying the site
    pub url_contains: String,

    /// Primary selector this profile applies to
    pub selector: String,

    /// Alternate selectors tolerating markup drift, tried in order
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

mod defaults {
    use super::SiteProfile;

    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .into()
    }
    pub fn static_timeout() -> u64 {
        10
    }
    pub fn render_timeout() -> u64 {
        30
    }
    pub fn selector_wait() -> u64 {
        3
    }
    pub fn render_url_contains() -> Vec<String> {
        vec![
            "amazon.co.jp".into(),
            "platform.claude.com".into(),
            "status.claude.com".into(),
        ]
    }
    pub fn site_profiles() -> Vec<SiteProfile> {
        vec![SiteProfile {
            url_contains: "status.claude.com".to_string(),
            selector: ".page-status".to_string(),
            fallbacks: vec![
                ".component-container .component-status".to_string(),
                ".incident-title a".to_string(),
            ],
        }]
    }
}
