//! CSS selector validation and per-site candidate expansion.

use scraper::Selector;

use crate::error::{AppError, Result};
use crate::models::SiteProfile;

/// Parse a CSS selector, mapping parse failures to a selector error.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Check selector syntax without touching the network.
///
/// Runs before any fetch so malformed input never wastes a request.
pub fn validate_selector(selector: &str) -> Result<()> {
    parse_selector(selector.trim()).map(|_| ())
}

/// Expand a selector into its ordered candidate list for a URL.
///
/// Known sites get fallback selectors tolerating markup drift; the primary
/// selector always comes first. A profile applies only when the URL contains
/// its substring and the trimmed selector matches exactly.
pub fn selector_candidates(profiles: &[SiteProfile], url: &str, selector: &str) -> Vec<String> {
    let normalized = selector.trim().to_string();

    for profile in profiles {
        if url.contains(&profile.url_contains) && normalized == profile.selector {
            let mut candidates = vec![normalized];
            candidates.extend(profile.fallbacks.iter().cloned());
            return candidates;
        }
    }

    vec![normalized]
}
