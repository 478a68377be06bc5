//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Normalize an event URL to scheme, host, and path, dropping any query
/// string and fragment. Unparseable input falls back to cutting at the
/// first `?`.
pub fn normalize_event_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            let host = parsed.host_str().unwrap_or_default();
            match parsed.port() {
                Some(port) => format!("{scheme}://{host}:{port}{}", parsed.path()),
                None => format!("{scheme}://{host}{}", parsed.path()),
            }
        }
        Err(_) => url
            .split_once('?')
            .map_or(url, |(base, _)| base)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize_event_url("https://shop.example.com/sale/101?ref=top#detail"),
            "https://shop.example.com/sale/101"
        );
        assert_eq!(
            normalize_event_url("https://shop.example.com/sale/101"),
            "https://shop.example.com/sale/101"
        );
    }

    #[test]
    fn test_normalize_keeps_explicit_port() {
        assert_eq!(
            normalize_event_url("https://example.com:8080/a?x=1"),
            "https://example.com:8080/a"
        );
        assert_eq!(
            normalize_event_url("https://example.com:443/a"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_normalize_adds_root_path() {
        assert_eq!(
            normalize_event_url("https://example.com?q=1"),
            "https://example.com/"
        );
    }

    #[test]
    fn test_normalize_unparseable_cuts_at_query() {
        assert_eq!(normalize_event_url("not a url?tracking=1"), "not a url");
        assert_eq!(normalize_event_url("not a url"), "not a url");
    }
}
