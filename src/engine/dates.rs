//! Heuristic date extraction from page text.
//!
//! Recognizes Japanese and slash-separated date tokens such as
//! `2026年3月3日`, `2026/03/01`, `3月1日` or `3/1`; a missing year defaults
//! to the current calendar year.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:(\d{4})[年/])?\s*(\d{1,2})[月/](\d{1,2})日?").unwrap());

/// Keywords that typically precede a sale or campaign period.
const PERIOD_KEYWORDS: &[&str] = &["開催期間", "セール期間", "実施期間", "期間：", "キャンペーン期間"];

/// Characters scanned after a period keyword.
const KEYWORD_WINDOW_CHARS: usize = 150;

/// An extracted start/end date pair. Either side may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Extract the earliest and latest calendar dates mentioned in `text`.
///
/// All valid matches are deduplicated and sorted; the result is
/// start = earliest, end = latest (end equals start when only one distinct
/// date appears). Tokens with month outside 1..=12, day outside 1..=31, or
/// an impossible calendar combination (e.g. Feb 30) are discarded.
pub fn extract_dates(text: &str) -> DateRange {
    extract_dates_with_year(text, Local::now().year())
}

fn extract_dates_with_year(text: &str, current_year: i32) -> DateRange {
    let mut found = BTreeSet::new();

    for caps in DATE_PATTERN.captures_iter(text) {
        let year = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(current_year);
        let Ok(month) = caps[2].parse::<u32>() else {
            continue;
        };
        let Ok(day) = caps[3].parse::<u32>() else {
            continue;
        };

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            continue;
        }

        // from_ymd_opt rejects impossible combinations like Feb 30
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            found.insert(date);
        }
    }

    DateRange {
        start: found.first().copied(),
        end: found.last().copied(),
    }
}

/// Extract a date range from raw HTML, anchored on period keywords.
///
/// Scans a bounded window after the first matching keyword before falling
/// back to whole-text extraction; anchoring sharply reduces false positives
/// from unrelated numeric content on dense pages.
pub fn extract_dates_from_html(html: &str) -> DateRange {
    for keyword in PERIOD_KEYWORDS {
        if let Some(index) = html.find(keyword) {
            let snippet: String = html[index..].chars().take(KEYWORD_WINDOW_CHARS).collect();
            let dates = extract_dates(&snippet);
            if dates.start.is_some() {
                return dates;
            }
        }
    }

    extract_dates(html)
}
