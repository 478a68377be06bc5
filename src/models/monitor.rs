// src/models/monitor.rs

//! Monitor target records and their update payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::dates::DateRange;

/// Persisted check status of a monitor target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MonitorStatus {
    /// Last check succeeded
    #[serde(rename = "OK")]
    Ok,
    /// Last check failed; `error_message` explains why
    Error,
    /// Never checked yet
    #[default]
    Unset,
}

impl MonitorStatus {
    /// Parse a stored status field. Unknown or empty values mean unset.
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some("OK") => Self::Ok,
            Some("Error") => Self::Error,
            _ => Self::Unset,
        }
    }

    /// Stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "Error",
            Self::Unset => "",
        }
    }
}

/// A web page location tracked for content change.
///
/// Created externally; the check pipeline only issues the field-level
/// updates encoded by [`MonitorUpdate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorTarget {
    /// Store record id
    pub id: String,

    /// Optional display name
    pub label: Option<String>,

    /// Page URL to watch
    pub url: Option<String>,

    /// CSS selector identifying the watched content
    pub selector: Option<String>,

    /// Fingerprint of the last successfully fetched content
    pub last_fingerprint: Option<String>,

    /// When the target was last checked
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Outcome of the last check
    pub status: MonitorStatus,

    /// Failure detail when `status` is Error
    pub error_message: Option<String>,
}

/// Fields for creating a new monitor target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitor {
    pub label: Option<String>,
    pub url: String,
    pub selector: String,
}

/// Partial update to a monitor target record.
///
/// `None` fields are omitted from the write; the store shallow-merges the
/// rest. Date fields distinguish omit (`None`) from clear (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorUpdate {
    pub last_fingerprint: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub status: Option<MonitorStatus>,
    pub error_message: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
}

impl MonitorUpdate {
    /// Full update written when changed content is detected.
    pub fn changed(fingerprint: String, checked_at: DateTime<Utc>, dates: &DateRange) -> Self {
        Self {
            last_fingerprint: Some(fingerprint),
            last_checked_at: Some(checked_at),
            status: Some(MonitorStatus::Ok),
            error_message: Some(String::new()),
            start_date: Some(dates.start),
            end_date: Some(dates.end),
        }
    }

    /// Update written when a check fails.
    pub fn errored(checked_at: DateTime<Utc>, message: String) -> Self {
        let message = if message.is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };
        Self {
            last_checked_at: Some(checked_at),
            status: Some(MonitorStatus::Error),
            error_message: Some(message),
            ..Self::default()
        }
    }

    /// Recovery write clearing a stale error flag without touching
    /// fingerprint or timestamps.
    pub fn recovered() -> Self {
        Self {
            status: Some(MonitorStatus::Ok),
            error_message: Some(String::new()),
            ..Self::default()
        }
    }
}
