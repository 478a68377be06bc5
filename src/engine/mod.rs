//! Monitoring engine: fetch, fingerprint, detect, discover.

pub mod dates;
pub mod discovery;
pub mod fetch;
pub mod fingerprint;
pub mod monitor;
#[cfg(feature = "render")]
pub mod render;
pub mod runner;
pub mod selector;

// Re-export the pieces callers wire together
pub use dates::{DateRange, extract_dates, extract_dates_from_html};
pub use discovery::{DiscoveryEngine, DiscoveryOutcome};
pub use fetch::{ContentFetcher, HttpFetcher};
pub use fingerprint::fingerprint;
pub use monitor::{CheckOutcome, MonitorChecker};
pub use runner::{CycleOutcome, Runner};
pub use selector::validate_selector;
