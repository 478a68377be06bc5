//! Record persistence behind a narrow trait.
//!
//! The engine reads monitor rows and discovery rules, writes partial
//! monitor updates, and registers discovered events. Everything else
//! about the backing tables stays inside the implementation.

pub mod lark;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    DiscoveredEvent, DiscoveryRule, EventFields, MonitorTarget, MonitorUpdate, NewMonitor,
};

// Re-export for convenience
pub use lark::LarkStore;

/// Trait for monitor and event record backends.
///
/// Updates are field-level and shallow-merged by the store, so
/// concurrent writers touching different records never clobber each
/// other's rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All monitor rows, in table order.
    async fn list_monitors(&self) -> Result<Vec<MonitorTarget>>;

    /// A single monitor row by record id.
    async fn get_monitor(&self, id: &str) -> Result<Option<MonitorTarget>>;

    /// Create a monitor row and return its record id.
    async fn create_monitor(&self, monitor: &NewMonitor) -> Result<String>;

    /// Apply the populated fields of `update` to one monitor row.
    async fn update_monitor(&self, id: &str, update: &MonitorUpdate) -> Result<()>;

    /// Delete a monitor row.
    async fn delete_monitor(&self, id: &str) -> Result<()>;

    /// All discovery rules, active or not.
    async fn list_rules(&self) -> Result<Vec<DiscoveryRule>>;

    /// All discovered event rows.
    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>>;

    /// The event row whose URL field equals `url` exactly, if any.
    async fn find_event_by_url(&self, url: &str) -> Result<Option<DiscoveredEvent>>;

    /// Create an event row, including its first-seen timestamp.
    async fn create_event(&self, fields: &EventFields) -> Result<()>;

    /// Refresh an event row, leaving its first-seen timestamp untouched.
    async fn update_event(&self, id: &str, fields: &EventFields) -> Result<()>;
}
