//! Outbound change notifications.

pub mod lark;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use lark::LarkMessenger;

/// Label shown when a monitor row carries none.
pub const DEFAULT_LABEL: &str = "無題";

/// Delivers change alerts to a chat surface.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Announce that the page at `url` changed, titled with `label`
    /// when one is present.
    async fn send_change_notification(&self, url: &str, label: Option<&str>) -> Result<()>;
}
