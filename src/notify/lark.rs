//! Lark interactive-card delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::Result;
use crate::lark::{LarkClient, LarkEnv};
use crate::notify::{DEFAULT_LABEL, Messenger};

/// Messenger posting change-detection cards to a configured Lark chat.
pub struct LarkMessenger {
    client: Arc<LarkClient>,
    chat_id: Option<String>,
}

impl LarkMessenger {
    pub fn new(client: Arc<LarkClient>, env: &LarkEnv) -> Self {
        Self {
            client,
            chat_id: env.notify_chat_id.clone(),
        }
    }
}

#[async_trait]
impl Messenger for LarkMessenger {
    async fn send_change_notification(&self, url: &str, label: Option<&str>) -> Result<()> {
        let Some(chat_id) = &self.chat_id else {
            warn!("LARK_NOTIFY_CHAT_ID is not set. Skipping notification.");
            return Ok(());
        };

        let card = build_card(url, label, Utc::now());
        self.client
            .send_message(receive_id_type(chat_id), chat_id, "interactive", &card)
            .await?;
        info!("Notification sent for {url}");
        Ok(())
    }
}

/// Receiver id prefixes decide which `receive_id_type` the messaging
/// endpoint needs.
fn receive_id_type(id: &str) -> &'static str {
    if id.starts_with("oc_") {
        "chat_id"
    } else if id.starts_with("ou_") {
        "user_id"
    } else {
        "open_id"
    }
}

/// Detection time rendered in Japan Standard Time, without zero padding.
fn format_jst(at: DateTime<Utc>) -> String {
    let jst = FixedOffset::east_opt(9 * 3600).expect("UTC+9 is a valid offset");
    at.with_timezone(&jst)
        .format("%Y/%-m/%-d %-H:%M:%S")
        .to_string()
}

/// Interactive card announcing a detected page change.
fn build_card(url: &str, label: Option<&str>, at: DateTime<Utc>) -> Value {
    let heading = label.filter(|l| !l.is_empty()).unwrap_or(DEFAULT_LABEL);
    json!({
        "config": {
            "wide_screen_mode": true
        },
        "header": {
            "title": {
                "tag": "plain_text",
                "content": format!("🔔 Web更新検知: {heading}")
            },
            "template": "blue"
        },
        "elements": [
            {
                "tag": "div",
                "text": {
                    "tag": "lark_md",
                    "content": format!("**{url}**\n\nページ内容の変更を検知しました。")
                }
            },
            {
                "tag": "note",
                "elements": [
                    {
                        "tag": "plain_text",
                        "content": format!("検知日時: {}", format_jst(at))
                    }
                ]
            },
            {
                "tag": "action",
                "actions": [
                    {
                        "tag": "button",
                        "text": {
                            "tag": "plain_text",
                            "content": "サイトを確認する"
                        },
                        "type": "primary",
                        "url": url
                    }
                ]
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn card_heading_uses_label_or_placeholder() {
        let labeled = build_card("https://example.com", Some("春セール"), Utc::now());
        assert_eq!(
            labeled["header"]["title"]["content"],
            json!("🔔 Web更新検知: 春セール")
        );

        let unlabeled = build_card("https://example.com", None, Utc::now());
        assert_eq!(
            unlabeled["header"]["title"]["content"],
            json!("🔔 Web更新検知: 無題")
        );

        let blank = build_card("https://example.com", Some(""), Utc::now());
        assert_eq!(
            blank["header"]["title"]["content"],
            json!("🔔 Web更新検知: 無題")
        );
    }

    #[test]
    fn card_links_the_changed_page() {
        let card = build_card("https://example.com/sale", None, Utc::now());
        assert_eq!(
            card["elements"][0]["text"]["content"],
            json!("**https://example.com/sale**\n\nページ内容の変更を検知しました。")
        );
        assert_eq!(
            card["elements"][2]["actions"][0]["url"],
            json!("https://example.com/sale")
        );
    }

    #[test]
    fn receive_id_prefixes_pick_the_message_target() {
        assert_eq!(receive_id_type("oc_abc"), "chat_id");
        assert_eq!(receive_id_type("ou_abc"), "user_id");
        assert_eq!(receive_id_type("xyz"), "open_id");
    }

    #[test]
    fn detection_time_renders_in_jst() {
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 23, 30, 5).unwrap();
        assert_eq!(format_jst(at), "2024/3/3 8:30:05");
    }
}
