//! Change detection for individual monitor targets.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::engine::dates::extract_dates;
use crate::engine::fetch::ContentFetcher;
use crate::engine::fingerprint::fingerprint;
use crate::error::Result;
use crate::models::{MonitorStatus, MonitorTarget, MonitorUpdate};
use crate::notify::Messenger;
use crate::store::RecordStore;

/// What a single check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The row has no URL or selector, so there is nothing to check.
    Skipped,
    /// Content changed; a notification was sent and the row rewritten.
    Changed,
    /// Content matched the stored fingerprint and the row was clean.
    Unchanged,
    /// Content matched and a stale error flag was cleared.
    Recovered,
}

/// Runs the fetch/compare/persist cycle for monitor rows.
pub struct MonitorChecker {
    fetcher: Arc<dyn ContentFetcher>,
    store: Arc<dyn RecordStore>,
    messenger: Arc<dyn Messenger>,
}

impl MonitorChecker {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn RecordStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            fetcher,
            store,
            messenger,
        }
    }

    /// Check one monitor row, persisting whatever the outcome requires.
    ///
    /// Any failure along the way is written back to the row as an error
    /// state before being returned, so the table reflects broken targets.
    /// The error write itself is best-effort.
    pub async fn check(&self, target: &MonitorTarget) -> Result<CheckOutcome> {
        let (Some(url), Some(selector)) = (target.url.as_deref(), target.selector.as_deref())
        else {
            return Ok(CheckOutcome::Skipped);
        };

        match self.observe(target, url, selector).await {
            Ok(outcome) => Ok(outcome),
            Err(check_error) => {
                let update = MonitorUpdate::errored(Utc::now(), check_error.to_string());
                if let Err(write_error) = self.store.update_monitor(&target.id, &update).await {
                    error!(
                        "Failed to record error state for {}: {write_error}",
                        target.id
                    );
                }
                Err(check_error)
            }
        }
    }

    async fn observe(
        &self,
        target: &MonitorTarget,
        url: &str,
        selector: &str,
    ) -> Result<CheckOutcome> {
        let content = self.fetcher.fetch_content(url, selector).await?;
        let current = fingerprint(&content);
        let checked_at = Utc::now();
        let dates = extract_dates(&content);

        // A row that has never been fingerprinted counts as changed.
        let changed = match target.last_fingerprint.as_deref() {
            Some(previous) => previous != current,
            None => true,
        };

        if changed {
            let name = target.label.as_deref().unwrap_or(url);
            info!("Change detected for {name}, updating record");
            self.messenger
                .send_change_notification(url, target.label.as_deref())
                .await?;
            let update = MonitorUpdate::changed(current, checked_at, &dates);
            self.store.update_monitor(&target.id, &update).await?;
            return Ok(CheckOutcome::Changed);
        }

        // Unchanged content writes nothing, except to clear a previous
        // error state exactly once.
        if target.status != MonitorStatus::Ok || target.error_message.is_some() {
            self.store
                .update_monitor(&target.id, &MonitorUpdate::recovered())
                .await?;
            return Ok(CheckOutcome::Recovered);
        }

        Ok(CheckOutcome::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::models::{DiscoveredEvent, DiscoveryRule, EventFields, NewMonitor};

    struct FixedFetcher {
        content: Option<String>,
    }

    #[async_trait]
    impl ContentFetcher for FixedFetcher {
        async fn fetch_content(&self, _url: &str, selector: &str) -> Result<String> {
            self.content
                .clone()
                .ok_or_else(|| AppError::selector_not_found(selector))
        }

        async fn fetch_raw_html(&self, _url: &str) -> Result<String> {
            unreachable!("monitor checks never fetch raw markup")
        }

        async fn fetch_static_html(&self, _url: &str) -> Result<String> {
            unreachable!("monitor checks never re-fetch statically")
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        updates: Mutex<Vec<(String, MonitorUpdate)>>,
        fail_updates: bool,
    }

    #[async_trait]
    impl RecordStore for RecordingStore {
        async fn list_monitors(&self) -> Result<Vec<MonitorTarget>> {
            Ok(Vec::new())
        }

        async fn get_monitor(&self, _id: &str) -> Result<Option<MonitorTarget>> {
            Ok(None)
        }

        async fn create_monitor(&self, _monitor: &NewMonitor) -> Result<String> {
            unreachable!("checks never create rows")
        }

        async fn update_monitor(&self, id: &str, update: &MonitorUpdate) -> Result<()> {
            if self.fail_updates {
                return Err(AppError::store("write refused"));
            }
            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), update.clone()));
            Ok(())
        }

        async fn delete_monitor(&self, _id: &str) -> Result<()> {
            unreachable!("checks never delete rows")
        }

        async fn list_rules(&self) -> Result<Vec<DiscoveryRule>> {
            Ok(Vec::new())
        }

        async fn list_events(&self) -> Result<Vec<DiscoveredEvent>> {
            Ok(Vec::new())
        }

        async fn find_event_by_url(&self, _url: &str) -> Result<Option<DiscoveredEvent>> {
            unreachable!("checks never touch event records")
        }

        async fn create_event(&self, _fields: &EventFields) -> Result<()> {
            unreachable!("checks never touch event records")
        }

        async fn update_event(&self, _id: &str, _fields: &EventFields) -> Result<()> {
            unreachable!("checks never touch event records")
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        notices: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_change_notification(&self, url: &str, label: Option<&str>) -> Result<()> {
            if self.fail {
                return Err(AppError::notify("chat unreachable"));
            }
            self.notices
                .lock()
                .unwrap()
                .push((url.to_string(), label.map(str::to_string)));
            Ok(())
        }
    }

    fn target(last_fingerprint: Option<&str>, status: MonitorStatus) -> MonitorTarget {
        MonitorTarget {
            id: "rec1".to_string(),
            label: Some("Sale page".to_string()),
            url: Some("https://example.com/sale".to_string()),
            selector: Some(".price".to_string()),
            last_fingerprint: last_fingerprint.map(str::to_string),
            last_checked_at: None,
            status,
            error_message: None,
        }
    }

    fn checker(
        content: Option<&str>,
        store: Arc<RecordingStore>,
        messenger: Arc<RecordingMessenger>,
    ) -> MonitorChecker {
        MonitorChecker::new(
            Arc::new(FixedFetcher {
                content: content.map(str::to_string),
            }),
            store,
            messenger,
        )
    }

    #[tokio::test]
    async fn rows_without_url_or_selector_are_skipped() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(Some("text"), store.clone(), messenger.clone());

        let mut no_selector = target(None, MonitorStatus::Unset);
        no_selector.selector = None;

        let outcome = checker.check(&no_selector).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Skipped);
        assert!(store.updates.lock().unwrap().is_empty());
        assert!(messenger.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_observation_counts_as_change() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(Some("opening text"), store.clone(), messenger.clone());

        let outcome = checker.check(&target(None, MonitorStatus::Unset)).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Changed);
        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (_, update) = &updates[0];
        assert_eq!(update.last_fingerprint.as_deref(), Some(fingerprint("opening text").as_str()));
        assert_eq!(update.status, Some(MonitorStatus::Ok));
        assert_eq!(messenger.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn change_notifies_before_rewriting_the_row() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(
            Some("セール 3月3日〜3月9日"),
            store.clone(),
            messenger.clone(),
        );

        let outcome = checker
            .check(&target(Some("stale-fingerprint"), MonitorStatus::Ok))
            .await
            .unwrap();

        assert_eq!(outcome, CheckOutcome::Changed);

        let notices = messenger.notices.lock().unwrap();
        assert_eq!(
            notices.as_slice(),
            [(
                "https://example.com/sale".to_string(),
                Some("Sale page".to_string())
            )]
        );

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (id, update) = &updates[0];
        assert_eq!(id, "rec1");
        assert_eq!(update.error_message.as_deref(), Some(""));
        assert!(update.last_checked_at.is_some());
        // Extracted dates ride along with the rewrite.
        assert!(matches!(update.start_date, Some(Some(_))));
        assert!(matches!(update.end_date, Some(Some(_))));
    }

    #[tokio::test]
    async fn unchanged_clean_row_writes_nothing() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(Some("steady"), store.clone(), messenger.clone());

        let current = fingerprint("steady");
        let outcome = checker
            .check(&target(Some(&current), MonitorStatus::Ok))
            .await
            .unwrap();

        assert_eq!(outcome, CheckOutcome::Unchanged);
        assert!(store.updates.lock().unwrap().is_empty());
        assert!(messenger.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unchanged_errored_row_recovers_exactly_once() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(Some("steady"), store.clone(), messenger.clone());

        let current = fingerprint("steady");
        let mut errored = target(Some(&current), MonitorStatus::Error);
        errored.error_message =
            Some("Timeout fetching https://example.com/sale (10s)".to_string());

        let outcome = checker.check(&errored).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Recovered);
        assert!(messenger.notices.lock().unwrap().is_empty());

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, MonitorUpdate::recovered());
    }

    #[tokio::test]
    async fn fetch_failure_records_error_state_and_propagates() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(None, store.clone(), messenger.clone());

        let result = checker.check(&target(None, MonitorStatus::Unset)).await;

        assert!(result.is_err());
        assert!(messenger.notices.lock().unwrap().is_empty());

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (_, update) = &updates[0];
        assert_eq!(update.status, Some(MonitorStatus::Error));
        assert!(update.error_message.as_deref().unwrap().contains(".price"));
        assert!(update.last_checked_at.is_some());
        assert!(update.last_fingerprint.is_none());
    }

    #[tokio::test]
    async fn notify_failure_is_persisted_as_an_error_state() {
        let store = Arc::new(RecordingStore::default());
        let messenger = Arc::new(RecordingMessenger {
            fail: true,
            ..RecordingMessenger::default()
        });
        let checker = checker(Some("fresh"), store.clone(), messenger.clone());

        let result = checker.check(&target(Some("old"), MonitorStatus::Ok)).await;

        assert!(result.is_err());
        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.status, Some(MonitorStatus::Error));
    }

    #[tokio::test]
    async fn failed_error_write_still_returns_the_check_error() {
        let store = Arc::new(RecordingStore {
            fail_updates: true,
            ..RecordingStore::default()
        });
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(None, store, messenger);

        let error = checker
            .check(&target(None, MonitorStatus::Unset))
            .await
            .unwrap_err();

        assert!(error.to_string().contains(".price"));
    }
}
