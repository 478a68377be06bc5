//! Bitable-backed [`RecordStore`] implementation.
//!
//! Translates between raw Bitable field maps and the domain models.
//! Text cells arrive either as plain strings or as rich-text segment
//! arrays; dates travel as epoch milliseconds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::lark::{LarkClient, LarkEnv, Record};
use crate::models::{
    DiscoveredEvent, DiscoveryRule, EventFields, MonitorStatus, MonitorTarget, MonitorUpdate,
    NewMonitor,
};
use crate::store::RecordStore;

/// Record store reading and writing three Bitable tables.
pub struct LarkStore {
    client: Arc<LarkClient>,
    monitors_table: String,
    discovery_table: String,
    events_table: String,
}

impl LarkStore {
    pub fn new(client: Arc<LarkClient>, env: &LarkEnv) -> Self {
        Self {
            client,
            monitors_table: env.monitors_table.clone(),
            discovery_table: env.discovery_table.clone(),
            events_table: env.events_table.clone(),
        }
    }
}

#[async_trait]
impl RecordStore for LarkStore {
    async fn list_monitors(&self) -> Result<Vec<MonitorTarget>> {
        let records = self.client.list_records(&self.monitors_table).await?;
        Ok(records.iter().map(monitor_from_record).collect())
    }

    async fn get_monitor(&self, id: &str) -> Result<Option<MonitorTarget>> {
        let record = self.client.get_record(&self.monitors_table, id).await?;
        Ok(record.as_ref().map(monitor_from_record))
    }

    async fn create_monitor(&self, monitor: &NewMonitor) -> Result<String> {
        let record = self
            .client
            .create_record(&self.monitors_table, new_monitor_fields(monitor))
            .await?;
        Ok(record.record_id)
    }

    async fn update_monitor(&self, id: &str, update: &MonitorUpdate) -> Result<()> {
        self.client
            .update_record(&self.monitors_table, id, monitor_update_fields(update))
            .await
    }

    async fn delete_monitor(&self, id: &str) -> Result<()> {
        self.client.delete_record(&self.monitors_table, id).await
    }

    async fn list_rules(&self) -> Result<Vec<DiscoveryRule>> {
        let records = self.client.list_records(&self.discovery_table).await?;
        Ok(records.iter().map(rule_from_record).collect())
    }

    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>> {
        let records = self.client.list_records(&self.events_table).await?;
        Ok(records.iter().map(event_from_record).collect())
    }

    async fn find_event_by_url(&self, url: &str) -> Result<Option<DiscoveredEvent>> {
        let matches = self
            .client
            .search_records(&self.events_table, "URL", url)
            .await?;
        Ok(matches.first().map(event_from_record))
    }

    async fn create_event(&self, fields: &EventFields) -> Result<()> {
        self.client
            .create_record(&self.events_table, event_fields(fields, true))
            .await?;
        Ok(())
    }

    async fn update_event(&self, id: &str, fields: &EventFields) -> Result<()> {
        self.client
            .update_record(&self.events_table, id, event_fields(fields, false))
            .await
    }
}

/// Text cell content, whether stored as a string or rich-text segments.
/// Empty text maps to `None`.
fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    let value = fields.get(name)?;
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(segments) => segments
            .iter()
            .filter_map(|segment| segment.get("text").and_then(Value::as_str))
            .collect(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

fn bool_field(fields: &Map<String, Value>, name: &str) -> bool {
    fields.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// Numeric cell as epoch milliseconds. Bitable serializes some numbers
/// as floats.
fn millis_field(fields: &Map<String, Value>, name: &str) -> Option<i64> {
    let value = fields.get(name)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn datetime_field(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    millis_field(fields, name).and_then(DateTime::from_timestamp_millis)
}

fn date_field(fields: &Map<String, Value>, name: &str) -> Option<NaiveDate> {
    datetime_field(fields, name).map(|dt| dt.date_naive())
}

fn date_to_millis(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp_millis()
}

/// Date cell payload; `None` clears the cell.
fn date_value(date: Option<NaiveDate>) -> Value {
    match date {
        Some(d) => json!(date_to_millis(d)),
        None => Value::Null,
    }
}

fn monitor_from_record(record: &Record) -> MonitorTarget {
    let fields = &record.fields;
    MonitorTarget {
        id: record.record_id.clone(),
        label: text_field(fields, "Label"),
        url: text_field(fields, "URL"),
        selector: text_field(fields, "Selector"),
        last_fingerprint: text_field(fields, "LastHash"),
        last_checked_at: datetime_field(fields, "LastChecked"),
        status: MonitorStatus::from_field(text_field(fields, "Status").as_deref()),
        error_message: text_field(fields, "ErrorMessage"),
    }
}

fn rule_from_record(record: &Record) -> DiscoveryRule {
    let fields = &record.fields;
    DiscoveryRule {
        id: record.record_id.clone(),
        label: text_field(fields, "Label"),
        source_url: text_field(fields, "SourceURL"),
        link_selector: text_field(fields, "LinkSelector"),
        url_pattern: text_field(fields, "URLPattern"),
        target_selector: text_field(fields, "TargetSelector"),
        is_active: bool_field(fields, "IsActive"),
    }
}

fn event_from_record(record: &Record) -> DiscoveredEvent {
    let fields = &record.fields;
    DiscoveredEvent {
        id: record.record_id.clone(),
        title: text_field(fields, "EventTitle"),
        url: text_field(fields, "URL"),
        start_date: date_field(fields, "StartDate"),
        end_date: date_field(fields, "EndDate"),
        last_fingerprint: text_field(fields, "LastHash"),
        found_at: datetime_field(fields, "FoundAt"),
    }
}

fn new_monitor_fields(monitor: &NewMonitor) -> Value {
    json!({
        "Label": monitor.label.clone().unwrap_or_default(),
        "URL": monitor.url,
        "Selector": monitor.selector
    })
}

/// Build the write payload for a partial monitor update. `None` fields
/// are omitted so the store leaves them untouched; an explicit
/// `Some(None)` date clears the cell.
fn monitor_update_fields(update: &MonitorUpdate) -> Value {
    let mut fields = Map::new();
    if let Some(fingerprint) = &update.last_fingerprint {
        fields.insert("LastHash".into(), json!(fingerprint));
    }
    if let Some(checked_at) = update.last_checked_at {
        fields.insert("LastChecked".into(), json!(checked_at.timestamp_millis()));
    }
    if let Some(status) = update.status {
        fields.insert("Status".into(), json!(status.as_str()));
    }
    if let Some(message) = &update.error_message {
        fields.insert("ErrorMessage".into(), json!(message));
    }
    if let Some(start) = update.start_date {
        fields.insert("StartDate".into(), date_value(start));
    }
    if let Some(end) = update.end_date {
        fields.insert("EndDate".into(), date_value(end));
    }
    Value::Object(fields)
}

/// Build the write payload for an event record. `FoundAt` is stamped on
/// create only so refreshes keep the first sighting time.
fn event_fields(event: &EventFields, include_found_at: bool) -> Value {
    let mut fields = Map::new();
    fields.insert("EventTitle".into(), json!(event.title));
    fields.insert("URL".into(), json!(event.url));
    fields.insert("StartDate".into(), date_value(event.start_date));
    fields.insert("EndDate".into(), date_value(event.end_date));
    fields.insert("LastHash".into(), json!(event.fingerprint));
    if include_found_at {
        fields.insert("FoundAt".into(), json!(event.found_at.timestamp_millis()));
    }
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dates::DateRange;

    fn record(fields: Value) -> Record {
        serde_json::from_value(json!({ "record_id": "rec1", "fields": fields })).unwrap()
    }

    #[test]
    fn text_field_reads_strings_and_segments() {
        let rec = record(json!({
            "URL": "https://example.com",
            "Label": [{"text": "春の"}, {"text": "セール"}],
            "Empty": "",
            "Numeric": 42,
        }));
        assert_eq!(
            text_field(&rec.fields, "URL").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(text_field(&rec.fields, "Label").as_deref(), Some("春のセール"));
        assert_eq!(text_field(&rec.fields, "Empty"), None);
        assert_eq!(text_field(&rec.fields, "Numeric"), None);
        assert_eq!(text_field(&rec.fields, "Missing"), None);
    }

    #[test]
    fn monitor_decodes_status_and_timestamps() {
        let rec = record(json!({
            "Label": "ステータスページ",
            "URL": "https://status.example.com",
            "Selector": ".page-status",
            "LastHash": "abc123",
            "LastChecked": 1700000000000u64,
            "Status": "Error",
            "ErrorMessage": "Timeout fetching https://status.example.com (10s)",
        }));
        let target = monitor_from_record(&rec);
        assert_eq!(target.id, "rec1");
        assert_eq!(target.status, MonitorStatus::Error);
        assert_eq!(
            target.last_checked_at.map(|dt| dt.timestamp_millis()),
            Some(1700000000000)
        );
        assert!(target.error_message.is_some());
    }

    #[test]
    fn monitor_with_blank_status_is_unset() {
        let rec = record(json!({ "URL": "https://example.com" }));
        let target = monitor_from_record(&rec);
        assert_eq!(target.status, MonitorStatus::Unset);
        assert!(target.last_fingerprint.is_none());
        assert!(target.error_message.is_none());
    }

    #[test]
    fn rule_missing_checkbox_is_inactive() {
        let rec = record(json!({ "Label": "rule", "SourceURL": "https://example.com" }));
        assert!(!rule_from_record(&rec).is_active);

        let active = record(json!({ "IsActive": true }));
        assert!(rule_from_record(&active).is_active);
    }

    #[test]
    fn event_dates_decode_from_millis() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let rec = record(json!({
            "EventTitle": "春の大感謝祭",
            "URL": "https://shop.example.com/sale/101",
            "StartDate": date_to_millis(date),
            "LastHash": "f00",
        }));
        let event = event_from_record(&rec);
        assert_eq!(event.start_date, Some(date));
        assert_eq!(event.end_date, None);
        assert_eq!(event.title.as_deref(), Some("春の大感謝祭"));
    }

    #[test]
    fn changed_update_writes_every_field() {
        let dates = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 3, 3),
            end: None,
        };
        let update = MonitorUpdate::changed("abc".into(), Utc::now(), &dates);
        let payload = monitor_update_fields(&update);
        let obj = payload.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert_eq!(obj["Status"], json!("OK"));
        assert_eq!(obj["ErrorMessage"], json!(""));
        assert!(obj["StartDate"].is_i64());
        assert!(obj["EndDate"].is_null());
    }

    #[test]
    fn recovery_update_touches_only_status_fields() {
        let payload = monitor_update_fields(&MonitorUpdate::recovered());
        let obj = payload.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["Status"], json!("OK"));
        assert_eq!(obj["ErrorMessage"], json!(""));
    }

    #[test]
    fn errored_update_keeps_fingerprint_and_dates_untouched() {
        let update = MonitorUpdate::errored(Utc::now(), "boom".into());
        let payload = monitor_update_fields(&update);
        let obj = payload.as_object().unwrap();
        assert!(!obj.contains_key("LastHash"));
        assert!(!obj.contains_key("StartDate"));
        assert_eq!(obj["Status"], json!("Error"));
        assert_eq!(obj["ErrorMessage"], json!("boom"));
    }

    #[test]
    fn found_at_is_written_on_create_only() {
        let event = EventFields {
            title: "新春セール".into(),
            url: "https://shop.example.com/sale/7".into(),
            start_date: None,
            end_date: None,
            fingerprint: "abc".into(),
            found_at: Utc::now(),
        };
        let created = event_fields(&event, true);
        let updated = event_fields(&event, false);
        assert!(created.as_object().unwrap().contains_key("FoundAt"));
        assert!(!updated.as_object().unwrap().contains_key("FoundAt"));
        assert!(created.as_object().unwrap()["StartDate"].is_null());
    }

    #[test]
    fn dates_round_trip_through_millis() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let rec = record(json!({ "StartDate": date_to_millis(date) }));
        assert_eq!(date_field(&rec.fields, "StartDate"), Some(date));
    }
}
