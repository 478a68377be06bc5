//! Lark OpenAPI access: environment wiring, tenant auth, and the raw
//! record/message endpoints the store and messenger adapters build on.

use std::env;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, header};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, Result};

const DEFAULT_API_BASE: &str = "https://open.larksuite.com";
const PAGE_SIZE: u32 = 500;
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;
const RECORD_NOT_FOUND_CODE: i64 = 1254043;

/// Connection settings resolved from the process environment.
#[derive(Debug, Clone)]
pub struct LarkEnv {
    pub app_id: String,
    pub app_secret: String,
    pub api_base: String,
    /// Bitable app token, parsed out of `LARK_BASE_URL`
    pub base_id: String,
    /// Monitor table id, parsed out of `LARK_BASE_URL`
    pub monitors_table: String,
    pub discovery_table: String,
    pub events_table: String,
    /// Chat to notify; notifications are skipped when unset
    pub notify_chat_id: Option<String>,
}

impl LarkEnv {
    /// Read `LARK_APP_ID`, `LARK_APP_SECRET`, `LARK_BASE_URL`,
    /// `LARK_DISCOVERY_TABLE`, `LARK_EVENTS_TABLE`, and the optional
    /// `LARK_NOTIFY_CHAT_ID` / `LARK_API_BASE` overrides.
    pub fn from_env() -> Result<Self> {
        let app_id = require_env("LARK_APP_ID")?;
        let app_secret = require_env("LARK_APP_SECRET")?;

        let base_url = require_env("LARK_BASE_URL")?;
        let (base_id, monitors_table) = extract_base_and_table_ids(&base_url);
        if base_id.is_empty() || monitors_table.is_empty() {
            return Err(AppError::config(
                "LARK_BASE_URL must contain a base id segment and a table query parameter",
            ));
        }

        Ok(Self {
            app_id,
            app_secret,
            api_base: env::var("LARK_API_BASE")
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            base_id,
            monitors_table,
            discovery_table: require_env("LARK_DISCOVERY_TABLE")?,
            events_table: require_env("LARK_EVENTS_TABLE")?,
            notify_chat_id: env::var("LARK_NOTIFY_CHAT_ID")
                .ok()
                .filter(|value| !value.is_empty()),
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::config(format!("{name} is not set")))
}

/// Pull the base id and table id out of a Bitable share URL.
///
/// The base id is the path segment following `base` (case-insensitive);
/// the table id comes from the `table` query parameter. Either may come
/// back empty when the URL lacks it.
pub fn extract_base_and_table_ids(url: &str) -> (String, String) {
    if url.is_empty() {
        return (String::new(), String::new());
    }

    let (path_part, query_part) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };

    let table_id = url::form_urlencoded::parse(query_part.as_bytes())
        .find(|(key, _)| key == "table")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    let segments: Vec<&str> = path_part.split('/').filter(|s| !s.is_empty()).collect();
    let base_id = segments
        .iter()
        .position(|segment| segment.eq_ignore_ascii_case("base"))
        .and_then(|index| segments.get(index + 1))
        .map(|segment| segment.to_string())
        .unwrap_or_default();

    (base_id, table_id)
}

/// One Bitable row: record id plus its raw field map.
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    pub record_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    items: Option<Vec<Record>>,
    has_more: Option<bool>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordData {
    record: Record,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    expire: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Authenticated Lark OpenAPI client with a cached tenant token.
pub struct LarkClient {
    http: Client,
    api_base: String,
    base_id: String,
    app_id: String,
    app_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl LarkClient {
    pub fn new(env: &LarkEnv) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: env.api_base.clone(),
            base_id: env.base_id.clone(),
            app_id: env.app_id.clone(),
            app_secret: env.app_secret.clone(),
            token: Mutex::new(None),
        })
    }

    /// Fetch or reuse the tenant access token. Tokens are refreshed one
    /// minute before their server-reported expiry.
    async fn tenant_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        let endpoint = "/open-apis/auth/v3/tenant_access_token/internal";
        debug!("Requesting a fresh tenant access token");
        let body = json!({ "app_id": self.app_id, "app_secret": self.app_secret });
        let response = self
            .http
            .post(format!("{}{endpoint}", self.api_base))
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body)?)
            .send()
            .await?;
        let payload: TokenResponse = serde_json::from_str(&response.text().await?)?;

        if payload.code != 0 {
            return Err(AppError::lark(
                endpoint,
                format!("code {}: {}", payload.code, payload.msg),
            ));
        }
        let token = payload
            .tenant_access_token
            .ok_or_else(|| AppError::lark(endpoint, "token missing from response"))?;

        let lifetime = payload
            .expire
            .unwrap_or(0)
            .saturating_sub(TOKEN_REFRESH_MARGIN_SECS as i64)
            .max(0) as u64;
        *guard = Some(CachedToken {
            value: token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        Ok(token)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Envelope> {
        let token = self.tenant_token().await?;
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.api_base))
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        if let Some(body) = &body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_string(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        // Business failures arrive as an envelope code whatever the HTTP
        // status, so prefer the envelope when the body parses as one.
        match serde_json::from_str(&text) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => {
                Err(AppError::lark(path, format!("HTTP {status}: {text}")))
            }
            Err(parse_error) => Err(AppError::Json(parse_error)),
        }
    }

    /// Issue a call and unwrap the success envelope.
    async fn data(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let envelope = self.call(method, path, body).await?;
        if envelope.code != 0 {
            return Err(AppError::lark(
                path,
                format!("code {}: {}", envelope.code, envelope.msg),
            ));
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    fn records_path(&self, table_id: &str) -> String {
        format!(
            "/open-apis/bitable/v1/apps/{}/tables/{table_id}/records",
            self.base_id
        )
    }

    /// List every row of a table, following pagination.
    pub async fn list_records(&self, table_id: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut path = format!("{}?page_size={PAGE_SIZE}", self.records_path(table_id));
            if let Some(token) = &page_token {
                path.push_str(&format!("&page_token={token}"));
            }

            let data = self.data(Method::GET, &path, None).await?;
            let page: RecordPage = serde_json::from_value(data)?;
            records.extend(page.items.unwrap_or_default());

            match (page.has_more.unwrap_or(false), page.page_token) {
                (true, Some(token)) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Fetch one row by record id, mapping the API's not-found code to
    /// `None`.
    pub async fn get_record(&self, table_id: &str, record_id: &str) -> Result<Option<Record>> {
        let path = format!("{}/{record_id}", self.records_path(table_id));
        let envelope = self.call(Method::GET, &path, None).await?;
        if envelope.code == RECORD_NOT_FOUND_CODE {
            return Ok(None);
        }
        if envelope.code != 0 {
            return Err(AppError::lark(
                &path,
                format!("code {}: {}", envelope.code, envelope.msg),
            ));
        }
        let data: RecordData = serde_json::from_value(envelope.data.unwrap_or(Value::Null))?;
        Ok(Some(data.record))
    }

    /// Create a row and return it.
    pub async fn create_record(&self, table_id: &str, fields: Value) -> Result<Record> {
        let path = self.records_path(table_id);
        let data = self
            .data(Method::POST, &path, Some(json!({ "fields": fields })))
            .await?;
        let created: RecordData = serde_json::from_value(data)?;
        Ok(created.record)
    }

    /// Shallow-merge `fields` into a row.
    pub async fn update_record(
        &self,
        table_id: &str,
        record_id: &str,
        fields: Value,
    ) -> Result<()> {
        let path = format!("{}/{record_id}", self.records_path(table_id));
        self.data(Method::PUT, &path, Some(json!({ "fields": fields })))
            .await?;
        Ok(())
    }

    /// Delete a row.
    pub async fn delete_record(&self, table_id: &str, record_id: &str) -> Result<()> {
        let path = format!("{}/{record_id}", self.records_path(table_id));
        self.data(Method::DELETE, &path, None).await?;
        Ok(())
    }

    /// Rows whose text field `field_name` equals `value` exactly.
    pub async fn search_records(
        &self,
        table_id: &str,
        field_name: &str,
        value: &str,
    ) -> Result<Vec<Record>> {
        let path = format!("{}/search", self.records_path(table_id));
        let body = json!({
            "filter": {
                "conjunction": "and",
                "conditions": [{
                    "field_name": field_name,
                    "operator": "is",
                    "value": [value]
                }]
            }
        });
        let page: RecordPage =
            serde_json::from_value(self.data(Method::POST, &path, Some(body)).await?)?;
        Ok(page.items.unwrap_or_default())
    }

    /// Send a message. `content` is serialized into the string payload
    /// the messaging endpoint expects.
    pub async fn send_message(
        &self,
        receive_id_type: &str,
        receive_id: &str,
        msg_type: &str,
        content: &Value,
    ) -> Result<()> {
        let path = format!("/open-apis/im/v1/messages?receive_id_type={receive_id_type}");
        let body = json!({
            "receive_id": receive_id,
            "msg_type": msg_type,
            "content": serde_json::to_string(content)?
        });
        self.data(Method::POST, &path, Some(body)).await?;
        Ok(())
    }
}
