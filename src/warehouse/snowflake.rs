use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Number, Value};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Connection, SqlParam, Warehouse};
use crate::{config::WarehouseConfig, error::WarehouseError, table::Table};

const SESSION_EXPIRED_CODE: &str = "390112";
const QUERY_IN_PROGRESS_CODES: [&str; 2] = ["333333", "333334"];
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Snowflake over its connector REST protocol: password login, synchronous
/// query requests with positional bindings and chunked result download.
pub struct SnowflakeWarehouse {
    config: WarehouseConfig,
    http: Client,
    session: RwLock<Option<Arc<Connection>>>,
    sequence: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl Envelope {
    fn failure_message(&self) -> String {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "request was not successful".to_string());
        match &self.code {
            Some(code) => format!("{message} (code {code})"),
            None => message,
        }
    }

    fn decode_data<T: DeserializeOwned>(self) -> Result<T, String> {
        let data = self.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    token: String,
    #[serde(default)]
    session_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<ColumnType>,
    #[serde(default)]
    rowset: Vec<Vec<Value>>,
    #[serde(default)]
    chunks: Vec<ResultChunk>,
    #[serde(default)]
    chunk_headers: HashMap<String, String>,
    #[serde(default)]
    qrmk: Option<String>,
    #[serde(default)]
    query_result_format: Option<String>,
    #[serde(default)]
    query_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultChunk {
    url: String,
    #[serde(default)]
    row_count: usize,
}

impl SnowflakeWarehouse {
    pub fn new(config: WarehouseConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("retail-intel-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build warehouse HTTP client")?;

        Ok(Self {
            config,
            http,
            session: RwLock::new(None),
            sequence: AtomicU64::new(1),
        })
    }

    fn account_name(&self) -> &str {
        self.config
            .account
            .split('.')
            .next()
            .unwrap_or(&self.config.account)
    }

    async fn login(&self) -> Result<Connection, WarehouseError> {
        let url = format!("{}/session/v1/login-request", self.config.base_url());
        let mut query = vec![("requestId", Uuid::new_v4().to_string())];
        for (key, value) in [
            ("warehouse", self.config.warehouse.as_str()),
            ("databaseName", self.config.database.as_str()),
            ("schemaName", self.config.schema.as_str()),
            ("roleName", self.config.role.as_deref().unwrap_or_default()),
        ] {
            if !value.is_empty() {
                query.push((key, value.to_string()));
            }
        }

        let body = json!({
            "data": {
                "CLIENT_APP_ID": "retail-intel-hub",
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": self.account_name(),
                "LOGIN_NAME": self.config.user,
                "PASSWORD": self.config.password,
                "SESSION_PARAMETERS": {
                    "JDBC_QUERY_RESULT_FORMAT": "JSON",
                    "PYTHON_CONNECTOR_QUERY_RESULT_FORMAT": "JSON"
                }
            }
        });

        let response = self
            .http
            .post(&url)
            .query(&query)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| WarehouseError::Connection(format!("warehouse unreachable: {err}")))?;

        let status = response.status();
        let envelope = response.json::<Envelope>().await.map_err(|err| {
            WarehouseError::Connection(format!("login response (HTTP {status}) unreadable: {err}"))
        })?;

        if !envelope.success {
            return Err(WarehouseError::Connection(envelope.failure_message()));
        }

        let login: LoginData = envelope
            .decode_data()
            .map_err(|err| WarehouseError::Connection(format!("login response malformed: {err}")))?;

        info!(
            account = %self.account_name(),
            session_id = ?login.session_id,
            "Warehouse session established"
        );
        Ok(Connection::new(login.token, login.session_id))
    }

    async fn drop_session(&self) {
        let mut session = self.session.write().await;
        if session.take().is_some() {
            warn!("Warehouse session expired; it will be re-established on next use");
        }
    }

    async fn post_query(
        &self,
        connection: &Connection,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Envelope, WarehouseError> {
        let url = format!("{}/queries/v1/query-request", self.config.base_url());
        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": sequence_id,
            "querySubmissionTime": Utc::now().timestamp_millis(),
        });
        if !params.is_empty() {
            let bindings: Map<String, Value> = params
                .iter()
                .enumerate()
                .map(|(idx, param)| ((idx + 1).to_string(), param.binding()))
                .collect();
            body["bindings"] = Value::Object(bindings);
        }

        let response = self
            .http
            .post(&url)
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .header(AUTHORIZATION, session_header(connection))
            .header(ACCEPT, "application/snowflake")
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        decode_envelope(response).await
    }

    async fn poll_result(
        &self,
        connection: &Connection,
        mut envelope: Envelope,
    ) -> Result<Envelope, WarehouseError> {
        let deadline = Instant::now() + self.config.request_timeout();

        while envelope
            .code
            .as_deref()
            .is_some_and(|code| QUERY_IN_PROGRESS_CODES.contains(&code))
        {
            let result_path = envelope
                .data
                .as_ref()
                .and_then(|data| data.get("getResultUrl"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| WarehouseError::Query("query in progress without result url".into()))?;

            if Instant::now() >= deadline {
                return Err(WarehouseError::Query(format!(
                    "query still running after {}s",
                    self.config.request_timeout_seconds
                )));
            }
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;

            let url = format!("{}{}", self.config.base_url(), result_path);
            let response = self
                .http
                .get(&url)
                .header(AUTHORIZATION, session_header(connection))
                .header(ACCEPT, "application/snowflake")
                .send()
                .await
                .map_err(classify_transport_error)?;
            envelope = decode_envelope(response).await?;
        }

        Ok(envelope)
    }

    async fn fetch_chunks(&self, data: &QueryData) -> Result<Vec<Vec<Value>>, WarehouseError> {
        let mut rows = Vec::new();

        for (idx, chunk) in data.chunks.iter().enumerate() {
            let mut request = self.http.get(&chunk.url);
            if data.chunk_headers.is_empty() {
                if let Some(qrmk) = &data.qrmk {
                    request = request
                        .header("x-amz-server-side-encryption-customer-algorithm", "AES256")
                        .header("x-amz-server-side-encryption-customer-key", qrmk);
                }
            } else {
                for (name, value) in &data.chunk_headers {
                    request = request.header(name.as_str(), value.as_str());
                }
            }

            let response = request.send().await.map_err(classify_transport_error)?;
            if !response.status().is_success() {
                return Err(WarehouseError::Query(format!(
                    "result chunk {idx} download failed with HTTP {}",
                    response.status()
                )));
            }
            let raw = response
                .text()
                .await
                .map_err(|err| WarehouseError::Query(format!("result chunk {idx} unreadable: {err}")))?;

            // Chunks are comma-separated row arrays without the enclosing brackets.
            let parsed: Vec<Vec<Value>> = serde_json::from_str(&format!("[{raw}]"))
                .map_err(|err| WarehouseError::Query(format!("result chunk {idx} malformed: {err}")))?;
            debug!(chunk = idx, expected = chunk.row_count, rows = parsed.len(), "Result chunk downloaded");
            rows.extend(parsed);
        }

        Ok(rows)
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn acquire_connection(&self) -> Result<Arc<Connection>, WarehouseError> {
        if let Some(existing) = self.session.read().await.as_ref() {
            return Ok(existing.clone());
        }

        let mut session = self.session.write().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.clone());
        }

        let connection = Arc::new(self.login().await?);
        *session = Some(connection.clone());
        Ok(connection)
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Table, WarehouseError> {
        let connection = self.acquire_connection().await?;

        let envelope = self.post_query(&connection, sql, params).await?;
        let envelope = self.poll_result(&connection, envelope).await?;

        if !envelope.success {
            if envelope.code.as_deref() == Some(SESSION_EXPIRED_CODE) {
                self.drop_session().await;
                return Err(WarehouseError::Connection(envelope.failure_message()));
            }
            return Err(WarehouseError::Query(envelope.failure_message()));
        }

        let data: QueryData = envelope
            .decode_data()
            .map_err(|err| WarehouseError::Query(format!("query response malformed: {err}")))?;

        if let Some(format) = &data.query_result_format {
            if !format.eq_ignore_ascii_case("json") {
                return Err(WarehouseError::Query(format!(
                    "unsupported result format `{format}`"
                )));
            }
        }

        let mut raw_rows = data.rowset.clone();
        raw_rows.extend(self.fetch_chunks(&data).await?);

        let columns = data.rowtype.iter().map(|c| c.name.clone()).collect();
        let rows = raw_rows
            .iter()
            .map(|row| {
                data.rowtype
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| decode_cell(row.get(idx).unwrap_or(&Value::Null), column))
                    .collect()
            })
            .collect();

        debug!(query_id = ?data.query_id, rows = raw_rows.len(), "Warehouse query finished");
        Ok(Table::new(columns, rows))
    }

    async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn close(&self) {
        let Some(connection) = self.session.write().await.take() else {
            return;
        };

        let url = format!("{}/session", self.config.base_url());
        let request_id = Uuid::new_v4().to_string();
        let result = self
            .http
            .post(&url)
            .query(&[("delete", "true"), ("requestId", request_id.as_str())])
            .header(AUTHORIZATION, session_header(&connection))
            .header(ACCEPT, "application/json")
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                info!(session_id = ?connection.session_id(), "Warehouse session closed")
            }
            Ok(response) => warn!(status = %response.status(), "Warehouse logout was not acknowledged"),
            Err(err) => warn!("Warehouse logout failed: {err}"),
        }
    }
}

fn session_header(connection: &Connection) -> String {
    format!("Snowflake Token=\"{}\"", connection.token())
}

fn classify_transport_error(err: reqwest::Error) -> WarehouseError {
    if err.is_connect() {
        WarehouseError::Connection(format!("warehouse unreachable: {err}"))
    } else {
        WarehouseError::Query(format!("warehouse request failed: {err}"))
    }
}

async fn decode_envelope(response: reqwest::Response) -> Result<Envelope, WarehouseError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(WarehouseError::Connection(
            "warehouse rejected the session token".to_string(),
        ));
    }
    response
        .json::<Envelope>()
        .await
        .map_err(|err| WarehouseError::Query(format!("response (HTTP {status}) unreadable: {err}")))
}

fn decode_cell(raw: &Value, column: &ColumnType) -> Value {
    let text = match raw {
        Value::Null => return Value::Null,
        Value::String(text) => text.as_str(),
        other => return other.clone(),
    };

    match column.kind.as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| float_cell(text)),
        "fixed" | "real" => float_cell(text),
        "boolean" => Value::Bool(matches!(text, "1" | "true" | "TRUE")),
        "date" => text
            .parse::<i64>()
            .ok()
            .and_then(|days| DateTime::from_timestamp(days * 86_400, 0))
            .map(|ts| Value::String(ts.date_naive().format("%Y-%m-%d").to_string()))
            .unwrap_or_else(|| Value::String(text.to_string())),
        kind if kind.starts_with("timestamp") => epoch_to_rfc3339(text)
            .map(Value::String)
            .unwrap_or_else(|| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

fn float_cell(text: &str) -> Value {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

// timestamp_tz cells carry a trailing " <offset minutes>"; the instant is the first token.
fn epoch_to_rfc3339(text: &str) -> Option<String> {
    let instant = text.split_whitespace().next()?;
    let (secs, frac) = instant.split_once('.').unwrap_or((instant, "0"));
    let secs = secs.parse::<i64>().ok()?;
    let nanos = format!("{frac:0<9}").get(..9)?.parse::<u32>().ok()?;
    DateTime::from_timestamp(secs, nanos).map(|ts| ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: &str, scale: Option<i64>) -> ColumnType {
        ColumnType {
            name: "C".to_string(),
            kind: kind.to_string(),
            scale,
        }
    }

    #[test]
    fn fixed_cells_respect_scale() {
        assert_eq!(decode_cell(&json!("42"), &column("fixed", Some(0))), json!(42));
        assert_eq!(decode_cell(&json!("42.50"), &column("fixed", Some(2))), json!(42.5));
    }

    #[test]
    fn date_cells_are_epoch_days() {
        assert_eq!(
            decode_cell(&json!("19723"), &column("date", None)),
            json!("2024-01-01")
        );
    }

    #[test]
    fn timestamp_cells_become_rfc3339() {
        assert_eq!(
            decode_cell(&json!("1704067200.500000000"), &column("timestamp_ntz", None)),
            json!("2024-01-01T00:00:00.500+00:00")
        );
        assert_eq!(
            decode_cell(&json!("1704067200.000000000 1440"), &column("timestamp_tz", None)),
            json!("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn nulls_and_text_pass_through() {
        assert_eq!(decode_cell(&Value::Null, &column("fixed", Some(0))), Value::Null);
        assert_eq!(decode_cell(&json!("IN_STOCK"), &column("text", None)), json!("IN_STOCK"));
        assert_eq!(decode_cell(&json!("1"), &column("boolean", None)), json!(true));
    }

    #[test]
    fn failed_envelope_reports_code() {
        let envelope: Envelope = serde_json::from_value(json!({
            "data": { "errorCode": "002003" },
            "success": false,
            "message": "Object 'SALES' does not exist",
            "code": "002003"
        }))
        .expect("envelope");
        assert_eq!(
            envelope.failure_message(),
            "Object 'SALES' does not exist (code 002003)"
        );
    }

    #[test]
    fn account_locator_drops_region_suffix() {
        let warehouse = SnowflakeWarehouse::new(WarehouseConfig {
            account: "xy12345.us-east-1".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
            warehouse: String::new(),
            database: String::new(),
            schema: String::new(),
            role: None,
            host: "xy12345.us-east-1.snowflakecomputing.com".to_string(),
            request_timeout_seconds: 5,
        })
        .expect("client");
        assert_eq!(warehouse.account_name(), "xy12345");
    }
}
