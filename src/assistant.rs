use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    cache::QueryService,
    config::AssistantConfig,
    error::{AssistantError, WarehouseError},
    limits::{RowLimits, SessionLimits},
    models::{AskResponse, ChatMessage, ChatRole, MessageContent, QueryOutcome},
    table::Table,
    warehouse::{ensure_read_only, Warehouse},
};

pub const SUGGESTIONS: [&str; 6] = [
    "What are the top 10 products by revenue this quarter?",
    "Show me sales trends for the last 6 months",
    "Which customer segment generates the most revenue?",
    "Compare our prices with competitor benchmarks",
    "What is the average order value by payment method?",
    "Show inventory status for products out of stock",
];

const REQUEST_ID_HEADER: &str = "X-Snowflake-Request-Id";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalystContent {
    Text {
        text: String,
    },
    Suggestions {
        #[serde(default)]
        suggestions: Vec<String>,
    },
    Sql {
        statement: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalystReply {
    pub request_id: Option<String>,
    pub content: Vec<AnalystContent>,
}

#[derive(Debug, Deserialize)]
struct AnalystResponse {
    message: AnalystMessage,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalystMessage {
    #[serde(default)]
    content: Vec<AnalystContent>,
}

/// Natural-language-to-SQL backend.
#[async_trait]
pub trait AnalystService: Send + Sync {
    async fn send(&self, prompt: &str) -> Result<AnalystReply, AssistantError>;
}

pub struct CortexAnalystClient {
    config: AssistantConfig,
    http: Client,
    warehouse: Arc<dyn Warehouse>,
}

impl CortexAnalystClient {
    pub fn new(config: AssistantConfig, warehouse: Arc<dyn Warehouse>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("retail-intel-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build analyst HTTP client")?;
        Ok(Self {
            config,
            http,
            warehouse,
        })
    }
}

fn request_body(prompt: &str, semantic_view: &str) -> Value {
    json!({
        "messages": [{
            "role": "user",
            "content": [{"type": "text", "text": prompt}]
        }],
        "semantic_view": semantic_view
    })
}

fn transport_error(err: reqwest::Error) -> AssistantError {
    if err.is_timeout() {
        AssistantError::Timeout
    } else {
        AssistantError::Transport(err.to_string())
    }
}

#[async_trait]
impl AnalystService for CortexAnalystClient {
    async fn send(&self, prompt: &str) -> Result<AnalystReply, AssistantError> {
        let connection = self.warehouse.acquire_connection().await?;

        let response = self
            .http
            .post(self.config.endpoint())
            .header(
                AUTHORIZATION,
                format!("Snowflake Token=\"{}\"", connection.token()),
            )
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&request_body(prompt, &self.config.semantic_view))
            .send()
            .await
            .map_err(transport_error)?;

        let header_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Status {
                request_id: header_id.unwrap_or_else(|| "unknown".to_string()),
                status: status.as_u16(),
                body,
            });
        }

        let payload: AnalystResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                AssistantError::Timeout
            } else {
                AssistantError::Decode(err.to_string())
            }
        })?;

        Ok(AnalystReply {
            request_id: header_id.or(payload.request_id),
            content: payload.message.content,
        })
    }
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("data_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

struct Session {
    messages: Vec<ChatMessage>,
    last_active: Instant,
}

impl Session {
    fn produced(&self, statement: &str) -> bool {
        let statement = statement.trim();
        self.messages
            .iter()
            .filter(|message| message.role == ChatRole::Analyst)
            .flat_map(|message| &message.content)
            .any(|item| matches!(item, MessageContent::Sql { statement: sql, .. } if sql.trim() == statement))
    }
}

/// Conversation histories that expire after an idle period, least recently
/// active first once capacity is reached.
struct Conversations {
    limits: SessionLimits,
    order: VecDeque<String>,
    sessions: HashMap<String, Session>,
}

impl Conversations {
    fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            order: VecDeque::new(),
            sessions: HashMap::new(),
        }
    }

    fn get(&mut self, id: &str) -> Option<&Session> {
        self.evict();
        if !self.sessions.contains_key(id) {
            return None;
        }
        self.touch(id);
        self.sessions.get(id)
    }

    fn push(&mut self, id: &str, message: ChatMessage) {
        self.evict();
        match self.sessions.get_mut(id) {
            Some(session) => session.messages.push(message),
            None => {
                self.sessions.insert(
                    id.to_string(),
                    Session {
                        messages: vec![message],
                        last_active: Instant::now(),
                    },
                );
                self.order.push_back(id.to_string());
            }
        }
        self.touch(id);
        self.evict();
    }

    fn remove(&mut self, id: &str) -> bool {
        self.order.retain(|key| key != id);
        self.sessions.remove(id).is_some()
    }

    fn touch(&mut self, id: &str) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.last_active = Instant::now();
        }
        if let Some(pos) = self.order.iter().position(|key| key == id) {
            self.order.remove(pos);
            self.order.push_back(id.to_string());
        }
    }

    /// `order` runs from least to most recently active.
    fn evict(&mut self) {
        while let Some(oldest) = self.order.front() {
            let idle = self
                .sessions
                .get(oldest)
                .map_or(true, |session| session.last_active.elapsed() >= self.limits.idle_ttl);
            if !idle && self.sessions.len() <= self.limits.capacity {
                break;
            }
            if let Some(oldest) = self.order.pop_front() {
                self.sessions.remove(&oldest);
                debug!(session_id = %oldest, "Conversation evicted");
            }
        }
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Chat sessions over the analyst, with every generated statement executed
/// under the row ceilings.
pub struct Assistant {
    analyst: Arc<dyn AnalystService>,
    queries: Arc<QueryService>,
    limits: RowLimits,
    conversations: Mutex<Conversations>,
}

impl Assistant {
    pub fn new(
        analyst: Arc<dyn AnalystService>,
        queries: Arc<QueryService>,
        limits: RowLimits,
        sessions: SessionLimits,
    ) -> Self {
        Self {
            analyst,
            queries,
            limits,
            conversations: Mutex::new(Conversations::new(sessions)),
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        SUGGESTIONS.iter().map(ToString::to_string).collect()
    }

    pub async fn ask(&self, session_id: Option<String>, prompt: &str) -> Result<AskResponse, AssistantError> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.record(
            &session_id,
            ChatMessage {
                role: ChatRole::User,
                content: vec![MessageContent::Text {
                    text: prompt.to_string(),
                }],
                request_id: None,
                created_at: Utc::now(),
            },
        )
        .await;

        let reply = match self.analyst.send(prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Analyst request failed");
                self.record(
                    &session_id,
                    ChatMessage {
                        role: ChatRole::Analyst,
                        content: vec![MessageContent::Text {
                            text: format!("Sorry, I encountered an error: {err}"),
                        }],
                        request_id: None,
                        created_at: Utc::now(),
                    },
                )
                .await;
                return Err(err);
            }
        };

        let mut content = Vec::with_capacity(reply.content.len());
        for item in reply.content {
            match item {
                AnalystContent::Text { text } => content.push(MessageContent::Text { text }),
                AnalystContent::Suggestions { suggestions } => {
                    content.push(MessageContent::Suggestions { suggestions })
                }
                AnalystContent::Sql { statement } => {
                    let result = self.run_statement(&statement).await;
                    content.push(MessageContent::Sql {
                        statement,
                        result: Some(result),
                    });
                }
                AnalystContent::Unsupported => {}
            }
        }

        let message = ChatMessage {
            role: ChatRole::Analyst,
            content,
            request_id: reply.request_id,
            created_at: Utc::now(),
        };
        info!(
            session_id = %session_id,
            request_id = message.request_id.as_deref().unwrap_or("-"),
            items = message.content.len(),
            "Analyst answered"
        );
        self.record(&session_id, message.clone()).await;

        Ok(AskResponse {
            session_id,
            message,
        })
    }

    /// Executes a generated statement under the query ceiling and shapes it for display.
    pub async fn run_statement(&self, statement: &str) -> QueryOutcome {
        match self.fetch_capped(statement).await {
            Ok(table) => self.outcome(&table),
            Err(err) => QueryOutcome::Error {
                message: format!("Error executing SQL: {err}"),
            },
        }
    }

    /// Full capped result of a statement the analyst produced in this session,
    /// for CSV download. `None` when the session never saw the statement.
    pub async fn export(
        &self,
        session_id: &str,
        statement: &str,
    ) -> Result<Option<Arc<Table>>, WarehouseError> {
        let known = self
            .conversations
            .lock()
            .await
            .get(session_id)
            .is_some_and(|session| session.produced(statement));
        if !known {
            warn!(session_id = %session_id, "Export refused for a statement outside the conversation");
            return Ok(None);
        }
        self.fetch_capped(statement).await.map(Some)
    }

    async fn fetch_capped(&self, statement: &str) -> Result<Arc<Table>, WarehouseError> {
        ensure_read_only(statement)?;
        self.queries
            .try_run_query(&self.limits.cap_statement(statement), &[])
            .await
    }

    fn outcome(&self, table: &Table) -> QueryOutcome {
        if table.is_empty() {
            return QueryOutcome::NoResults {
                message: "Query returned no results.".to_string(),
            };
        }
        if table.len() == 1 && table.columns.len() == 1 {
            return QueryOutcome::Metric {
                label: table.columns[0].clone(),
                value: table.rows[0][0].clone(),
            };
        }

        let total = table.len();
        let mut warning = (total > self.limits.display_ceiling).then(|| {
            format!(
                "Large Result Set Detected! Query returned {total} rows. Displaying first {} rows only.",
                self.limits.display_ceiling
            )
        });
        if self.limits.hit_query_ceiling(table) {
            let capped = format!(
                "Results were capped at {} rows; refine your question for more specific results.",
                self.limits.query_ceiling
            );
            warning = Some(match warning {
                Some(existing) => format!("{existing} {capped}"),
                None => capped,
            });
        }

        QueryOutcome::Table {
            data: self.limits.for_display(table),
            chart: (total > 1 && table.columns.len() > 1).then(|| self.limits.for_chart(table)),
            warning,
            export_available: true,
        }
    }

    pub async fn conversation(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        self.conversations
            .lock()
            .await
            .get(session_id)
            .map(|session| session.messages.clone())
    }

    pub async fn clear(&self, session_id: &str) -> bool {
        self.conversations.lock().await.remove(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.conversations.lock().await.len()
    }

    async fn record(&self, session_id: &str, message: ChatMessage) {
        self.conversations.lock().await.push(session_id, message);
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::{fake::FakeAnalyst, *};
    use crate::warehouse::fake::FakeWarehouse;

    fn sql(statement: &str) -> AnalystContent {
        AnalystContent::Sql {
            statement: statement.to_string(),
        }
    }

    fn assistant(analyst: FakeAnalyst, warehouse: FakeWarehouse) -> (Arc<FakeWarehouse>, Assistant) {
        assistant_with(analyst, warehouse, SessionLimits::default())
    }

    fn assistant_with(
        analyst: FakeAnalyst,
        warehouse: FakeWarehouse,
        sessions: SessionLimits,
    ) -> (Arc<FakeWarehouse>, Assistant) {
        let warehouse = Arc::new(warehouse);
        let queries = Arc::new(QueryService::new(warehouse.clone(), Duration::from_secs(60), 16));
        (
            warehouse,
            Assistant::new(Arc::new(analyst), queries, RowLimits::default(), sessions),
        )
    }

    fn rows(n: usize) -> Table {
        Table::new(
            vec!["PRODUCT".into(), "REVENUE".into()],
            (0..n).map(|i| vec![json!(format!("p{i}")), json!(i)]).collect(),
        )
    }

    fn first_outcome(response: &AskResponse) -> &QueryOutcome {
        response
            .message
            .content
            .iter()
            .find_map(|item| match item {
                MessageContent::Sql {
                    result: Some(outcome),
                    ..
                } => Some(outcome),
                _ => None,
            })
            .expect("sql item")
    }

    #[tokio::test]
    async fn large_results_are_capped_for_display_and_charts() {
        let (warehouse, assistant) = assistant(
            FakeAnalyst::answering(vec![
                AnalystContent::Text {
                    text: "Here are the sales.".into(),
                },
                sql("SELECT PRODUCT, REVENUE FROM sales_by_product;"),
            ]),
            FakeWarehouse::new().respond("sales_by_product", rows(1_500)),
        );

        let response = assistant.ask(None, "show sales").await.expect("ask");
        let QueryOutcome::Table {
            data,
            chart,
            warning,
            export_available,
        } = first_outcome(&response)
        else {
            panic!("table outcome expected");
        };
        assert_eq!(data.total_rows, 1_500);
        assert_eq!(data.displayed_rows, 1_000);
        assert_eq!(chart.as_ref().map(|c| c.displayed_rows), Some(100));
        assert!(warning.as_deref().is_some_and(|w| w.contains("1500 rows")));
        assert!(*export_available);

        let issued = warehouse.last_sql().expect("statement issued");
        assert!(issued.starts_with("SELECT * FROM ("));
        assert!(issued.ends_with("LIMIT 10000"));
        assert!(!issued.contains(';'));
    }

    #[tokio::test]
    async fn single_cells_render_as_metrics() {
        let total = Table::new(vec!["TOTAL_REVENUE".into()], vec![vec![json!(1234.5)]]);
        let (_, assistant) = assistant(
            FakeAnalyst::answering(vec![sql("SELECT SUM(x) AS TOTAL_REVENUE FROM totals")]),
            FakeWarehouse::new().respond("totals", total),
        );
        let response = assistant.ask(None, "total revenue?").await.expect("ask");
        assert_eq!(
            first_outcome(&response),
            &QueryOutcome::Metric {
                label: "TOTAL_REVENUE".into(),
                value: json!(1234.5),
            }
        );
    }

    #[tokio::test]
    async fn empty_and_failing_statements_are_reported() {
        let (_, assistant) = assistant(
            FakeAnalyst::answering(vec![
                sql("SELECT * FROM nothing_here"),
                sql("SELECT * FROM broken"),
                sql("DELETE FROM sales"),
            ]),
            FakeWarehouse::new().fail("broken", WarehouseError::Query("invalid identifier".into())),
        );
        let response = assistant.ask(None, "anything").await.expect("ask");
        let outcomes: Vec<&QueryOutcome> = response
            .message
            .content
            .iter()
            .filter_map(|item| match item {
                MessageContent::Sql { result, .. } => result.as_ref(),
                _ => None,
            })
            .collect();

        assert_eq!(
            outcomes[0],
            &QueryOutcome::NoResults {
                message: "Query returned no results.".into()
            }
        );
        assert!(matches!(outcomes[1], QueryOutcome::Error { message } if message.contains("invalid identifier")));
        assert!(matches!(outcomes[2], QueryOutcome::Error { message } if message.contains("read-only")));
    }

    #[tokio::test]
    async fn timeouts_surface_and_are_kept_in_history() {
        let (_, assistant) = assistant(FakeAnalyst::timing_out(), FakeWarehouse::new());
        let err = assistant
            .ask(Some("s-1".into()), "slow question")
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Timeout));

        let history = assistant.conversation("s-1").await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, ChatRole::Analyst);
        assert_eq!(
            history[1].content,
            vec![MessageContent::Text {
                text: "Sorry, I encountered an error: Request timed out. Please try again with a simpler query."
                    .into()
            }]
        );
    }

    #[tokio::test]
    async fn sessions_accumulate_and_clear() {
        let (_, assistant) = assistant(
            FakeAnalyst::answering(vec![AnalystContent::Suggestions {
                suggestions: vec!["Try this".into()],
            }]),
            FakeWarehouse::new(),
        );
        let first = assistant.ask(None, "hello").await.expect("ask");
        assistant
            .ask(Some(first.session_id.clone()), "again")
            .await
            .expect("ask");

        let history = assistant.conversation(&first.session_id).await.expect("history");
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].request_id.as_deref(), Some("req-42"));

        assert!(assistant.clear(&first.session_id).await);
        assert!(assistant.conversation(&first.session_id).await.is_none());
        assert!(!assistant.clear(&first.session_id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let (_, assistant) = assistant(FakeAnalyst::answering(Vec::new()), FakeWarehouse::new());
        assistant.ask(Some("s-1".into()), "hi").await.expect("ask");
        assistant.ask(Some("s-2".into()), "hi").await.expect("ask");

        tokio::time::advance(Duration::from_secs(1_800)).await;
        assert!(assistant.conversation("s-2").await.is_some());
        tokio::time::advance(Duration::from_secs(1_800)).await;

        assert!(assistant.conversation("s-1").await.is_none());
        assert!(assistant.conversation("s-2").await.is_some());
        assert_eq!(assistant.session_count().await, 1);
    }

    #[tokio::test]
    async fn session_count_is_capped() {
        let (_, assistant) = assistant_with(
            FakeAnalyst::answering(Vec::new()),
            FakeWarehouse::new(),
            SessionLimits::new(Duration::from_secs(3_600), 3),
        );
        let first = assistant.ask(None, "hi").await.expect("ask");
        for _ in 0..50 {
            assistant.ask(None, "hi").await.expect("ask");
        }

        assert_eq!(assistant.session_count().await, 3);
        assert!(assistant.conversation(&first.session_id).await.is_none());
    }

    #[tokio::test]
    async fn exports_are_limited_to_generated_statements() {
        let (warehouse, assistant) = assistant(
            FakeAnalyst::answering(vec![sql("SELECT PRODUCT, REVENUE FROM Sales")]),
            FakeWarehouse::new().respond("FROM Sales", rows(3)),
        );
        let answer = assistant.ask(None, "top products").await.expect("ask");

        let table = assistant
            .export(&answer.session_id, "SELECT PRODUCT, REVENUE FROM Sales")
            .await
            .expect("export")
            .expect("known statement");
        assert_eq!(table.len(), 3);

        let calls = warehouse.call_count();
        let unknown = assistant
            .export(&answer.session_id, "SELECT EMAIL FROM Customers")
            .await
            .expect("export");
        assert!(unknown.is_none());
        assert!(assistant
            .export("other-session", "SELECT PRODUCT, REVENUE FROM Sales")
            .await
            .expect("export")
            .is_none());
        assert_eq!(warehouse.call_count(), calls);
    }

    #[test]
    fn analyst_payloads_decode_known_content() {
        let payload: AnalystResponse = serde_json::from_value(json!({
            "message": {
                "role": "analyst",
                "content": [
                    {"type": "text", "text": "Interpretation"},
                    {"type": "sql", "statement": "SELECT 1", "confidence": {}},
                    {"type": "chart", "chart": {}}
                ]
            },
            "request_id": "abc"
        }))
        .expect("decode");
        assert_eq!(
            payload.message.content,
            vec![
                AnalystContent::Text {
                    text: "Interpretation".into()
                },
                sql("SELECT 1"),
                AnalystContent::Unsupported,
            ]
        );
        assert_eq!(payload.request_id.as_deref(), Some("abc"));
    }

    #[test]
    fn request_names_the_semantic_view() {
        let body = request_body("top products", "RETAIL.PUBLIC.SALES_VIEW");
        assert_eq!(body["semantic_view"], "RETAIL.PUBLIC.SALES_VIEW");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["text"], "top products");
    }

    #[test]
    fn export_names_carry_a_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().expect("time");
        assert_eq!(export_filename(at), "data_export_20240309_140507.csv");
    }
}
