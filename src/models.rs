use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    limits::{LimitedTable, RowLimits},
    metrics::Growth,
    shell::Page,
    table::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Currency,
    Count,
    Percent,
    Rating,
    Days,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Delta {
    Growth(Growth),
    Change(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub label: String,
    pub value: Value,
    pub format: ValueFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Kpi {
    fn new(label: impl Into<String>, value: Value, format: ValueFormat) -> Self {
        Self {
            label: label.into(),
            value,
            format,
            delta: None,
            caption: None,
        }
    }

    pub fn currency(label: impl Into<String>, value: f64) -> Self {
        Self::new(label, number(value), ValueFormat::Currency)
    }

    pub fn count(label: impl Into<String>, value: f64) -> Self {
        Self::new(label, number(value.round()), ValueFormat::Count)
    }

    pub fn percent(label: impl Into<String>, value: f64) -> Self {
        Self::new(label, number(value), ValueFormat::Percent)
    }

    pub fn rating(label: impl Into<String>, value: f64) -> Self {
        Self::new(label, number(value), ValueFormat::Rating)
    }

    pub fn days(label: impl Into<String>, value: f64) -> Self {
        Self::new(label, number(value), ValueFormat::Days)
    }

    pub fn text(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(label, Value::String(value.into()), ValueFormat::Text)
    }

    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.delta = Some(Delta::Growth(growth));
        self
    }

    pub fn with_change(mut self, change: f64) -> Self {
        self.delta = Some(Delta::Change(change));
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

// Non-finite numbers have no JSON form; they render as null.
fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    HorizontalBar,
    Line,
    Combo,
    Pie,
    Donut,
    Scatter,
    Bubble,
    Histogram,
    Sunburst,
}

impl ChartKind {
    /// Line-style charts plot date-ordered series.
    pub fn is_series(self) -> bool {
        matches!(self, Self::Line | Self::Combo)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLine {
    pub axis: &'static str,
    pub value: f64,
    pub label: String,
}

/// Declarative chart layout; the front end draws it from the section rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: String,
    pub y: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_lines: Vec<ReferenceLine>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, x: &str, y: &[&str]) -> Self {
        Self {
            kind,
            x: x.to_string(),
            y: y.iter().map(ToString::to_string).collect(),
            color: None,
            size: None,
            path: Vec::new(),
            reference_lines: Vec::new(),
        }
    }

    pub fn color(mut self, column: &str) -> Self {
        self.color = Some(column.to_string());
        self
    }

    pub fn size(mut self, column: &str) -> Self {
        self.size = Some(column.to_string());
        self
    }

    pub fn path(mut self, columns: &[&str]) -> Self {
        self.path = columns.iter().map(ToString::to_string).collect();
        self
    }

    pub fn reference(mut self, axis: &'static str, value: Option<f64>, label: &str) -> Self {
        if let Some(value) = value {
            self.reference_lines.push(ReferenceLine {
                axis,
                value,
                label: label.to_string(),
            });
        }
        self
    }
}

/// Rows of a section: complete while a view builds them, capped once rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rows {
    Full(Table),
    Limited(LimitedTable),
}

impl Rows {
    pub fn table(&self) -> &Table {
        match self {
            Self::Full(table) => table,
            Self::Limited(limited) => &limited.table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionBody {
    Kpis { items: Vec<Kpi> },
    Chart { chart: ChartSpec, data: Rows },
    Table { data: Rows },
    Insight { level: Level, message: String },
    Empty { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: &'static str,
    pub title: String,
    #[serde(flatten)]
    pub body: SectionBody,
}

impl Section {
    pub fn kpis(id: &'static str, title: impl Into<String>, items: Vec<Kpi>) -> Self {
        Self {
            id,
            title: title.into(),
            body: SectionBody::Kpis { items },
        }
    }

    /// A chart over `table`, or a "no data" block when the table is empty.
    pub fn chart(id: &'static str, title: impl Into<String>, chart: ChartSpec, table: Table) -> Self {
        let body = if table.is_empty() {
            SectionBody::Empty {
                message: "No data available".to_string(),
            }
        } else {
            SectionBody::Chart {
                chart,
                data: Rows::Full(table),
            }
        };
        Self {
            id,
            title: title.into(),
            body,
        }
    }

    pub fn table(id: &'static str, title: impl Into<String>, table: Table) -> Self {
        let body = if table.is_empty() {
            SectionBody::Empty {
                message: "No data available".to_string(),
            }
        } else {
            SectionBody::Table {
                data: Rows::Full(table),
            }
        };
        Self {
            id,
            title: title.into(),
            body,
        }
    }

    pub fn insight(id: &'static str, title: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: SectionBody::Insight {
                level,
                message: message.into(),
            },
        }
    }

    pub fn empty(id: &'static str, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: SectionBody::Empty {
                message: message.into(),
            },
        }
    }

    pub fn rows(&self) -> Option<&Table> {
        match &self.body {
            SectionBody::Chart { data, .. } | SectionBody::Table { data } => Some(data.table()),
            _ => None,
        }
    }

    /// Caps sections at the display ceiling; series charts keep their latest rows.
    pub fn limited(self, limits: &RowLimits) -> Self {
        let body = match self.body {
            SectionBody::Chart { chart, data } => {
                let data = if chart.kind.is_series() {
                    limits.for_series(data.table())
                } else {
                    limits.for_display(data.table())
                };
                SectionBody::Chart {
                    chart,
                    data: Rows::Limited(data),
                }
            }
            SectionBody::Table { data } => SectionBody::Table {
                data: Rows::Limited(limits.for_display(data.table())),
            },
            other => other,
        };
        Self { body, ..self }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub page: Page,
    pub title: &'static str,
    pub filters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    pub sections: Vec<Section>,
    pub limits: RowLimits,
    pub generated_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Analyst,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Sql {
        statement: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<QueryOutcome>,
    },
}

/// How an analyst-generated statement turned out once executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    NoResults {
        message: String,
    },
    Metric {
        label: String,
        value: Value,
    },
    Table {
        data: LimitedTable,
        chart: Option<LimitedTable>,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
        export_available: bool,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub session_id: String,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatementRequest {
    pub session_id: String,
    pub statement: String,
}
