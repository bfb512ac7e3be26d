mod snowflake;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{error::WarehouseError, table::Table};

pub use snowflake::SnowflakeWarehouse;

/// Read-only access to the data warehouse.
///
/// Implementations establish their session lazily and share it between all
/// callers; a failed login must leave the warehouse able to try again on the
/// next call.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn acquire_connection(&self) -> Result<Arc<Connection>, WarehouseError>;

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Table, WarehouseError>;

    async fn is_connected(&self) -> bool;

    async fn close(&self);
}

/// Shared handle to an authenticated warehouse session.
#[derive(Clone)]
pub struct Connection {
    token: String,
    session_id: Option<i64>,
}

impl Connection {
    pub fn new(token: impl Into<String>, session_id: Option<i64>) -> Self {
        Self {
            token: token.into(),
            session_id,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("token", &"<redacted>")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
}

impl SqlParam {
    pub fn binding(&self) -> Value {
        match self {
            Self::Text(text) => json!({ "type": "TEXT", "value": text }),
            Self::Integer(value) => json!({ "type": "FIXED", "value": value.to_string() }),
            Self::Real(value) => json!({ "type": "REAL", "value": value.to_string() }),
            Self::Date(date) => json!({ "type": "TEXT", "value": date.format("%Y-%m-%d").to_string() }),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// Optional `AND column = ?` predicates with their bound values.
///
/// Column names are static so only values ever reach the warehouse as bindings.
#[derive(Debug, Clone, Default)]
pub struct FilterClause {
    predicates: Vec<String>,
    params: Vec<SqlParam>,
}

impl FilterClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.predicates.push(format!("AND {column} = ?"));
            self.params.push(SqlParam::from(value));
        }
        self
    }

    pub fn eq_expr(mut self, expression: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.predicates.push(format!("AND {expression} = ?"));
            self.params.push(SqlParam::from(value));
        }
        self
    }

    pub fn one_of(mut self, column: &'static str, values: &[String]) -> Self {
        if !values.is_empty() {
            let marks = vec!["?"; values.len()].join(", ");
            self.predicates.push(format!("AND {column} IN ({marks})"));
            self.params
                .extend(values.iter().map(|value| SqlParam::from(value.as_str())));
        }
        self
    }

    pub fn sql(&self) -> String {
        self.predicates.join(" ")
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }
}

const READ_ONLY_KEYWORDS: [&str; 6] = ["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

pub fn ensure_read_only(sql: &str) -> Result<(), WarehouseError> {
    let keyword = first_keyword(sql).to_ascii_uppercase();
    if READ_ONLY_KEYWORDS.contains(&keyword.as_str()) {
        Ok(())
    } else {
        Err(WarehouseError::ReadOnlyViolation)
    }
}

fn first_keyword(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix('(') {
            rest = after.trim_start();
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}
