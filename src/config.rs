use std::{env, fmt, net::SocketAddr, time::Duration};

use anyhow::{bail, Result};
use tracing::warn;

use crate::limits::{RowLimits, SessionLimits};

#[derive(Clone)]
pub struct WarehouseConfig {
    pub account: String,
    pub user: String,
    pub password: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
    pub host: String,
    pub request_timeout_seconds: u64,
}

impl WarehouseConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}", self.host.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

// Credentials stay out of logs even when the whole config is dumped with `{:?}`.
impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("host", &self.host)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub host: String,
    pub semantic_view: String,
    pub timeout_seconds: u64,
}

impl AssistantConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "https://{}/api/v2/cortex/analyst/message",
            self.host.trim_end_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub api_key: Option<String>,
    pub warehouse: WarehouseConfig,
    pub assistant: AssistantConfig,
    pub cache_ttl_seconds: u64,
    pub cache_capacity: usize,
    pub limits: RowLimits,
    pub sessions: SessionLimits,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("warehouse", &self.warehouse)
            .field("assistant", &self.assistant)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("cache_capacity", &self.cache_capacity)
            .field("limits", &self.limits)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("DASHBOARD_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let api_key = non_empty_var(&["DASHBOARD_API_KEY"]);

        let Some(account) = non_empty_var(&["SNOWFLAKE_ACCOUNT", "ACCOUNT"]) else {
            bail!("SNOWFLAKE_ACCOUNT (or ACCOUNT) must be set");
        };
        let Some(user) = non_empty_var(&["SNOWFLAKE_USER", "USER"]) else {
            bail!("SNOWFLAKE_USER (or USER) must be set");
        };
        let password = non_empty_var(&["SNOWFLAKE_PASSWORD", "PASSWORD"]).unwrap_or_default();
        let warehouse_name = non_empty_var(&["SNOWFLAKE_WAREHOUSE", "WAREHOUSE"]).unwrap_or_default();
        let database = non_empty_var(&["SNOWFLAKE_DATABASE", "DATABASE"]).unwrap_or_default();
        let schema = non_empty_var(&["SNOWFLAKE_SCHEMA", "SCHEMA"]).unwrap_or_default();
        let role = non_empty_var(&["SNOWFLAKE_ROLE"]);
        let host = non_empty_var(&["SNOWFLAKE_HOST"])
            .unwrap_or_else(|| format!("{}.snowflakecomputing.com", account.to_ascii_lowercase()));

        let warehouse = WarehouseConfig {
            account,
            user,
            password,
            warehouse: warehouse_name,
            database: database.clone(),
            schema: schema.clone(),
            role,
            host: host.clone(),
            request_timeout_seconds: parse_var("SNOWFLAKE_REQUEST_TIMEOUT_SECONDS", 300).max(1),
        };

        let semantic_view_name = non_empty_var(&["SEMANTIC_VIEW"]).unwrap_or_default();
        let assistant = AssistantConfig {
            host: non_empty_var(&["SNOWFLAKE_ANALYST_HOST", "HOST"]).unwrap_or(host),
            semantic_view: format!("{database}.{schema}.{semantic_view_name}"),
            timeout_seconds: parse_var("ANALYST_TIMEOUT_SECONDS", 30).max(1),
        };

        let limits = RowLimits::new(
            parse_var("QUERY_ROW_CEILING", 10_000),
            parse_var("DISPLAY_ROW_CEILING", 1_000),
            parse_var("CHART_ROW_CEILING", 100),
        );

        Ok(Self {
            bind_addr,
            api_key,
            warehouse,
            assistant,
            cache_ttl_seconds: parse_var("QUERY_CACHE_TTL_SECONDS", 3_600).max(1),
            cache_capacity: parse_var("QUERY_CACHE_CAPACITY", 512).max(1),
            limits,
            sessions: SessionLimits::new(
                Duration::from_secs(parse_var("ASSISTANT_SESSION_TTL_SECONDS", 3_600).max(1)),
                parse_var("ASSISTANT_SESSION_CAPACITY", 256),
            ),
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(api_key: Option<&str>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            api_key: api_key.map(ToString::to_string),
            warehouse: WarehouseConfig {
                account: "test-account".to_string(),
                user: "tester".to_string(),
                password: String::new(),
                warehouse: "TEST_WH".to_string(),
                database: "RETAIL".to_string(),
                schema: "PUBLIC".to_string(),
                role: None,
                host: "test-account.snowflakecomputing.com".to_string(),
                request_timeout_seconds: 5,
            },
            assistant: AssistantConfig {
                host: "test-account.snowflakecomputing.com".to_string(),
                semantic_view: "RETAIL.PUBLIC.SALES_VIEW".to_string(),
                timeout_seconds: 5,
            },
            cache_ttl_seconds: 60,
            cache_capacity: 32,
            limits: RowLimits::default(),
            sessions: SessionLimits::default(),
        }
    }
}

fn non_empty_var(names: &[&str]) -> Option<String> {
    first_set(names, |name| env::var(name).ok())
}

/// First non-blank value among `names`. Values from a fallback name are
/// logged by variable name so a generic `USER` or `HOST` is never picked up silently.
fn first_set(names: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let (index, value) = names.iter().enumerate().find_map(|(index, name)| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| (index, value))
    })?;
    if index > 0 {
        warn!(
            variable = names[index],
            preferred = names[0],
            "Configuration value taken from fallback variable"
        );
    }
    Some(value)
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
