use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    error::WarehouseError,
    table::Table,
    warehouse::{ensure_read_only, Connection, SqlParam, Warehouse},
};

/// Process-wide query layer: one shared warehouse session plus a TTL cache of
/// successful results keyed by statement and bound parameters.
pub struct QueryService {
    warehouse: Arc<dyn Warehouse>,
    cache: Mutex<QueryCache>,
}

struct CacheEntry {
    table: Arc<Table>,
    stored_at: Instant,
}

struct QueryCache {
    ttl: Duration,
    capacity: usize,
    order: VecDeque<String>,
    values: HashMap<String, CacheEntry>,
}

impl QueryCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            order: VecDeque::new(),
            values: HashMap::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<Table>> {
        let fresh = match self.values.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.table.clone()),
            Some(_) => None,
            None => return None,
        };

        match fresh {
            Some(table) => {
                self.touch(key);
                Some(table)
            }
            None => {
                self.remove(key);
                None
            }
        }
    }

    fn set(&mut self, key: String, table: Arc<Table>) {
        let entry = CacheEntry {
            table,
            stored_at: Instant::now(),
        };
        if self.values.insert(key.clone(), entry).is_some() {
            self.touch(&key);
            return;
        }

        self.order.push_back(key);
        self.trim();
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key.to_string());
        }
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
        self.order.retain(|k| k != key);
    }

    fn trim(&mut self) {
        while self.values.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.values.remove(&old);
            } else {
                break;
            }
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

fn cache_key(sql: &str, params: &[SqlParam]) -> String {
    let params = serde_json::to_string(params).unwrap_or_default();
    format!("{sql}\u{1f}{params}")
}

impl QueryService {
    pub fn new(warehouse: Arc<dyn Warehouse>, ttl: Duration, capacity: usize) -> Self {
        Self {
            warehouse,
            cache: Mutex::new(QueryCache::new(ttl, capacity)),
        }
    }

    pub async fn acquire_connection(&self) -> Result<Arc<Connection>, WarehouseError> {
        self.warehouse.acquire_connection().await
    }

    pub async fn is_connected(&self) -> bool {
        self.warehouse.is_connected().await
    }

    /// Runs a read-only statement, degrading every failure to an empty table.
    pub async fn run_query(&self, sql: &str, params: &[SqlParam]) -> Arc<Table> {
        match self.try_run_query(sql, params).await {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, statement = %first_line(sql), "Query failed; rendering empty result");
                Arc::new(Table::empty())
            }
        }
    }

    pub async fn try_run_query(
        &self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Arc<Table>, WarehouseError> {
        ensure_read_only(sql)?;

        let key = cache_key(sql, params);
        if let Some(table) = self.cache.lock().await.get(&key) {
            debug!(cache = "hit", rows = table.len(), "Query served from cache");
            return Ok(table);
        }

        let started = Instant::now();
        let table = Arc::new(self.warehouse.execute(sql, params).await?);
        debug!(
            cache = "miss",
            rows = table.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query executed"
        );

        self.cache.lock().await.set(key, table.clone());
        Ok(table)
    }

    pub async fn filter_options(&self, source: FilterSource) -> Vec<String> {
        let table = self.run_query(source.statement(), &[]).await;
        table
            .rows
            .iter()
            .filter_map(|row| row.first())
            .filter_map(|value| match value {
                serde_json::Value::String(text) => Some(text.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect()
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn close(&self) {
        self.warehouse.close().await;
        info!("Query service shut down");
    }
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}

/// Whitelisted sources of distinct values for the filter controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterSource {
    Brands,
    Categories,
    Merchants,
    BenchmarkCategories,
    BenchmarkBrands,
    Stores,
}

impl FilterSource {
    pub fn from_slug(slug: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(slug.to_string())).ok()
    }

    fn statement(self) -> &'static str {
        match self {
            Self::Brands => {
                "SELECT DISTINCT BRAND FROM Products WHERE BRAND IS NOT NULL ORDER BY BRAND"
            }
            Self::Categories => {
                "SELECT DISTINCT SPLIT_PART(TAXONOMY, ' > ', 1) AS CATEGORY FROM Products \
                 WHERE TAXONOMY IS NOT NULL ORDER BY CATEGORY"
            }
            Self::Merchants => {
                "SELECT DISTINCT THIRD_PARTY_MERCHANT_NAME FROM Third_Party_Merchants \
                 WHERE THIRD_PARTY_MERCHANT_NAME IS NOT NULL ORDER BY THIRD_PARTY_MERCHANT_NAME"
            }
            Self::BenchmarkCategories => {
                "SELECT DISTINCT BENCHMARK_CATG FROM Benchmark \
                 WHERE BENCHMARK_CATG IS NOT NULL ORDER BY BENCHMARK_CATG"
            }
            Self::BenchmarkBrands => {
                "SELECT DISTINCT BENCHMARK_BRAND_NAME FROM Benchmark \
                 WHERE BENCHMARK_BRAND_NAME IS NOT NULL ORDER BY BENCHMARK_BRAND_NAME"
            }
            Self::Stores => {
                "SELECT DISTINCT BENCHMARK_STORE FROM Benchmark \
                 WHERE BENCHMARK_STORE IS NOT NULL ORDER BY BENCHMARK_STORE"
            }
        }
    }
}
