use std::time::Duration;

use serde::Serialize;

use crate::table::Table;

/// Bounds on the assistant's in-memory conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub idle_ttl: Duration,
    pub capacity: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600), 256)
    }
}

impl SessionLimits {
    pub fn new(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            idle_ttl,
            capacity: capacity.max(1),
        }
    }
}

/// Row ceilings applied to every tabular result the service hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowLimits {
    pub query_ceiling: usize,
    pub display_ceiling: usize,
    pub chart_ceiling: usize,
}

impl Default for RowLimits {
    fn default() -> Self {
        Self::new(10_000, 1_000, 100)
    }
}

impl RowLimits {
    pub fn new(query_ceiling: usize, display_ceiling: usize, chart_ceiling: usize) -> Self {
        let query_ceiling = query_ceiling.max(1);
        Self {
            query_ceiling,
            display_ceiling: display_ceiling.clamp(1, query_ceiling),
            chart_ceiling: chart_ceiling.clamp(1, query_ceiling),
        }
    }

    /// Wraps a statement so the warehouse never returns more than the query ceiling.
    pub fn cap_statement(&self, sql: &str) -> String {
        let body = sql.trim().trim_end_matches(';').trim_end();
        format!(
            "SELECT * FROM (\n{body}\n) AS capped_result LIMIT {}",
            self.query_ceiling
        )
    }

    pub fn for_display(&self, table: &Table) -> LimitedTable {
        LimitedTable::new(table, table.head(self.display_ceiling))
    }

    /// Date-ordered rows capped at the display ceiling, keeping the most recent.
    pub fn for_series(&self, table: &Table) -> LimitedTable {
        LimitedTable::new(table, table.tail(self.display_ceiling))
    }

    /// Assistant chart data, capped at the chart ceiling.
    pub fn for_chart(&self, table: &Table) -> LimitedTable {
        LimitedTable::new(table, table.head(self.chart_ceiling))
    }

    /// True when a capped statement returned exactly the ceiling, so more rows may exist.
    pub fn hit_query_ceiling(&self, table: &Table) -> bool {
        table.len() >= self.query_ceiling
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitedTable {
    #[serde(flatten)]
    pub table: Table,
    pub total_rows: usize,
    pub displayed_rows: usize,
    pub truncated: bool,
}

impl LimitedTable {
    fn new(full: &Table, shown: Table) -> Self {
        let total_rows = full.len();
        Self {
            displayed_rows: shown.len(),
            truncated: total_rows > shown.len(),
            table: shown,
            total_rows,
        }
    }
}
