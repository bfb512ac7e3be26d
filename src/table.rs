use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WarehouseError;

/// Column-major metadata with row-major cells, as returned by the warehouse.
///
/// Column lookups are case-insensitive because the warehouse upper-cases
/// unquoted aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records<T: Serialize>(records: &[T]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            let Ok(Value::Object(map)) = serde_json::to_value(record) else {
                continue;
            };
            if columns.is_empty() {
                columns = map.keys().cloned().collect();
            }
            rows.push(
                columns
                    .iter()
                    .map(|column| map.get(column).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
        }

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(idx))
    }

    /// Decodes every row into `T`, keyed by lower-cased column name.
    ///
    /// An empty table decodes to an empty vector regardless of its columns, so
    /// the degraded empty result never raises a shape error.
    pub fn records<T: DeserializeOwned>(&self) -> Result<Vec<T>, WarehouseError> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = self
            .columns
            .iter()
            .map(|column| column.to_ascii_lowercase())
            .collect();

        self.rows
            .iter()
            .map(|cells| {
                let map: Map<String, Value> = keys
                    .iter()
                    .cloned()
                    .zip(cells.iter().cloned())
                    .collect();
                serde_json::from_value::<T>(Value::Object(map))
                    .map_err(|err| WarehouseError::ShapeMismatch(err.to_string()))
            })
            .collect()
    }

    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn tail(&self, n: usize) -> Self {
        let skip = self.rows.len().saturating_sub(n);
        Self {
            columns: self.columns.clone(),
            rows: self.rows[skip..].to_vec(),
        }
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(cell_text))
                .context("Failed to write CSV row")?;
        }
        writer.into_inner().context("Failed to flush CSV output")
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
