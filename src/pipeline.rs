use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    cache::QueryService,
    error::ApiError,
    limits::RowLimits,
    models::{Banner, Level, PageResponse, Section},
    shell::Page,
    table::Table,
};

/// A dashboard page: fetch rows for a filter state, then turn them into sections.
#[async_trait]
pub trait Dashboard: Send + Sync {
    type Filters: DeserializeOwned + Serialize + Default + Send + Sync;
    type Data: Send;

    fn page(&self) -> Page;

    fn validate(&self, _filters: &Self::Filters) -> Result<(), String> {
        Ok(())
    }

    async fn fetch(&self, queries: &QueryService, filters: &Self::Filters) -> Self::Data;

    fn transform(&self, data: Self::Data, filters: &Self::Filters) -> Vec<Section>;
}

pub async fn render<D: Dashboard>(
    dashboard: &D,
    queries: &QueryService,
    limits: &RowLimits,
    filters: D::Filters,
) -> Result<PageResponse, ApiError> {
    dashboard
        .validate(&filters)
        .map_err(|message| ApiError::bad_request("INVALID_ARGUMENT", message))?;

    let page = dashboard.page();
    let started = Instant::now();
    let mut response = PageResponse {
        page,
        title: page.title(),
        filters: serde_json::to_value(&filters).unwrap_or_default(),
        banner: None,
        sections: Vec::new(),
        limits: *limits,
        generated_at: Utc::now(),
        elapsed_ms: 0,
    };

    match queries.acquire_connection().await {
        Ok(_) => {
            let data = dashboard.fetch(queries, &filters).await;
            response.sections = dashboard
                .transform(data, &filters)
                .into_iter()
                .map(|section| section.limited(limits))
                .collect();
        }
        Err(err) => {
            warn!(page = page.slug(), error = %err, "Warehouse unavailable; rendering degraded page");
            response.banner = Some(Banner {
                level: Level::Error,
                message: format!("Unable to reach the data warehouse: {err}"),
            });
        }
    }

    response.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        page = page.slug(),
        sections = response.sections.len(),
        elapsed_ms = response.elapsed_ms,
        "Page rendered"
    );
    Ok(response)
}

/// Full rows of one tabular section, before any display ceiling.
pub async fn export_section<D: Dashboard>(
    dashboard: &D,
    queries: &QueryService,
    filters: D::Filters,
    section_id: &str,
) -> Result<Table, ApiError> {
    dashboard
        .validate(&filters)
        .map_err(|message| ApiError::bad_request("INVALID_ARGUMENT", message))?;

    queries.acquire_connection().await.map_err(ApiError::from)?;

    let data = dashboard.fetch(queries, &filters).await;
    let sections = dashboard.transform(data, &filters);
    let Some(section) = sections.into_iter().find(|s| s.id == section_id) else {
        return Err(ApiError::not_found(
            "SECTION_NOT_FOUND",
            format!("Section `{section_id}` is not part of this page."),
        ));
    };

    section.rows().cloned().ok_or_else(|| {
        ApiError::not_found(
            "NO_TABULAR_DATA",
            format!("Section `{section_id}` has no rows to export."),
        )
    })
}

/// Decodes rows into `T`; a shape mismatch is logged and treated as no data.
pub fn decode<T: DeserializeOwned>(table: &Table, what: &'static str) -> Vec<T> {
    match table.records() {
        Ok(rows) => rows,
        Err(err) => {
            warn!(query = what, error = %err, "Unexpected result shape; treating as empty");
            Vec::new()
        }
    }
}
