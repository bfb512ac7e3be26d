mod api;
mod assistant;
mod auth;
mod cache;
mod config;
mod error;
mod limits;
mod metrics;
mod models;
mod pipeline;
mod shell;
mod table;
mod views;
mod warehouse;

use std::sync::Arc;

use anyhow::Result;
use assistant::{Assistant, CortexAnalystClient};
use axum::{
    routing::{get, post},
    Router,
};
use cache::QueryService;
use config::Config;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use views::{BenchmarkingView, ProductView, SalesView};
use warehouse::{SnowflakeWarehouse, Warehouse};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub queries: Arc<QueryService>,
    pub assistant: Arc<Assistant>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retail_intel_hub=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let warehouse: Arc<dyn Warehouse> = Arc::new(SnowflakeWarehouse::new(config.warehouse.clone())?);
    let queries = Arc::new(QueryService::new(
        warehouse.clone(),
        config.cache_ttl(),
        config.cache_capacity,
    ));
    let analyst = CortexAnalystClient::new(config.assistant.clone(), warehouse)?;
    let assistant = Arc::new(Assistant::new(
        Arc::new(analyst),
        queries.clone(),
        config.limits,
        config.sessions,
    ));

    let state = AppState {
        config: config.clone(),
        queries: queries.clone(),
        assistant,
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("retail-intel-hub listening on {}", config.bind_addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    queries.close().await;
    Ok(())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/v1/pages", get(api::list_pages))
        .route("/v1/pages/{slug}", get(api::get_page))
        .route("/v1/filters/{source}", get(api::filter_options))
        .route("/v1/dashboards/sales", get(api::dashboard::<SalesView>))
        .route(
            "/v1/dashboards/sales/sections/{section}/export",
            get(api::export_dashboard_section::<SalesView>),
        )
        .route("/v1/dashboards/products", get(api::dashboard::<ProductView>))
        .route(
            "/v1/dashboards/products/sections/{section}/export",
            get(api::export_dashboard_section::<ProductView>),
        )
        .route(
            "/v1/dashboards/benchmarking",
            get(api::dashboard::<BenchmarkingView>),
        )
        .route(
            "/v1/dashboards/benchmarking/sections/{section}/export",
            get(api::export_dashboard_section::<BenchmarkingView>),
        )
        .route("/v1/assistant/suggestions", get(api::assistant_suggestions))
        .route("/v1/assistant/messages", post(api::ask_assistant))
        .route(
            "/v1/assistant/sessions/{session_id}",
            get(api::get_conversation).delete(api::clear_conversation),
        )
        .route("/v1/assistant/export", post(api::export_statement))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
