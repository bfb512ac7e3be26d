use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{
    assistant::export_filename,
    auth::verify_bearer,
    cache::FilterSource,
    error::ApiError,
    models::{AskRequest, ConversationResponse, ExportStatementRequest},
    pipeline::{export_section, render, Dashboard},
    shell::{navigation, Page, PageDescriptor},
    table::Table,
    AppState,
};

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "timestamp": Utc::now(),
        "warehouse": { "connected": state.queries.is_connected().await },
        "cache": { "entries": state.queries.cached_entries().await },
        "assistant": { "sessions": state.assistant.session_count().await }
    }))
}

pub async fn list_pages(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    Json(navigation()).into_response()
}

pub async fn get_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Some(page) = Page::from_slug(&slug) else {
        return ApiError::not_found("PAGE_NOT_FOUND", format!("Unknown page `{slug}`.")).into_response();
    };

    Json(PageDescriptor::from(page)).into_response()
}

pub async fn filter_options(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(source): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Some(filter) = FilterSource::from_slug(&source) else {
        return ApiError::not_found(
            "UNKNOWN_FILTER_SOURCE",
            format!("Unknown filter source `{source}`."),
        )
        .into_response();
    };

    let values = state.queries.filter_options(filter).await;
    Json(json!({ "source": filter, "values": values })).into_response()
}

pub async fn dashboard<D: Dashboard + Default>(
    State(state): State<AppState>,
    headers: HeaderMap,
    filters: Result<Query<D::Filters>, QueryRejection>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Query(filters) = match filters {
        Ok(filters) => filters,
        Err(rejection) => {
            return ApiError::bad_request("INVALID_ARGUMENT", rejection.body_text()).into_response();
        }
    };

    match render(&D::default(), &state.queries, &state.config.limits, filters).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn export_dashboard_section<D: Dashboard + Default>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(section): Path<String>,
    filters: Result<Query<D::Filters>, QueryRejection>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Query(filters) = match filters {
        Ok(filters) => filters,
        Err(rejection) => {
            return ApiError::bad_request("INVALID_ARGUMENT", rejection.body_text()).into_response();
        }
    };

    let dashboard = D::default();
    let table = match export_section(&dashboard, &state.queries, filters, &section).await {
        Ok(table) => table,
        Err(err) => return err.into_response(),
    };

    let file_name = format!(
        "{}_{}_{}.csv",
        dashboard.page().slug(),
        section,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    info!(page = dashboard.page().slug(), section = %section, rows = table.len(), "Section exported");
    csv_download(&table, &file_name)
}

pub async fn assistant_suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    Json(json!({ "suggestions": state.assistant.suggestions() })).into_response()
}

pub async fn ask_assistant(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ApiError::bad_request("INVALID_ARGUMENT", rejection.body_text()).into_response();
        }
    };

    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return ApiError::bad_request("INVALID_ARGUMENT", "Prompt must not be empty.").into_response();
    }

    match state.assistant.ask(payload.session_id, prompt).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Some(messages) = state.assistant.conversation(&session_id).await else {
        return session_not_found().into_response();
    };

    Json(ConversationResponse {
        session_id,
        messages,
    })
    .into_response()
}

pub async fn clear_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    if !state.assistant.clear(&session_id).await {
        return session_not_found().into_response();
    }

    StatusCode::NO_CONTENT.into_response()
}

pub async fn export_statement(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExportStatementRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ApiError::bad_request("INVALID_ARGUMENT", rejection.body_text()).into_response();
        }
    };

    match state
        .assistant
        .export(&payload.session_id, &payload.statement)
        .await
    {
        Ok(Some(table)) => csv_download(&table, &export_filename(Utc::now())),
        Ok(None) => ApiError::not_found(
            "STATEMENT_NOT_FOUND",
            "Only statements generated in this conversation can be exported.",
        )
        .into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn session_not_found() -> ApiError {
    ApiError::not_found("SESSION_NOT_FOUND", "Conversation not found.")
}

fn csv_download(table: &Table, file_name: &str) -> axum::response::Response {
    let bytes = match table.to_csv() {
        Ok(bytes) => bytes,
        Err(err) => {
            return ApiError::internal(format!("Failed to encode CSV: {err:#}")).into_response();
        }
    };

    let content_disposition = format!("attachment; filename=\"{file_name}\"");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(Body::from(bytes))
        .unwrap_or_else(|_| ApiError::internal("Failed to build download response.").into_response())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{body::to_bytes, http::Request, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        assistant::{fake::FakeAnalyst, AnalystContent, Assistant},
        cache::QueryService,
        config::Config,
        warehouse::fake::FakeWarehouse,
    };

    use super::*;

    fn app_with(warehouse: FakeWarehouse, analyst: FakeAnalyst, api_key: Option<&str>) -> Router {
        let config = Config::for_tests(api_key);
        let queries = Arc::new(QueryService::new(
            Arc::new(warehouse),
            Duration::from_secs(60),
            32,
        ));
        let assistant = Arc::new(Assistant::new(
            Arc::new(analyst),
            queries.clone(),
            config.limits,
            config.sessions,
        ));
        crate::app(AppState {
            config,
            queries,
            assistant,
        })
    }

    fn app(warehouse: FakeWarehouse) -> Router {
        app_with(warehouse, FakeAnalyst::default(), None)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, headers, body.to_vec())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
        let (status, _, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn healthz_reports_warehouse_state() {
        let (status, body) = get_json(app(FakeWarehouse::unreachable()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["warehouse"]["connected"], false);
    }

    #[tokio::test]
    async fn pages_list_the_navigation_shell() {
        let (status, body) = get_json(app(FakeWarehouse::new()), "/v1/pages").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["defaultPage"], "sales");
        assert_eq!(body["pages"].as_array().map(Vec::len), Some(4));

        let (status, body) = get_json(app(FakeWarehouse::new()), "/v1/pages/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "PAGE_NOT_FOUND");
    }

    #[tokio::test]
    async fn api_key_guards_everything_but_health() {
        let guarded = || app_with(FakeWarehouse::new(), FakeAnalyst::default(), Some("k3y"));

        let (status, body) = get_json(guarded(), "/v1/pages").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = get_json(guarded(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::builder()
            .uri("/v1/pages")
            .header(header::AUTHORIZATION, "Bearer k3y")
            .body(Body::empty())
            .expect("request");
        let (status, _, _) = send(guarded(), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn filter_sources_are_whitelisted() {
        let brands = Table::new(vec!["BRAND".into()], vec![vec![json!("Acme")], vec![json!("Globex")]]);
        let warehouse = FakeWarehouse::new().respond("SELECT DISTINCT BRAND", brands);
        let (status, body) = get_json(app(warehouse), "/v1/filters/brands").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["values"], json!(["Acme", "Globex"]));

        let (status, body) = get_json(app(FakeWarehouse::new()), "/v1/filters/passwords").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "UNKNOWN_FILTER_SOURCE");
    }

    #[tokio::test]
    async fn unreachable_warehouse_renders_a_banner_page() {
        let (status, body) = get_json(app(FakeWarehouse::unreachable()), "/v1/dashboards/sales").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], "sales");
        assert_eq!(body["banner"]["level"], "error");
        assert_eq!(body["sections"], json!([]));
    }

    #[tokio::test]
    async fn invalid_filters_are_rejected() {
        let (status, body) = get_json(
            app(FakeWarehouse::new()),
            "/v1/dashboards/sales?start=2024-03-01&end=2024-02-01",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Start date must be before end date");

        let (status, body) = get_json(app(FakeWarehouse::new()), "/v1/dashboards/products?minPrice=cheap").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn sections_export_as_csv() {
        let categories = Table::new(
            vec!["CATEGORY".into(), "REVENUE".into()],
            vec![vec![json!("Audio"), json!(1200.5)], vec![json!("Power"), json!(300)]],
        );
        let warehouse = FakeWarehouse::new().respond("AS CATEGORY", categories);
        let request = Request::builder()
            .uri("/v1/dashboards/sales/sections/categories/export?start=2024-01-01&end=2024-01-31")
            .body(Body::empty())
            .expect("request");
        let (status, headers, body) = send(app(warehouse), request).await;

        assert_eq!(status, StatusCode::OK);
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(disposition.starts_with("attachment; filename=\"sales_categories_"));
        assert_eq!(String::from_utf8(body).expect("utf8"), "CATEGORY,REVENUE\nAudio,1200.5\nPower,300\n");
    }

    #[tokio::test]
    async fn assistant_round_trip() {
        let analyst = FakeAnalyst::answering(vec![AnalystContent::Text {
            text: "Revenue grew.".into(),
        }]);
        let app = app_with(FakeWarehouse::new(), analyst, None);

        let (status, _, body) = send(
            app.clone(),
            post_json("/v1/assistant/messages", json!({ "prompt": "How is revenue?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["message"]["role"], "analyst");
        assert_eq!(body["message"]["content"][0]["text"], "Revenue grew.");

        let session = body["sessionId"].as_str().expect("session id").to_string();
        let (status, history) = get_json(app.clone(), &format!("/v1/assistant/sessions/{session}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["messages"].as_array().map(Vec::len), Some(2));

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/assistant/sessions/{session}"))
            .body(Body::empty())
            .expect("request");
        let (status, _, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = get_json(app, &format!("/v1/assistant/sessions/{session}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn assistant_failures_use_the_error_envelope() {
        let app = app_with(FakeWarehouse::new(), FakeAnalyst::timing_out(), None);
        let (status, _, body) = send(
            app.clone(),
            post_json("/v1/assistant/messages", json!({ "prompt": "slow" })),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["error"]["code"], "EXTERNAL_SERVICE_FAILURE");

        let (status, _, _) = send(app, post_json("/v1/assistant/messages", json!({ "prompt": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_generated_statements_export() {
        let rows = Table::new(vec!["N".into()], vec![vec![json!(1)], vec![json!(2)]]);
        let analyst = FakeAnalyst::answering(vec![AnalystContent::Sql {
            statement: "SELECT N FROM numbers".into(),
        }]);
        let app = app_with(FakeWarehouse::new().respond("FROM numbers", rows), analyst, None);

        let (_, _, body) = send(
            app.clone(),
            post_json("/v1/assistant/messages", json!({ "prompt": "List numbers" })),
        )
        .await;
        let body: Value = serde_json::from_slice(&body).expect("json");
        let session = body["sessionId"].as_str().expect("session id").to_string();

        let (status, headers, body) = send(
            app.clone(),
            post_json(
                "/v1/assistant/export",
                json!({ "sessionId": session, "statement": "SELECT N FROM numbers" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/csv; charset=utf-8")
        );
        assert_eq!(body, b"N\n1\n2\n".to_vec());

        let (status, _, body) = send(
            app.clone(),
            post_json(
                "/v1/assistant/export",
                json!({ "sessionId": session, "statement": "SELECT EMAIL FROM Customers" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["error"]["code"], "STATEMENT_NOT_FOUND");

        let (status, _, _) = send(
            app,
            post_json(
                "/v1/assistant/export",
                json!({ "sessionId": "someone-else", "statement": "SELECT N FROM numbers" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
