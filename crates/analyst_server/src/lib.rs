use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use analyst_core::{AppConfig, ChatMessage, CortexClient, SqlSelection};

/// Shared across request handlers. Nothing here is mutable: correctness
/// under concurrency relies on the remote session-scoped tenant binding,
/// not on server-side state.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<AppConfig>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(cfg: AppConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            http: reqwest::Client::new(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn client_error(reason: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": reason })),
    )
}

fn downstream_error(err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": err.to_string() })),
    )
}

/// Reports configuration completeness; never fails.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.cfg;
    let missing = cfg.missing();
    Json(json!({
        "ok": missing.is_empty(),
        "missing": missing,
        "config": {
            "accountUrl": cfg.account_url,
            "semanticView": cfg.semantic_view,
            "warehouse": cfg.warehouse,
            "database": cfg.database,
            "schema": cfg.schema,
            "secureProcedure": cfg.secure_procedure,
            "tenants": cfg.tenants,
            "inferenceModel": cfg.inference_model,
        },
    }))
}

/// UI-facing configuration from a static JSON document, with a built-in
/// default when the file is absent or unparsable.
async fn app_config(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.cfg;
    match tokio::fs::read_to_string(&cfg.app_config_path).await {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(doc) => Json(doc),
            Err(e) => {
                tracing::warn!(
                    path = %cfg.app_config_path.display(),
                    error = %e,
                    "app config document is not valid JSON, serving default"
                );
                Json(default_app_config(cfg))
            }
        },
        Err(_) => Json(default_app_config(cfg)),
    }
}

fn default_app_config(cfg: &AppConfig) -> Value {
    json!({
        "title": "Secure Multi-Tenant Analyst",
        "subtitle": "Ask questions about sales data, scoped to your tenant",
        "tenants": cfg.tenants,
        "presetPrompts": [
            "What were total sales last month?",
            "Which product line has the highest revenue?",
            "Show the top five regions by total sales",
        ],
    })
}

/// Diagnostic snapshot: auth method in use, resolved routing target, and a
/// live round-trip against the SQL engine.
async fn debug(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.cfg;
    match CortexClient::new(state.http.clone(), cfg) {
        Ok(client) => {
            let sql_check = match client.execute_sql(cfg, "SELECT 1", None).await {
                Ok(result) => json!({ "ok": true, "rows": result.rows.len() }),
                Err(e) => json!({ "ok": false, "error": e.to_string() }),
            };
            Json(json!({
                "authMethod": client.auth_method(),
                "baseUrl": client.base_url(),
                "sqlCheck": sql_check,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
        }
        Err(e) => Json(json!({
            "authMethod": Value::Null,
            "error": e.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    reasoning_mode: bool,
}

/// The full orchestration: validate → Analyst → secure execution →
/// optional inference summary. Input rejection happens before any remote
/// call is made.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let cfg = &state.cfg;

    let message = body
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| client_error("message is required"))?;
    let tenant = body
        .tenant_id
        .as_deref()
        .and_then(|t| cfg.canonical_tenant(t))
        .ok_or_else(|| client_error("tenantId is missing or not in the configured tenant set"))?
        .to_string();

    let client = CortexClient::new(state.http.clone(), cfg).map_err(downstream_error)?;
    let reply = client
        .analyst_message(cfg, &body.conversation_history, message, SqlSelection::default())
        .await
        .map_err(downstream_error)?;

    let Some(sql) = reply.sql else {
        // No statement means the question needs clarification; surface the
        // Analyst's own text and suggestions.
        return Ok(Json(json!({
            "ok": true,
            "type": "text",
            "content": reply.explanation.unwrap_or_default(),
            "sql": Value::Null,
            "tenantId": tenant,
            "suggestions": reply.suggestions,
        })));
    };

    let result = client
        .execute_sql(cfg, &sql, Some(&tenant))
        .await
        .map_err(downstream_error)?;

    let explanation = reply.explanation.unwrap_or_default();
    let (content, verbose) = if body.reasoning_mode {
        match client.summarize(cfg, message, &explanation, &result).await {
            Ok(narrative) if !narrative.is_empty() => (narrative, Some(explanation)),
            Ok(_) => (explanation, None),
            Err(e) => {
                // Deliberate graceful degradation: the Analyst explanation
                // stands in for the narrative.
                tracing::warn!(error = %e, "inference failed, falling back to analyst explanation");
                (explanation, None)
            }
        }
    } else {
        (explanation, None)
    };

    Ok(Json(json!({
        "ok": true,
        "type": "data",
        "content": content,
        "sql": sql,
        "tenantId": tenant,
        "resultSet": {
            "columns": result.columns,
            "data": result.rows,
            "numRows": result.rows.len(),
        },
        "suggestions": reply.suggestions,
        "verbose": verbose,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestSqlRequest {
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
}

/// Direct execution bypass for debugging. Tenant-scoped only when a valid
/// tenant is supplied, unscoped otherwise.
async fn test_sql(
    State(state): State<AppState>,
    Json(body): Json<TestSqlRequest>,
) -> Result<Json<Value>, ApiError> {
    let cfg = &state.cfg;
    let sql = body
        .sql
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| client_error("sql is required"))?;
    let tenant = body
        .tenant_id
        .as_deref()
        .and_then(|t| cfg.canonical_tenant(t));

    let client = CortexClient::new(state.http.clone(), cfg).map_err(downstream_error)?;
    let result = client
        .execute_sql(cfg, sql, tenant)
        .await
        .map_err(downstream_error)?;

    Ok(Json(json!({
        "ok": true,
        "tenantId": tenant,
        "resultSet": {
            "columns": result.columns,
            "data": result.rows,
            "numRows": result.rows.len(),
        },
    })))
}

#[derive(Debug, Deserialize)]
struct TestAnalystRequest {
    #[serde(default)]
    question: Option<String>,
}

/// Analyst call without tenant execution, for isolated testing.
async fn test_analyst(
    State(state): State<AppState>,
    Json(body): Json<TestAnalystRequest>,
) -> Result<Json<Value>, ApiError> {
    let cfg = &state.cfg;
    let question = body
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| client_error("question is required"))?;

    let client = CortexClient::new(state.http.clone(), cfg).map_err(downstream_error)?;
    let reply = client
        .analyst_message(cfg, &[], question, SqlSelection::default())
        .await
        .map_err(downstream_error)?;

    Ok(Json(json!({
        "ok": true,
        "sql": reply.sql,
        "explanation": reply.explanation,
        "suggestions": reply.suggestions,
        "requestId": reply.request_id,
        "warnings": reply.warnings,
    })))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/app-config", get(app_config))
        .route("/api/debug", get(debug))
        .route("/api/chat", post(chat))
        .route("/api/test-sql", post(test_sql))
        .route("/api/test-analyst", post(test_analyst))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let port = cfg.port;
    let missing = cfg.missing();
    if !missing.is_empty() {
        tracing::warn!(?missing, "starting with incomplete configuration");
    }

    let state = AppState::new(cfg);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "analyst_server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
