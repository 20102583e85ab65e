//! HTTP gateway over the conversation runtime.
//!
//! - `POST /chat`: one conversational turn
//! - `GET  /calculate`: arithmetic evaluator, bypassing the runtime
//! - `GET  /products`: product knowledge retrieval, bypassing the runtime
//! - `GET  /outlets`: outlet text-to-SQL, bypassing the runtime
//! - `GET  /health`: readiness of the database and the knowledge index

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use kopi_agent::{AgentRuntime, OutletDirectory, ProductKnowledgeBase, QuestionAnswerer};
use kopi_core::calculator::{evaluate, format_number};
use kopi_core::domain::message::{Message, Role};
use kopi_db::DbPool;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::health::{self, HealthState};

/// Everything a request needs; built once by bootstrap and shared read-only.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub products: Arc<ProductKnowledgeBase>,
    pub outlets: Arc<OutletDirectory>,
    pub db_pool: DbPool,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    #[serde(alias = "type")]
    pub role: String,
    pub content: String,
}

impl HistoryEntry {
    fn into_message(self) -> Result<Message, String> {
        let role = self.role.parse::<Role>()?;
        Ok(Message::new(role, self.content, Utc::now()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpressionParams {
    pub expression: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuestionParams {
    pub query: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalculateResponse {
    pub expression: String,
    pub result: f64,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub query: String,
    pub answer: String,
    pub context: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutletsResponse {
    pub query: String,
    pub sql: String,
    pub answer: String,
}

pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let health = health::router(HealthState {
        db_pool: state.db_pool.clone(),
        indexed_chunks: state.products.len(),
    });

    Router::new()
        .route("/chat", post(chat))
        .route("/calculate", get(calculate))
        .route("/products", get(products))
        .route("/outlets", get(outlets))
        .with_state(state)
        .merge(health)
        .layer(cors_layer(cors_allowed_origins))
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(
                        event_name = "server.cors.invalid_origin",
                        origin = %origin,
                        "ignoring invalid CORS origin"
                    );
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &correlation_id))?;
    let history = request
        .history
        .into_iter()
        .map(HistoryEntry::into_message)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| ApiError::bad_request(message, &correlation_id))?;

    let report = state
        .runtime
        .respond_with_report(&history, &request.message, &correlation_id)
        .await
        .map_err(|error| ApiError::from(error.into_interface(&correlation_id)))?;

    info!(
        event_name = "server.chat.completed",
        correlation_id = %correlation_id,
        history_len = history.len(),
        tool = report.invocation.as_ref().map(|call| call.tool_name.as_str()).unwrap_or("none"),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chat turn served"
    );

    Ok(Json(ChatResponse { answer: report.reply.content().to_string() }))
}

async fn calculate(
    Query(params): Query<ExpressionParams>,
) -> Result<Json<CalculateResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let expression = required(params.expression, "expression", &correlation_id)?;

    let result = evaluate(&expression).map_err(|error| {
        ApiError::bad_request(format!("invalid expression: {error}"), &correlation_id)
    })?;

    info!(
        event_name = "server.calculate.completed",
        correlation_id = %correlation_id,
        result = %format_number(result),
        "calculation served"
    );

    Ok(Json(CalculateResponse { expression, result, status: "success".to_string() }))
}

async fn products(
    State(state): State<AppState>,
    Query(params): Query<QuestionParams>,
) -> Result<Json<ProductsResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let query = required(params.query, "query", &correlation_id)?;

    let answer = state
        .products
        .answer(&query)
        .await
        .map_err(|error| ApiError::from(error.into_interface(&correlation_id)))?;

    Ok(Json(ProductsResponse { query, answer: answer.answer, context: answer.context }))
}

async fn outlets(
    State(state): State<AppState>,
    Query(params): Query<QuestionParams>,
) -> Result<Json<OutletsResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let query = required(params.query, "query", &correlation_id)?;

    let outcome = state
        .outlets
        .answer_with_sql(&query)
        .await
        .map_err(|error| ApiError::from(error.into_interface(&correlation_id)))?;

    info!(
        event_name = "server.outlets.completed",
        correlation_id = %correlation_id,
        rows = outcome.rows,
        "outlet query served"
    );

    Ok(Json(OutletsResponse { query, sql: outcome.sql, answer: outcome.answer }))
}

fn required(value: Option<String>, name: &str, correlation_id: &str) -> Result<String, ApiError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ApiError::bad_request(format!("query parameter `{name}` is required"), correlation_id)),
    }
}
