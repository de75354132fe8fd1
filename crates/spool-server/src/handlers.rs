use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use spool_core::messages::{PromptEntry, Role};
use spool_engine::{CompactionOutcome, ContextStatus, EngineError};
use spool_store::messages::MessageRow;
use spool_store::StoreError;

use crate::server::AppState;

/// Structured error body: `{ "error": { "code", "message" } }`.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::SummarizationFailed(_) => StatusCode::BAD_GATEWAY,
            EngineError::SummarizationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            EngineError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: e.kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    pub thread_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStatusResponse {
    pub thread_id: String,
    #[serde(flatten)]
    pub status: ContextStatus,
    pub needs_summarization: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextActionBody {
    pub thread_id: String,
    pub action: ContextAction,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAction {
    Summarize,
    Status,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendBody {
    pub thread_id: String,
    pub role: Role,
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub estimated_tokens: u32,
    pub created_at: String,
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id.to_string(),
            thread_id: row.thread_key.to_string(),
            role: row.role,
            estimated_tokens: row.estimated_tokens,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub thread_id: String,
    pub entries: Vec<PromptEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    pub thread_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub thread_id: String,
    pub messages_deleted: u32,
    pub snapshots_deleted: u32,
}

fn status_response(state: &AppState, thread_id: &str) -> Result<ContextStatusResponse, ApiError> {
    let status = state.service.context_status(thread_id)?;
    let needs_summarization = state.service.needs_summarization(thread_id)?;
    Ok(ContextStatusResponse {
        thread_id: thread_id.to_owned(),
        status,
        needs_summarization,
    })
}

/// GET /api/chat/context?threadId=X
pub async fn get_context(
    State(state): State<AppState>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ContextStatusResponse>, ApiError> {
    Ok(Json(status_response(&state, &query.thread_id)?))
}

/// POST /api/chat/context — `summarize` runs compaction, `status` mirrors GET.
pub async fn post_context(
    State(state): State<AppState>,
    Json(body): Json<ContextActionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match body.action {
        ContextAction::Status => {
            let resp = status_response(&state, &body.thread_id)?;
            Ok(Json(serde_json::to_value(resp).unwrap_or_default()))
        }
        ContextAction::Summarize => {
            let outcome = state.service.auto_summarize(&body.thread_id).await?;
            let value = match outcome {
                CompactionOutcome::Compacted(snapshot) => json!({
                    "action": "summarized",
                    "snapshot": snapshot,
                }),
                CompactionOutcome::Skipped(reason) => json!({
                    "action": "skipped",
                    "reason": reason.to_string(),
                }),
            };
            Ok(Json(value))
        }
    }
}

/// POST /api/chat/messages
pub async fn append_message(
    State(state): State<AppState>,
    Json(body): Json<AppendBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let row = state
        .service
        .append_message(&body.thread_id, body.role, &body.content)?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// GET /api/chat/prompt?threadId=X
pub async fn get_prompt(
    State(state): State<AppState>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<PromptResponse>, ApiError> {
    let entries = state.service.assemble_prompt(&query.thread_id)?;
    Ok(Json(PromptResponse {
        thread_id: query.thread_id,
        entries,
    }))
}

/// POST /api/chat/reset
pub async fn reset_thread(
    State(state): State<AppState>,
    Json(body): Json<ResetBody>,
) -> Result<Json<ResetResponse>, ApiError> {
    let stats = state.service.reset_thread(&body.thread_id)?;
    Ok(Json(ResetResponse {
        thread_id: body.thread_id,
        messages_deleted: stats.messages_deleted,
        snapshots_deleted: stats.snapshots_deleted,
    }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Response {
    match state.service.ping() {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        )
            .into_response(),
    }
}
