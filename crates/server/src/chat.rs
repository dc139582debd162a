use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, post},
    Json, Router,
};
use fleetchat_agent::runtime::{AgentRuntime, TurnRequest};
use fleetchat_core::domain::decision::Decision;
use fleetchat_core::errors::InterfaceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

pub const MISSING_MESSAGE: &str = "Missing 'message' in request body";

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, alias = "utterance")]
    pub message: Option<String>,
    #[serde(default, alias = "form_data")]
    pub form_data: Option<Map<String, Value>>,
    #[serde(default, alias = "conversation_id")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(flatten)]
    pub decision: Decision,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub conversation_id: String,
    pub cleared: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    pub correlation_id: String,
}

/// Transport-level rejection rendered as `{status: "error", message}`.
pub struct ApiError(pub InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.user_message().to_string())
            }
            InterfaceError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.user_message().to_string())
            }
        };
        let body = ErrorBody {
            status: "error".to_string(),
            message,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/{conversation_id}", delete(clear_conversation))
        .with_state(ChatState { runtime })
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request_id = format!("req-{}", Uuid::new_v4());

    let Json(request) = payload.map_err(|rejection| {
        warn!(
            event_name = "server.chat.rejected",
            correlation_id = %request_id,
            reason = %rejection.body_text(),
            "chat request body could not be parsed"
        );
        // A well-formed body with mistyped fields gets the deserializer's reason.
        let message = match &rejection {
            JsonRejection::JsonDataError(_) => rejection.body_text(),
            _ => MISSING_MESSAGE.to_string(),
        };
        ApiError(InterfaceError::bad_request(message, request_id.clone()))
    })?;

    let message = request
        .message
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .ok_or_else(|| {
            warn!(
                event_name = "server.chat.rejected",
                correlation_id = %request_id,
                reason = "missing message",
                "chat request rejected"
            );
            ApiError(InterfaceError::bad_request(MISSING_MESSAGE, request_id.clone()))
        })?;

    info!(
        event_name = "server.chat.request",
        correlation_id = %request_id,
        conversation_id = request.conversation_id.as_deref().unwrap_or("new"),
        has_form_data = request.form_data.is_some(),
        "chat request received"
    );

    let response = state
        .runtime
        .handle_turn(TurnRequest {
            utterance: message,
            form_data: request.form_data,
            conversation_id: request.conversation_id,
        })
        .await;

    info!(
        event_name = "server.chat.response",
        correlation_id = %response.decision.id,
        conversation_id = %response.conversation_id,
        intent = response.decision.intent.as_str(),
        components = response.decision.components.len(),
        "chat turn completed"
    );

    Ok(Json(ChatResponse { decision: response.decision, conversation_id: response.conversation_id }))
}

pub async fn clear_conversation(
    State(state): State<ChatState>,
    Path(conversation_id): Path<String>,
) -> Json<ClearResponse> {
    let cleared = state.runtime.clear_conversation(&conversation_id).await;
    Json(ClearResponse { conversation_id, cleared })
}
