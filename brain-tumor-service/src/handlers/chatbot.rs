use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};

use super::json_body;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{ChatRequest, ChatResponse};
use crate::service::AppState;

/// Knowledge-base chat. Retrieval and model failures still answer 200 with explanatory text.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ServiceResult<Json<ChatResponse>> {
    let request = json_body(payload)?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ServiceError::InvalidInput(
            "Text query is empty".to_string(),
        ));
    }

    let response = state.chatbot.reply(text).await;
    Ok(Json(ChatResponse::new(response)))
}
