use axum::{
    body::Bytes,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use session_store::SessionInfo;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{UploadForm, json_body};
use crate::collaborators::{Answer, DecodeError, GenerationError};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{QueryRequest, QueryResponse, SessionCreated};
use crate::service::AppState;

/// `POST /sessions`: the request body is the raw document.
pub async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> ServiceResult<Json<SessionCreated>> {
    open_session(&state, &body).await.map(Json)
}

/// `POST /api/chat-pdf/upload`: the document arrives as multipart field `file`.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServiceResult<Json<SessionCreated>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;
    info!("Received document upload: {}", file.filename);

    open_session(&state, &file.data).await.map(Json)
}

/// Decode the document and register it. Nothing is stored unless decoding finishes.
async fn open_session(state: &AppState, raw: &[u8]) -> ServiceResult<SessionCreated> {
    let limit = state.limits.decode_timeout;
    let pages = timeout(limit, state.decoder.decode(raw))
        .await
        .map_err(|_| DecodeError::Timeout(limit))??;

    if pages.is_empty() {
        return Err(DecodeError::Empty.into());
    }

    let page_count = pages.len();
    let session_id = state.sessions.create(pages).await?;
    info!("Session {} created with {} pages", session_id, page_count);

    Ok(SessionCreated::new(session_id, page_count))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ServiceResult<Json<SessionInfo>> {
    let session = state.sessions.get(&session_id).await?;
    Ok(Json(session.info()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ServiceResult<StatusCode> {
    state.sessions.evict(&session_id).await?;
    info!("Session {} closed", session_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Answer a question about a session's document.
pub async fn ask(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ServiceResult<Json<QueryResponse>> {
    let request = json_body(payload)?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ServiceError::InvalidInput(
            "Query text is required".to_string(),
        ));
    }

    let session = state.sessions.get(&session_id).await?;
    let pages = session.pages();

    let answer = match generate(&state, pages, text).await {
        Ok(answer) => answer,
        Err(GenerationError::TooLarge { estimated, limit }) => {
            warn!(
                "Query for session {} exceeds the token limit ({} > {})",
                session_id, estimated, limit
            );
            Answer::too_large()
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(QueryResponse {
        success: true,
        answer,
    }))
}

async fn generate(
    state: &AppState,
    pages: &[session_store::PagePayload],
    text: &str,
) -> Result<Answer, GenerationError> {
    state.limits.token_budget.check(pages, text)?;

    let limit = state.limits.generation_timeout;
    timeout(limit, state.answers.answer(pages, text))
        .await
        .map_err(|_| GenerationError::Timeout(limit))?
}
