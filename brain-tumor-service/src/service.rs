use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
};
use reqwest::Client;
use serde_json::{Value, json};
use session_store::{InMemorySessionStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::collaborators::{
    AnswerGenerator, ChatCompletionsClient, Chatbot, DocumentDecoder, HuggingFaceSegmenter,
    ImageClassifier, LlmAnswerGenerator, LlmNarrativeGenerator, ModelServerClassifier,
    NarrativeGenerator, OpenRouterChatModel, PdfDecoder, PdfReportRenderer, PineconeKnowledgeBase,
    ReportRenderer, TokenBudget,
};
use crate::config::ServiceConfig;
use crate::handlers::{chatbot, documents, prediction, report};

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

const CHAT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bounds applied to every collaborator call made on behalf of a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub token_budget: TokenBudget,
    pub decode_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            token_budget: TokenBudget::default(),
            decode_timeout: Duration::from_secs(60),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub decoder: Arc<dyn DocumentDecoder>,
    pub answers: Arc<dyn AnswerGenerator>,
    pub classifier: Arc<dyn ImageClassifier>,
    pub narrator: Arc<dyn NarrativeGenerator>,
    pub reports: Arc<dyn ReportRenderer>,
    pub chatbot: Arc<Chatbot>,
    pub limits: RequestLimits,
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config)?;
    Ok(build_router(app_state))
}

fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let store = Arc::new(InMemorySessionStore::new(config.store.clone()).inspect_err(|e| {
        error!("Failed to create session store: {}", e);
    })?);
    store.spawn_reaper();
    info!(
        "Session store ready: {} sessions, {} bytes, ttl {:?}",
        config.store.max_sessions, config.store.max_payload_bytes, config.store.ttl
    );

    let http = Client::new();
    let llm = ChatCompletionsClient::new(http.clone(), &config.llm);
    let segmenter = Arc::new(HuggingFaceSegmenter::new(
        http.clone(),
        config.segmentation_url.clone(),
        config.hugging_face_api_key.clone(),
    ));
    let knowledge = Arc::new(PineconeKnowledgeBase::new(
        http.clone(),
        config.pinecone_index_host.clone(),
        config.pinecone_api_key.clone(),
    ));
    let chat_model = Arc::new(OpenRouterChatModel::new(
        config.llm.api_key.clone(),
        config.llm.chat_model.clone(),
    ));

    Ok(AppState {
        sessions: store,
        decoder: Arc::new(PdfDecoder),
        answers: Arc::new(LlmAnswerGenerator::new(
            llm.clone(),
            config.llm.answer_model.clone(),
        )),
        classifier: Arc::new(ModelServerClassifier::new(
            http,
            config.classifier_url.clone(),
        )),
        narrator: Arc::new(LlmNarrativeGenerator::new(
            llm,
            config.llm.narrative_model.clone(),
        )),
        reports: Arc::new(PdfReportRenderer::new(segmenter)),
        chatbot: Arc::new(Chatbot::new(knowledge, chat_model, CHAT_TIMEOUT)),
        limits: RequestLimits {
            token_budget: config.token_budget,
            decode_timeout: config.decode_timeout,
            generation_timeout: config.generation_timeout,
        },
    })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/sessions", post(documents::create_session))
        .route(
            "/sessions/{session_id}",
            get(documents::get_session).delete(documents::delete_session),
        )
        .route("/sessions/{session_id}/queries", post(documents::ask))
        .route("/api/chat-pdf/upload", post(documents::upload))
        .route("/api/chat-pdf/ask/{session_id}", post(documents::ask))
        .route("/api/interface/predict", post(prediction::predict))
        .route("/api/report/generate", post(report::generate))
        .route("/api/chatbot", post(chatbot::chat))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Brain Tumor Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "MRI classification, conversational document Q&A and report generation",
        "endpoints": {
            "POST /sessions": "Upload a PDF (raw body) and open a document session",
            "GET /sessions/{session_id}": "Session metadata",
            "DELETE /sessions/{session_id}": "Close a document session",
            "POST /sessions/{session_id}/queries": "Ask a question about the document",
            "POST /api/chat-pdf/upload": "Upload a PDF (multipart field 'file')",
            "POST /api/chat-pdf/ask/{session_id}": "Ask a question about the document",
            "POST /api/interface/predict": "Classify an MRI image (multipart field 'file')",
            "POST /api/report/generate": "Generate a PDF diagnosis report (multipart: file, tumor_type, confidence as a percentage)",
            "POST /api/chatbot": "Ask the brain tumor knowledge base",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store = match state.sessions.stats().await {
        Ok(stats) => json!(stats),
        Err(e) => {
            error!("Failed to read session store stats: {}", e);
            Value::Null
        }
    };

    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sessions": store
    }))
}
