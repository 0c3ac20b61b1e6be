use serde::{Deserialize, Serialize};

use crate::collaborators::{Answer, NarrativeMessage, TumorLabel};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub success: bool,
    pub session_id: String,
    pub message: String,
}

impl SessionCreated {
    pub fn new(session_id: String, page_count: usize) -> Self {
        Self {
            success: true,
            session_id,
            message: format!("Document processed into {page_count} pages"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub answer: Answer,
}

#[derive(Debug, Serialize)]
pub struct PredictionData {
    pub result: TumorLabel,
    pub confidence: f32,
    pub message: NarrativeMessage,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub data: PredictionData,
}

pub type ChatRequest = QueryRequest;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub response: String,
}

impl ChatResponse {
    pub fn new(response: String) -> Self {
        Self {
            success: true,
            message: "Response generated successfully".to_string(),
            response,
        }
    }
}
