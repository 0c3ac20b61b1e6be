use anyhow::anyhow;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use reqwest::Client;
use rig::completion::Prompt;
use rig::prelude::*;
use rig::providers::openrouter;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

pub const INVALID_QUERY: &str = "Invalid query: Please provide a non-empty text input";
pub const EMBEDDING_FAILED: &str = "Error processing your query. Please try again.";
pub const SEARCH_FAILED: &str = "Error accessing medical knowledge base. Please try again later.";
pub const NO_MATCHES: &str = "No relevant information found in our knowledge base.";
pub const AI_UNAVAILABLE: &str = "Error connecting to AI service. Please try again later.";

const PINECONE_API_VERSION: &str = "2024-07";

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Knowledge base query failed: {0}")]
    Search(String),
}

/// Retrieves reference passages relevant to a question.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, KnowledgeError>;
}

/// Answers a question given a system preamble.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(&self, preamble: &str, question: &str) -> anyhow::Result<String>;
}

/// Shared AllMiniLML6V2 embedder, loaded on first use.
type Embedder = Arc<Mutex<Option<TextEmbedding>>>;

/// Pinecone index queried with fastembed AllMiniLML6V2 embeddings.
pub struct PineconeKnowledgeBase {
    http: Client,
    index_host: Option<String>,
    api_key: Option<String>,
    top_k: usize,
    embedder: Embedder,
}

impl PineconeKnowledgeBase {
    pub fn new(http: Client, index_host: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            index_host,
            api_key,
            top_k: 3,
            embedder: Arc::default(),
        }
    }

    async fn query_index(&self, vector: Vec<f32>) -> anyhow::Result<Vec<String>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("PINECONE_API_KEY not set"))?;
        let host = self
            .index_host
            .as_deref()
            .ok_or_else(|| anyhow!("PINECONE_INDEX_HOST not set"))?;
        let host = host.trim_end_matches('/');
        let url = if host.starts_with("http") {
            format!("{host}/query")
        } else {
            format!("https://{host}/query")
        };

        let response = self
            .http
            .post(url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&json!({
                "vector": vector,
                "topK": self.top_k,
                "includeMetadata": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Pinecone query failed: {}", response.status()));
        }

        let body: Value = response.json().await?;
        Ok(passages_from_matches(&body))
    }
}

/// Extract the `texts` metadata of every match, in rank order.
pub fn passages_from_matches(body: &Value) -> Vec<String> {
    body["matches"]
        .as_array()
        .map(|matches| {
            matches
                .iter()
                .filter_map(|m| m["metadata"]["texts"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Generate embedding for text using fastembed
async fn embed_query(embedder: &Embedder, text: &str) -> anyhow::Result<Vec<f32>> {
    let embedder = Arc::clone(embedder);
    let input = text.to_owned();

    // ONNX inference is CPU bound, keep it off the async workers.
    let embedding = tokio::task::spawn_blocking(move || {
        let mut slot = embedder
            .lock()
            .map_err(|_| anyhow!("Embedding model lock poisoned"))?;
        if slot.is_none() {
            info!("Loading embedding model AllMiniLML6V2");
            *slot = Some(TextEmbedding::try_new(InitOptions::new(
                EmbeddingModel::AllMiniLML6V2,
            ))?);
        }
        let model = slot
            .as_mut()
            .ok_or_else(|| anyhow!("Embedding model unavailable"))?;
        let embeddings = model.embed(vec![input], None)?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedding model returned no vectors"))
    })
    .await??;

    info!(
        "Query embedded successfully. Embedding size: {}",
        embedding.len()
    );
    Ok(embedding)
}

#[async_trait]
impl KnowledgeBase for PineconeKnowledgeBase {
    async fn search(&self, query: &str) -> Result<Vec<String>, KnowledgeError> {
        let vector = embed_query(&self.embedder, query)
            .await
            .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        self.query_index(vector)
            .await
            .map_err(|e| KnowledgeError::Search(e.to_string()))
    }
}

/// OpenRouter-hosted chat model driven through a rig agent.
pub struct OpenRouterChatModel {
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenRouterChatModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
        }
    }
}

#[async_trait]
impl ChatModel for OpenRouterChatModel {
    async fn reply(&self, preamble: &str, question: &str) -> anyhow::Result<String> {
        let client = openrouter::Client::new(&self.api_key);
        let agent = client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(self.temperature)
            .build();
        let response = agent.prompt(question.to_string()).await?;
        Ok(response)
    }
}

pub fn chat_preamble(context: &str) -> String {
    format!(
        "You are a medical assistant. Only reply to:\n\
        - Brain tumor-related questions\n\
        - Greetings\n\
        - Today's date or time\n\
        - Medical helpline info\n\n\
        If asked anything else, say: 'I can only help with brain tumor related information.'\n\
        Always respond in very short bullet points. Use only the provided context. \
        If unsure, say 'Not sure'.\n\nContext: {context}"
    )
}

/// Retrieval-augmented chat over the brain tumor knowledge base.
///
/// Never fails: every failing step yields a user-facing explanation instead.
pub struct Chatbot {
    knowledge: Arc<dyn KnowledgeBase>,
    model: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl Chatbot {
    pub fn new(
        knowledge: Arc<dyn KnowledgeBase>,
        model: Arc<dyn ChatModel>,
        timeout: Duration,
    ) -> Self {
        Self {
            knowledge,
            model,
            timeout,
        }
    }

    pub async fn reply(&self, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return INVALID_QUERY.to_string();
        }
        info!("Processing chatbot query: {}", query);

        let passages = match self.knowledge.search(query).await {
            Ok(passages) => passages,
            Err(e @ KnowledgeError::Embedding(_)) => {
                error!("{}", e);
                return EMBEDDING_FAILED.to_string();
            }
            Err(e @ KnowledgeError::Search(_)) => {
                error!("{}", e);
                return SEARCH_FAILED.to_string();
            }
        };
        if passages.is_empty() {
            return NO_MATCHES.to_string();
        }

        let preamble = chat_preamble(&passages.join("\n\n"));
        match tokio::time::timeout(self.timeout, self.model.reply(&preamble, query)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Chat model request failed: {}", e);
                AI_UNAVAILABLE.to_string()
            }
            Err(_) => {
                error!("Chat model timed out after {:?}", self.timeout);
                AI_UNAVAILABLE.to_string()
            }
        }
    }
}
