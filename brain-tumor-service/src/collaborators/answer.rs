use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use session_store::PagePayload;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::utils::{
    ChatCompletionsClient, image_part, strip_code_fences, system_message, text_part, user_message,
};

pub const TOO_LARGE_MESSAGE: &str = "The PDF is too large to process within the token limit.";

const SYSTEM_PROMPT: &str = "If the user greets you (e.g., 'hi', 'hello'), respond formally and politely, \
and always reply using the strict JSON format described below.

You are a helpful, precise assistant trained to analyze medical documents, MRI scans, and provide expert-level answers to user queries.

When answering any query, including greetings, ALWAYS return your answer in this strict JSON format:

{
  \"message\": \"Concise 20-30 word summary of the answer.\",
  \"description\": \"Brief and focused explanation (1-2 short paragraphs, directly addressing the query).\",
  \"lists\": [\"Optional: include only if needed to break down information\", \"Each item should be clear and short\"]
}

Important formatting rules:
- DO NOT include any text outside this JSON structure.
- ONLY include the 'lists' array if it adds value to the explanation.
- DO NOT answer anything beyond what was asked.
- Use plain language suitable for patients or general users.
- Be accurate, to the point, and professional.
";

/// Structured reply to a question about an uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub message: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lists: Option<Vec<String>>,
}

impl Answer {
    pub fn too_large() -> Self {
        Self {
            message: TOO_LARGE_MESSAGE.to_string(),
            description: String::new(),
            lists: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Request too large: estimated {estimated} tokens, limit is {limit}")]
    TooLarge { estimated: usize, limit: usize },

    #[error("Answer generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Answer generation failed: {0}")]
    Upstream(String),

    #[error("Malformed answer from language model: {0}")]
    Malformed(String),
}

/// Rough input-size policy for generation requests.
///
/// Query text is costed per whitespace-separated word and each page by the
/// length of its base64 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub tokens_per_word: f64,
    pub bytes_per_token: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens: 131_072,
            tokens_per_word: 1.333,
            bytes_per_token: 4,
        }
    }
}

impl TokenBudget {
    pub fn estimate(&self, pages: &[PagePayload], query: &str) -> usize {
        let words = query.split_whitespace().count();
        let text_tokens = (words as f64 * self.tokens_per_word) as usize;
        let per_token = self.bytes_per_token.max(1);
        let image_tokens: usize = pages
            .iter()
            .map(|page| base64_len(page.len()) / per_token)
            .sum();
        text_tokens + image_tokens
    }

    pub fn check(&self, pages: &[PagePayload], query: &str) -> Result<(), GenerationError> {
        let estimated = self.estimate(pages, query);
        if estimated > self.max_tokens {
            return Err(GenerationError::TooLarge {
                estimated,
                limit: self.max_tokens,
            });
        }
        Ok(())
    }
}

fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

/// Answers questions grounded in a document's page images.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, pages: &[PagePayload], query: &str) -> Result<Answer, GenerationError>;
}

pub struct LlmAnswerGenerator {
    client: ChatCompletionsClient,
    model: String,
}

impl LlmAnswerGenerator {
    pub fn new(client: ChatCompletionsClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn answer(&self, pages: &[PagePayload], query: &str) -> Result<Answer, GenerationError> {
        info!(
            "Answering query over {} pages with {}",
            pages.len(),
            self.model
        );

        let mut content = vec![text_part(query)];
        content.extend(
            pages
                .iter()
                .map(|page| image_part(&page.media_type, &page.data)),
        );
        let messages = vec![system_message(SYSTEM_PROMPT), user_message(content)];

        let reply = self
            .client
            .complete(&self.model, messages, Some(0.0))
            .await
            .map_err(|e| GenerationError::Upstream(e.to_string()))?;

        parse_answer(&reply)
    }
}

pub fn parse_answer(reply: &str) -> Result<Answer, GenerationError> {
    serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}
