use anyhow::anyhow;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::LlmConfig;

/// Client for an OpenAI-compatible chat completions endpoint with vision support.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(http: Client, config: &LlmConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Send `messages` to `model` and return the text of the first choice.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<Value>,
        temperature: Option<f32>,
    ) -> anyhow::Result<String> {
        let mut payload = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temperature) = temperature {
            payload["temperature"] = json!(temperature);
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        let response_json: Value = response.json().await?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))?;

        debug!("LLM {} returned {} characters", model, content.len());
        Ok(content.to_string())
    }
}

pub fn system_message(text: &str) -> Value {
    json!({ "role": "system", "content": text })
}

pub fn user_message(content: Vec<Value>) -> Value {
    json!({ "role": "user", "content": content })
}

pub fn text_part(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

/// Inline image content part, encoded as a base64 data URL.
pub fn image_part(media_type: &str, data: &[u8]) -> Value {
    json!({
        "type": "image_url",
        "image_url": {
            "url": format!("data:{};base64,{}", media_type, STANDARD.encode(data))
        }
    })
}

/// Strip a surrounding markdown code fence (```json ... ```) from a model reply.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
