use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::classifier::Prediction;
use super::utils::{ChatCompletionsClient, image_part, strip_code_fences, text_part, user_message};

pub const NARRATIVE_UNAVAILABLE: &str = "Unable to retrieve detailed explanation at the moment.";

/// Patient-facing explanation of a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lists: Option<Vec<String>>,
}

/// Either a generated narrative or the placeholder used when generation failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NarrativeMessage {
    Explained(Narrative),
    Unavailable(String),
}

impl NarrativeMessage {
    pub fn unavailable() -> Self {
        NarrativeMessage::Unavailable(NARRATIVE_UNAVAILABLE.to_string())
    }
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn narrate(
        &self,
        prediction: &Prediction,
        image: &[u8],
        media_type: &str,
    ) -> anyhow::Result<Narrative>;
}

pub fn narrative_prompt(prediction: &Prediction) -> String {
    format!(
        "The MRI scan is classified as '{}' with a confidence of {:.2}. \
        Based on this label, return a JSON object in the following format:\n\n\
        {{\n  \"header\": \"Short, patient-friendly title\",\n  \"lists\": [\n    \
        \"Simple explanation of the tumor\",\n    \"Key symptoms\",\n    \"Common causes\",\n    \
        \"Treatment options\",\n    \"Important notes for patients\"\n  ]\n}}\n\n\
        BUT - if the label is 'notumor', return only:\n\
        {{\n  \"header\": \"There is no brain tumor detected.\"\n}}\n\n\
        Keep the language simple. Do not include any explanation or text outside the JSON object.",
        prediction.label, prediction.confidence
    )
}

pub struct LlmNarrativeGenerator {
    client: ChatCompletionsClient,
    model: String,
}

impl LlmNarrativeGenerator {
    pub fn new(client: ChatCompletionsClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl NarrativeGenerator for LlmNarrativeGenerator {
    async fn narrate(
        &self,
        prediction: &Prediction,
        image: &[u8],
        media_type: &str,
    ) -> anyhow::Result<Narrative> {
        let content = vec![
            text_part(&narrative_prompt(prediction)),
            image_part(media_type, image),
        ];

        let reply = self
            .client
            .complete(&self.model, vec![user_message(content)], None)
            .await?;

        let narrative: Narrative = serde_json::from_str(strip_code_fences(&reply))
            .context("Narrative reply was not the expected JSON object")?;

        info!("Generated narrative for {}", prediction.label);
        Ok(narrative)
    }
}
