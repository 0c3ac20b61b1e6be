use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

/// Produces a segmented rendering of an MRI image.
#[async_trait]
pub trait SegmentationService: Send + Sync {
    async fn segment(&self, image: &[u8], media_type: &str) -> anyhow::Result<Vec<u8>>;
}

/// Hosted segmentation model on the Hugging Face inference API.
pub struct HuggingFaceSegmenter {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl HuggingFaceSegmenter {
    pub fn new(http: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl SegmentationService for HuggingFaceSegmenter {
    async fn segment(&self, image: &[u8], media_type: &str) -> anyhow::Result<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("HUGGING_FACE_API_KEY not set"))?;

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", media_type)
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Segmentation failed: {} - {}", status, detail));
        }

        let segmented = response.bytes().await?.to_vec();
        info!("Segmentation returned {} bytes", segmented.len());
        Ok(segmented)
    }
}
