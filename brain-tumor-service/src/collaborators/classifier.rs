use async_trait::async_trait;
use image::imageops::{self, FilterType};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Side length of the square RGB input the classifier expects.
pub const INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TumorLabel {
    Glioma,
    Meningioma,
    NoTumor,
    Pituitary,
}

impl TumorLabel {
    /// Labels in the order of the model's output scores.
    pub const ALL: [TumorLabel; 4] = [
        TumorLabel::Glioma,
        TumorLabel::Meningioma,
        TumorLabel::NoTumor,
        TumorLabel::Pituitary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TumorLabel::Glioma => "glioma",
            TumorLabel::Meningioma => "meningioma",
            TumorLabel::NoTumor => "notumor",
            TumorLabel::Pituitary => "pituitary",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TumorLabel::Glioma => "Glioma Tumor",
            TumorLabel::Meningioma => "Meningioma Tumor",
            TumorLabel::NoTumor => "No Tumor",
            TumorLabel::Pituitary => "Pituitary Tumor",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for TumorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable tumor name; unknown labels are capitalized as given.
pub fn display_tumor_name(raw: &str) -> String {
    if let Some(label) = TumorLabel::parse(raw) {
        return label.display_name().to_string();
    }
    let lower = raw.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Media type for an accepted upload, chosen by file extension.
pub fn image_media_type(filename: &str) -> Option<&'static str> {
    let (_, extension) = filename.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: TumorLabel,
    pub confidence: f32,
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Image processing error: {0}")]
    InvalidImage(String),

    #[error("Classifier request failed: {0}")]
    Upstream(String),

    #[error("Malformed classifier response: {0}")]
    Malformed(String),
}

/// A single preprocessed image, NHWC `[1, 224, 224, 3]`, values in `0.0..=255.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Decode, convert to RGB, then resize to the model input size and cast to f32.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, ClassifierError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| ClassifierError::InvalidImage(e.to_string()))?;
        let rgb = image.to_rgb8();
        let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

        let side = INPUT_SIZE as usize;
        let data: Vec<f32> = resized.into_raw().into_iter().map(f32::from).collect();
        Ok(Self {
            shape: [1, side, side, 3],
            data,
        })
    }

    /// Nested `[height][width][channel]` rows for a single instance.
    pub fn instance(&self) -> Vec<Vec<[f32; 3]>> {
        let width = self.shape[2];
        self.data
            .chunks_exact(3)
            .map(|px| [px[0], px[1], px[2]])
            .collect::<Vec<_>>()
            .chunks(width)
            .map(<[[f32; 3]]>::to_vec)
            .collect()
    }
}

/// Pick the highest-scoring label.
pub fn prediction_from_scores(scores: &[f32]) -> Result<Prediction, ClassifierError> {
    if scores.len() != TumorLabel::ALL.len() {
        return Err(ClassifierError::Malformed(format!(
            "expected {} scores, got {}",
            TumorLabel::ALL.len(),
            scores.len()
        )));
    }

    let (index, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| ClassifierError::Malformed("no scores".to_string()))?;

    Ok(Prediction {
        label: TumorLabel::ALL[index],
        confidence,
    })
}

/// Classifies a brain MRI image.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, tensor: &ImageTensor) -> Result<Prediction, ClassifierError>;
}

/// Calls a model server exposing the TensorFlow Serving REST predict API.
pub struct ModelServerClassifier {
    http: Client,
    url: String,
}

impl ModelServerClassifier {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ImageClassifier for ModelServerClassifier {
    async fn classify(&self, tensor: &ImageTensor) -> Result<Prediction, ClassifierError> {
        let payload = json!({ "instances": [tensor.instance()] });

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClassifierError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifierError::Upstream(format!(
                "model server returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;
        let scores: Vec<f32> = serde_json::from_value(body["predictions"][0].clone())
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let prediction = prediction_from_scores(&scores)?;
        info!(
            "Classified image as {} ({:.2})",
            prediction.label, prediction.confidence
        );
        Ok(prediction)
    }
}
