use axum::{
    extract::{Multipart, State},
    response::Json,
};
use tokio::time::timeout;
use tracing::{info, warn};

use super::UploadForm;
use crate::collaborators::{ImageTensor, NarrativeMessage, classifier::image_media_type};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{PredictionData, PredictionResponse};
use crate::service::AppState;

pub async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServiceResult<Json<PredictionResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;
    let media_type = image_media_type(&file.filename).ok_or_else(|| {
        ServiceError::InvalidInput(
            "Invalid file type. Allowed types: png, jpg, jpeg, webp".to_string(),
        )
    })?;

    let bytes = file.data.clone();
    let tensor = tokio::task::spawn_blocking(move || ImageTensor::from_image_bytes(&bytes))
        .await
        .map_err(|e| ServiceError::Internal(format!("Preprocessing task failed: {}", e)))??;

    let prediction = state.classifier.classify(&tensor).await?;
    info!(
        "Predicted {} with confidence {:.4} for {}",
        prediction.label, prediction.confidence, file.filename
    );

    // Classification stands on its own; the explanation is best effort.
    let limit = state.limits.generation_timeout;
    let message = match timeout(
        limit,
        state.narrator.narrate(&prediction, &file.data, media_type),
    )
    .await
    {
        Ok(Ok(narrative)) => NarrativeMessage::Explained(narrative),
        Ok(Err(e)) => {
            warn!("Narrative generation failed: {}", e);
            NarrativeMessage::unavailable()
        }
        Err(_) => {
            warn!("Narrative generation timed out after {:?}", limit);
            NarrativeMessage::unavailable()
        }
    };

    Ok(Json(PredictionResponse {
        success: true,
        data: PredictionData {
            result: prediction.label,
            confidence: prediction.confidence,
            message,
        },
    }))
}
