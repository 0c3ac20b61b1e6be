use axum::{
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use super::UploadForm;
use crate::collaborators::classifier::image_media_type;
use crate::error::{ServiceError, ServiceResult};
use crate::service::AppState;

/// Render the diagnosis report for an uploaded scan and its classification.
///
/// Multipart fields: `file` (the scan), `tumor_type` (label) and `confidence`
/// (a percentage such as `93.5`, printed with two decimals as given).
pub async fn generate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServiceResult<impl IntoResponse> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;
    let media_type = image_media_type(&file.filename).ok_or_else(|| {
        ServiceError::InvalidInput(
            "Invalid file type. Allowed types: png, jpg, jpeg, webp".to_string(),
        )
    })?;

    let tumor_type = form
        .field("tumor_type")
        .ok_or_else(|| ServiceError::InvalidInput("tumor_type is required".to_string()))?
        .to_string();
    let confidence: f64 = form
        .field("confidence")
        .ok_or_else(|| ServiceError::InvalidInput("confidence is required".to_string()))?
        .parse()
        .map_err(|_| ServiceError::InvalidInput("confidence must be a number".to_string()))?;

    let pdf = state
        .reports
        .render(&file.data, media_type, &tumor_type, confidence)
        .await?;

    let filename = format!("report_{}.pdf", Uuid::new_v4());
    info!("Generated report {} for {}", filename, tumor_type);

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        pdf,
    ))
}
