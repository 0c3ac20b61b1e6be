use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use session_store::PagePayload;
use std::io::{Cursor, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Uploaded document is empty")]
    Empty,

    #[error("Unsupported document: {0}")]
    Unsupported(String),

    #[error("Document decoding timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode document: {0}")]
    Failed(String),
}

/// Turns raw document bytes into ordered page images.
#[async_trait]
pub trait DocumentDecoder: Send + Sync {
    async fn decode(&self, raw: &[u8]) -> Result<Vec<PagePayload>, DecodeError>;
}

/// Rasterizes PDF documents with pdf2image (poppler) and re-encodes pages as PNG.
pub struct PdfDecoder;

#[async_trait]
impl DocumentDecoder for PdfDecoder {
    async fn decode(&self, raw: &[u8]) -> Result<Vec<PagePayload>, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }
        if !raw.starts_with(PDF_SIGNATURE) {
            return Err(DecodeError::Unsupported(
                "expected a PDF document".to_string(),
            ));
        }

        let bytes = raw.to_vec();
        let pages = tokio::task::spawn_blocking(move || render_pdf(&bytes))
            .await
            .map_err(|e| DecodeError::Failed(e.to_string()))??;

        info!("Decoded PDF into {} page images", pages.len());
        Ok(pages)
    }
}

fn render_pdf(bytes: &[u8]) -> Result<Vec<PagePayload>, DecodeError> {
    let mut file = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| DecodeError::Failed(format!("Failed to stage upload: {}", e)))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| DecodeError::Failed(format!("Failed to stage upload: {}", e)))?;

    let path = file.path().to_string_lossy().to_string();
    let pdf =
        PDF::from_file(&path).map_err(|e| DecodeError::Unsupported(format!("Failed to load PDF: {}", e)))?;

    let rendered = pdf
        .render(Pages::All, None)
        .map_err(|e| DecodeError::Failed(format!("Failed to render PDF pages: {}", e)))?;

    info!("Rendered {} pages from PDF", rendered.len());
    rendered.iter().map(encode_png).collect()
}

/// Encode a rendered page as a PNG payload.
pub fn encode_png(image: &DynamicImage) -> Result<PagePayload, DecodeError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| DecodeError::Failed(format!("Failed to encode image: {}", e)))?;
    Ok(PagePayload::png(buffer))
}
