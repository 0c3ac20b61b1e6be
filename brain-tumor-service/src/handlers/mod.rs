pub mod chatbot;
pub mod documents;
pub mod prediction;
pub mod report;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, rejection::JsonRejection};
use std::collections::HashMap;

use crate::error::{ServiceError, ServiceResult};

/// A file part of a multipart upload.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// Parsed multipart body: the `file` part plus any plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ServiceResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServiceError::InvalidInput(format!("Malformed upload: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::InvalidInput(format!("Malformed upload: {}", e)))?;
                form.file = Some(UploadedFile { filename, data });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::InvalidInput(format!("Malformed upload: {}", e)))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// The uploaded file, rejecting a missing part or an empty filename.
    pub fn take_file(&mut self) -> ServiceResult<UploadedFile> {
        match self.file.take() {
            Some(file) if !file.filename.is_empty() => Ok(file),
            _ => Err(ServiceError::InvalidInput("No file uploaded".to_string())),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Unwrap a JSON body, reporting malformed payloads in the service's error shape.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ServiceResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::InvalidInput(rejection.body_text()))
}
