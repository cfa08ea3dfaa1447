//! Dataset upload route.

use axum::{
    Json,
    extract::{Multipart, State},
};
use serde_json::{Value, json};

use crate::AppState;
use crate::analysis::{AnalysisError, FileKind, text_preview};
use crate::error::ApiError;

/// `POST /upload`
///
/// Reads the multipart field `file`. Text files are echoed back as a preview;
/// CSV and JSON go through the configured analyzer.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let Some(kind) = FileKind::from_filename(&filename) else {
            return Err(ApiError::BadRequest("Unsupported file type".to_string()));
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;

        tracing::info!(
            name: "upload.received",
            filename = %filename,
            kind = ?kind,
            bytes = data.len(),
            "Upload received"
        );

        return match kind {
            FileKind::Text => {
                let content = text_preview(&data).map_err(processing_error)?;
                Ok(Json(json!({
                    "success": true,
                    "message": "File uploaded successfully",
                    "content": content,
                })))
            }
            _ => {
                let analysis = state
                    .analyzer
                    .analyze(kind, &data)
                    .await
                    .map_err(processing_error)?;
                Ok(Json(json!({
                    "success": true,
                    "filename": filename,
                    "analysis": analysis,
                })))
            }
        };
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

fn processing_error(err: AnalysisError) -> ApiError {
    ApiError::Internal(format!("Error processing file: {err}"))
}
