//! Upload Route
//!
//! Synchronous extraction for a single uploaded file. Nothing is persisted:
//! the upload is staged in a temporary file that is removed when the request
//! finishes, whatever the outcome.
//!
//! Endpoints:
//! - POST /upload - multipart `file`, optional `options` (JSON overrides)

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::ocr::{OcrError, OcrOptions};
use crate::pages::PageResult;
use crate::state::AppState;

/// Extensions accepted for upload
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["pdf", "jpeg", "jpg", "png", "gif"];

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub texts: Vec<PageResult>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}

/// POST /upload
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>> {
    let mut file: Option<(String, Bytes)> = None;
    let mut overrides: Option<serde_json::Value> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;
                file = Some((filename, data));
            }
            "options" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read options: {}", e)))?;
                let value = serde_json::from_str(&text).map_err(|e| {
                    OcrError::InvalidConfiguration(format!("options must be a JSON object: {}", e))
                })?;
                overrides = Some(value);
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (filename, data) = file.ok_or_else(|| AppError::BadRequest("File not provided".to_string()))?;
    if filename.is_empty() {
        return Err(AppError::BadRequest("No selected file".to_string()));
    }

    let safe_name = sanitize_filename(&filename);
    let extension = allowed_extension(&safe_name)
        .ok_or_else(|| AppError::BadRequest("File type not supported".to_string()))?;

    let options = match &overrides {
        Some(value) => state.ocr_defaults().merged_with(value)?,
        None => state.ocr_defaults().clone(),
    };

    let document = extract(&state, &data, &extension, &options).await?;

    tracing::info!(
        "Extracted {} pages ({} regions) from upload {}",
        document.len(),
        document.iter().map(|p| p.regions.len()).sum::<usize>(),
        safe_name
    );

    Ok(Json(UploadResponse { texts: document }))
}

async fn extract(
    state: &AppState,
    data: &[u8],
    extension: &str,
    options: &OcrOptions,
) -> Result<Vec<PageResult>> {
    // Removed on drop
    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(state.staging_dir())?;

    tokio::fs::write(staged.path(), data).await?;

    let document = state.normalizer().normalize(staged.path(), options).await?;
    Ok(document.pages)
}

/// Strip any directory part and keep only `[A-Za-z0-9._-]`
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("");

    base.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

fn allowed_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if stem.is_empty() || !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    Some(ext)
}
