//! # Transcribe Endpoint
//!
//! `POST /stt` - accepts one audio file as a multipart form field named
//! `file`, runs it through the full pipeline, and responds with the
//! transcript and summary.
//!
//! ## Response:
//! ```json
//! { "text": "...", "summary": "..." }
//! ```
//!
//! A request without a file is a 400 (`input_missing`); pipeline failures
//! map to the taxonomy in `error.rs`.

use crate::error::AppError;
use crate::pipeline::AudioBlob;
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};

/// Handle one transcription upload.
///
/// The pipeline is CPU-bound and blocking (decode, resample, inference),
/// so it runs on the blocking thread pool rather than the async executor.
pub async fn transcribe_audio(
    app_state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut blob: Option<AudioBlob> = None;

    while let Ok(Some(mut field)) = payload.try_next().await {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(|name| name.to_string());
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| AppError::InputMissing(format!("upload stream error: {}", e)))?;
            bytes.extend_from_slice(&chunk);
        }

        blob = Some(AudioBlob {
            bytes,
            content_type,
            file_name,
        });
        break;
    }

    let blob = blob.ok_or_else(|| AppError::InputMissing("No file provided".to_string()))?;
    if blob.bytes.is_empty() {
        return Err(AppError::InputMissing("Uploaded file is empty".to_string()));
    }

    let pipeline = app_state.pipeline.clone();
    let output = web::block(move || pipeline.run(blob))
        .await
        .map_err(|e| AppError::Internal(format!("worker pool error: {}", e)))??;

    Ok(HttpResponse::Ok().json(output))
}
