//! # Error Handling
//!
//! Defines the failure taxonomy for the transcription pipeline and the save
//! path, and how each failure is converted to an HTTP response.
//!
//! ## Error Categories:
//! - **InputMissing**: no file in the upload, or no/unparsable JSON body (400)
//! - **DecodeFailure**: the audio container could not be parsed (422)
//! - **EmptyAudioFailure**: no signal survives cleaning (422)
//! - **TranscriptionFailure / SummarizationFailure**: capability-boundary
//!   errors from the inference backends (500)
//! - **ValidationFailure**: a save request is missing required fields (400)
//! - **PersistenceFailure**: I/O error while writing an artifact (500)
//! - **ConfigError / Internal**: server-side problems outside the pipeline (500)
//!
//! ## Propagation Policy:
//! Every failure is caught at the handler boundary and converted to a single
//! structured JSON payload; nothing propagates as an unhandled fault. No
//! stage is ever retried automatically; the caller must resubmit.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failure taxonomy for the whole service.
///
/// Each pipeline variant identifies the stage that failed, so a response
/// built from it tells the caller where the request died without exposing
/// any partial pipeline state.
#[derive(Debug)]
pub enum AppError {
    /// No file in the multipart form, or no/unparsable JSON body
    InputMissing(String),

    /// The uploaded bytes could not be parsed as any supported audio container
    DecodeFailure(String),

    /// Cleaning removed everything - the clip was silence or pure noise
    EmptyAudioFailure,

    /// The speech-recognition backend errored or produced malformed output
    TranscriptionFailure(String),

    /// The summarization backend errored or produced malformed output
    SummarizationFailure(String),

    /// A save request is missing required fields
    ValidationFailure(String),

    /// Writing the artifact failed (unwritable directory, disk full, ...)
    PersistenceFailure(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Anything else server-side that should not leak details to the caller
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InputMissing(msg) => write!(f, "Missing input: {}", msg),
            AppError::DecodeFailure(msg) => write!(f, "Audio decode failed: {}", msg),
            AppError::EmptyAudioFailure => {
                write!(f, "No audible signal remained after cleaning")
            }
            AppError::TranscriptionFailure(msg) => write!(f, "Transcription failed: {}", msg),
            AppError::SummarizationFailure(msg) => write!(f, "Summarization failed: {}", msg),
            AppError::ValidationFailure(msg) => write!(f, "Validation error: {}", msg),
            AppError::PersistenceFailure(msg) => write!(f, "Failed to save output: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Machine-readable tag for the error payload, one per taxonomy entry.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::InputMissing(_) => "input_missing",
            AppError::DecodeFailure(_) => "decode_failure",
            AppError::EmptyAudioFailure => "empty_audio_failure",
            AppError::TranscriptionFailure(_) => "transcription_failure",
            AppError::SummarizationFailure(_) => "summarization_failure",
            AppError::ValidationFailure(_) => "validation_failure",
            AppError::PersistenceFailure(_) => "persistence_failure",
            AppError::ConfigError(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// Conversion of errors into HTTP responses.
///
/// ## Status Code Mapping:
/// - InputMissing / ValidationFailure → 400 (the request itself is wrong)
/// - DecodeFailure / EmptyAudioFailure → 422 (the request arrived but the
///   audio is not processable)
/// - everything else → 500
///
/// ## JSON Response Format:
/// `error` stays a plain string for compatibility with the original
/// contract; `type` carries the taxonomy tag:
/// ```json
/// {
///   "error": "Audio decode failed: unsupported container",
///   "type": "decode_failure",
///   "timestamp": "2025-01-01T12:00:00Z"
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let status = match self {
            AppError::InputMissing(_) | AppError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
            AppError::DecodeFailure(_) | AppError::EmptyAudioFailure => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::TranscriptionFailure(_)
            | AppError::SummarizationFailure(_)
            | AppError::PersistenceFailure(_)
            | AppError::ConfigError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        HttpResponse::build(status).json(json!({
            "error": self.to_string(),
            "type": self.error_type(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// Startup plumbing (model loading, directory creation) reports through
/// anyhow; anything that leaks to a handler becomes an internal error.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing problems are the client's malformed body, not our fault.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InputMissing(format!("invalid JSON body: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// I/O errors only occur on the persistence path; map them accordingly.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::PersistenceFailure(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
