//! # Transcription Capability Boundary
//!
//! The pipeline only ever talks to the `SpeechTranscriber` trait: cleaned
//! PCM in, transcript out. The production implementation wraps the Candle
//! Whisper model loaded once at startup; tests substitute fakes.
//!
//! ## Contract:
//! - Non-empty audio yields a text field that is never null; the empty
//!   string is a valid result for silence-adjacent input
//! - Segment timestamps are optional extra detail, one per decoded window
//! - Backend errors and malformed model output surface as
//!   `TranscriptionFailure`; the caller never retries automatically

use crate::audio::CleanedAudio;
use crate::error::{AppError, AppResult};
use crate::transcription::model::WhisperModel;
use candle_core::Device;
use std::sync::Mutex;
use std::time::Instant;

/// Result of one transcription call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptionResult {
    /// Full transcript, never null; empty for true silence
    pub text: String,

    /// Optional ordered (start, end, text) windows in seconds
    pub segments: Vec<TranscriptSegment>,
}

/// Time-stamped transcript window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Capability boundary for speech-to-text inference.
///
/// Implementations are process-wide handles created once at startup and
/// injected where needed, which keeps them substitutable by fakes in tests.
/// Calls are blocking; bounding their latency is the caller's concern.
pub trait SpeechTranscriber: Send + Sync {
    fn transcribe(&self, audio: &CleanedAudio) -> AppResult<TranscriptionResult>;
}

/// Production transcriber backed by a Candle Whisper model.
///
/// The model needs `&mut` for its KV caches, so calls are serialized
/// through a `Mutex` - one inference at a time per handle.
pub struct WhisperTranscriber {
    model: Mutex<WhisperModel>,
}

impl WhisperTranscriber {
    /// Download and load the checkpoint; called once from `main`.
    pub async fn load(model_id: &str, language: &str, device: Device) -> anyhow::Result<Self> {
        let model = WhisperModel::load(model_id, language, device).await?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl SpeechTranscriber for WhisperTranscriber {
    fn transcribe(&self, audio: &CleanedAudio) -> AppResult<TranscriptionResult> {
        let start_time = Instant::now();

        let mut model = self
            .model
            .lock()
            .map_err(|_| AppError::TranscriptionFailure("model lock poisoned".to_string()))?;

        let decoded = model
            .transcribe(&audio.samples)
            .map_err(|e| AppError::TranscriptionFailure(e.to_string()))?;

        let segments: Vec<TranscriptSegment> = decoded
            .into_iter()
            .map(|s| TranscriptSegment {
                start: s.start,
                end: s.end,
                text: s.text,
            })
            .collect();

        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        tracing::info!(
            audio_seconds = format!("{:.2}", audio.duration_seconds()),
            transcript_chars = text.len(),
            processing_ms = start_time.elapsed().as_millis() as u64,
            "Transcription completed"
        );

        Ok(TranscriptionResult { text, segments })
    }
}
