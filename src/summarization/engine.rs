//! # Summarization Capability Boundary
//!
//! The pipeline only ever talks to the `TranscriptSummarizer` trait:
//! transcript text plus a fixed options record in, bounded summary out.
//! The production implementation wraps the Candle T5 checkpoint loaded
//! once at startup; tests substitute fakes.
//!
//! The options are a validated configuration record, not an open-ended
//! map: `{max_length, min_length, sampling}`.

use crate::config::SummaryConfig;
use crate::error::{AppError, AppResult};
use crate::summarization::model::SummaryModel;
use candle_core::Device;
use std::sync::Mutex;
use std::time::Instant;

/// Generation bounds for one summarization call.
#[derive(Debug, Clone, Copy)]
pub struct SummaryOptions {
    /// Target upper bound on summary length, in tokens
    pub max_length: usize,
    /// Target lower bound on summary length, in tokens
    pub min_length: usize,
    /// false = greedy (deterministic), true = temperature sampling
    pub sampling: bool,
}

impl From<&SummaryConfig> for SummaryOptions {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            max_length: config.max_length,
            min_length: config.min_length,
            sampling: config.sampling,
        }
    }
}

/// Result of one summarization call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SummaryResult {
    pub text: String,
}

impl SummaryResult {
    /// The fixed result for the empty-transcript shortcut - the capability
    /// itself is never invoked on empty input.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
        }
    }
}

/// Capability boundary for abstractive summarization.
pub trait TranscriptSummarizer: Send + Sync {
    fn summarize(&self, text: &str, options: &SummaryOptions) -> AppResult<SummaryResult>;
}

/// Production summarizer backed by a Candle T5 model.
///
/// Same serialization story as the transcriber: the model needs `&mut`,
/// so one generation runs at a time per handle.
pub struct T5Summarizer {
    model: Mutex<SummaryModel>,
}

impl T5Summarizer {
    /// Download and load the checkpoint; called once from `main`.
    pub async fn load(model_id: &str, device: Device) -> anyhow::Result<Self> {
        let model = SummaryModel::load(model_id, device).await?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl TranscriptSummarizer for T5Summarizer {
    fn summarize(&self, text: &str, options: &SummaryOptions) -> AppResult<SummaryResult> {
        let start_time = Instant::now();

        let mut model = self
            .model
            .lock()
            .map_err(|_| AppError::SummarizationFailure("model lock poisoned".to_string()))?;

        let summary = model
            .summarize(text, options.min_length, options.max_length, options.sampling)
            .map_err(|e| AppError::SummarizationFailure(e.to_string()))?;

        tracing::info!(
            transcript_chars = text.len(),
            summary_chars = summary.len(),
            processing_ms = start_time.elapsed().as_millis() as u64,
            "Summarization completed"
        );

        Ok(SummaryResult { text: summary })
    }
}
