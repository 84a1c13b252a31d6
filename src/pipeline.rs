//! # Transcribe-and-Summarize Pipeline
//!
//! Runs the full processing sequence for one submitted audio blob:
//!
//! ```text
//! Received -> Normalizing -> Cleaning -> Transcribing -> Summarizing -> Completed
//! ```
//!
//! Strictly linear: each stage's output feeds only the next stage, the
//! first failure short-circuits the rest, and no stage is skipped except
//! the empty-transcript shortcut (an empty transcript never reaches the
//! summarizer; the summary is simply the empty string).
//!
//! The two inference capabilities are injected as immutable process-wide
//! handles, so the pipeline itself is trivially replayable: an identical
//! blob produces an equivalent transcript and summary. Nothing here has a
//! side effect - persistence is a separate, caller-triggered step.

use crate::audio::{FormatNormalizer, SignalCleaner};
use crate::error::AppResult;
use crate::summarization::{SummaryOptions, SummaryResult, TranscriptSummarizer};
use crate::transcription::SpeechTranscriber;
use std::sync::Arc;
use std::time::Instant;

/// One uploaded or recorded clip, exactly as received. Transient and owned
/// by the request.
#[derive(Debug)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    /// Declared content type, if the client sent one
    pub content_type: Option<String>,
    /// Original filename, used only as a decoding hint
    pub file_name: Option<String>,
}

/// Successful pipeline result: the transcript and its summary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineOutput {
    pub text: String,
    pub summary: String,
}

/// Pipeline progress states, used for stage-level logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineStage {
    Normalizing,
    Cleaning,
    Transcribing,
    Summarizing,
}

impl PipelineStage {
    fn name(&self) -> &'static str {
        match self {
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Cleaning => "cleaning",
            PipelineStage::Transcribing => "transcribing",
            PipelineStage::Summarizing => "summarizing",
        }
    }
}

/// Orchestrates the four processing stages for single requests.
pub struct Pipeline {
    cleaner: SignalCleaner,
    transcriber: Arc<dyn SpeechTranscriber>,
    summarizer: Arc<dyn TranscriptSummarizer>,
    summary_options: SummaryOptions,
}

impl Pipeline {
    pub fn new(
        transcriber: Arc<dyn SpeechTranscriber>,
        summarizer: Arc<dyn TranscriptSummarizer>,
        summary_options: SummaryOptions,
    ) -> Self {
        Self {
            cleaner: SignalCleaner::default(),
            transcriber,
            summarizer,
            summary_options,
        }
    }

    /// Run the full pipeline for one blob.
    ///
    /// ## Failure Policy:
    /// The first failing stage aborts the run and its `AppError` names the
    /// stage; no partial pipeline state reaches the caller, and nothing is
    /// retried. Because nothing irreversible happens before persistence,
    /// an abort here never leaves residue.
    pub fn run(&self, blob: AudioBlob) -> AppResult<PipelineOutput> {
        let start_time = Instant::now();
        tracing::info!(
            payload_bytes = blob.bytes.len(),
            content_type = blob.content_type.as_deref().unwrap_or("unknown"),
            "Pipeline received audio blob"
        );

        self.enter(PipelineStage::Normalizing);
        let normalized = FormatNormalizer::normalize(blob.bytes, blob.file_name.as_deref())?;

        self.enter(PipelineStage::Cleaning);
        let cleaned = self.cleaner.clean(normalized)?;

        self.enter(PipelineStage::Transcribing);
        let transcription = self.transcriber.transcribe(&cleaned)?;

        // Empty-transcript shortcut: the summarizer is never invoked on
        // empty input
        let summary = if transcription.text.trim().is_empty() {
            tracing::info!("Transcript empty, skipping summarization");
            SummaryResult::empty()
        } else {
            self.enter(PipelineStage::Summarizing);
            self.summarizer
                .summarize(&transcription.text, &self.summary_options)?
        };

        tracing::info!(
            total_ms = start_time.elapsed().as_millis() as u64,
            transcript_chars = transcription.text.len(),
            summary_chars = summary.text.len(),
            "Pipeline completed"
        );

        Ok(PipelineOutput {
            text: transcription.text,
            summary: summary.text,
        })
    }

    fn enter(&self, stage: PipelineStage) {
        tracing::debug!(stage = stage.name(), "Pipeline stage started");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::normalizer::NormalizedAudio;
    use crate::audio::CleanedAudio;
    use crate::error::AppError;
    use crate::transcription::{TranscriptionResult, TranscriptSegment};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counting fake for the transcription boundary.
    struct FakeTranscriber {
        calls: AtomicUsize,
        reply: String,
        fail: bool,
    }

    impl FakeTranscriber {
        fn replying(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: reply.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: String::new(),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SpeechTranscriber for FakeTranscriber {
        fn transcribe(&self, _audio: &CleanedAudio) -> AppResult<TranscriptionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::TranscriptionFailure("backend down".into()));
            }
            Ok(TranscriptionResult {
                text: self.reply.clone(),
                segments: vec![TranscriptSegment {
                    start: 0.0,
                    end: 1.0,
                    text: self.reply.clone(),
                }],
            })
        }
    }

    /// Counting fake for the summarization boundary.
    struct FakeSummarizer {
        calls: AtomicUsize,
    }

    impl FakeSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TranscriptSummarizer for FakeSummarizer {
        fn summarize(&self, text: &str, _options: &SummaryOptions) -> AppResult<SummaryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SummaryResult {
                text: format!("summary of: {}", text),
            })
        }
    }

    fn options() -> SummaryOptions {
        SummaryOptions {
            max_length: 100,
            min_length: 30,
            sampling: false,
        }
    }

    fn speech_wav() -> Vec<u8> {
        // A second of strong 440 Hz tone stands in for speech
        let samples: Vec<f32> = (0..16000)
            .map(|i| {
                let t = i as f64 / 16000.0;
                (2.0 * std::f64::consts::PI * 440.0 * t).sin() as f32 * 0.8
            })
            .collect();
        NormalizedAudio {
            samples,
            sample_rate: 16000,
        }
        .to_wav_bytes()
    }

    fn silence_wav() -> Vec<u8> {
        NormalizedAudio {
            samples: vec![0.0; 16000],
            sample_rate: 16000,
        }
        .to_wav_bytes()
    }

    fn blob(bytes: Vec<u8>) -> AudioBlob {
        AudioBlob {
            bytes,
            content_type: Some("audio/wav".to_string()),
            file_name: Some("clip.wav".to_string()),
        }
    }

    #[test]
    fn test_happy_path_returns_text_and_summary() {
        let transcriber = Arc::new(FakeTranscriber::replying("hello world"));
        let summarizer = Arc::new(FakeSummarizer::new());
        let pipeline = Pipeline::new(transcriber.clone(), summarizer.clone(), options());

        let output = pipeline.run(blob(speech_wav())).unwrap();

        assert_eq!(output.text, "hello world");
        assert_eq!(output.summary, "summary of: hello world");
        assert_eq!(transcriber.call_count(), 1);
        assert_eq!(summarizer.call_count(), 1);
    }

    #[test]
    fn test_silence_fails_before_capabilities_are_invoked() {
        let transcriber = Arc::new(FakeTranscriber::replying("never"));
        let summarizer = Arc::new(FakeSummarizer::new());
        let pipeline = Pipeline::new(transcriber.clone(), summarizer.clone(), options());

        let result = pipeline.run(blob(silence_wav()));

        assert!(matches!(result, Err(AppError::EmptyAudioFailure)));
        assert_eq!(transcriber.call_count(), 0);
        assert_eq!(summarizer.call_count(), 0);
    }

    #[test]
    fn test_empty_transcript_skips_summarizer() {
        let transcriber = Arc::new(FakeTranscriber::replying(""));
        let summarizer = Arc::new(FakeSummarizer::new());
        let pipeline = Pipeline::new(transcriber.clone(), summarizer.clone(), options());

        let output = pipeline.run(blob(speech_wav())).unwrap();

        assert_eq!(output.text, "");
        assert_eq!(output.summary, "");
        assert_eq!(summarizer.call_count(), 0);
    }

    #[test]
    fn test_undecodable_payload_short_circuits() {
        let transcriber = Arc::new(FakeTranscriber::replying("never"));
        let summarizer = Arc::new(FakeSummarizer::new());
        let pipeline = Pipeline::new(transcriber.clone(), summarizer.clone(), options());

        let result = pipeline.run(blob(vec![1, 2, 3, 4, 5]));

        assert!(matches!(result, Err(AppError::DecodeFailure(_))));
        assert_eq!(transcriber.call_count(), 0);
        assert_eq!(summarizer.call_count(), 0);
    }

    #[test]
    fn test_transcription_failure_stops_pipeline() {
        let transcriber = Arc::new(FakeTranscriber::failing());
        let summarizer = Arc::new(FakeSummarizer::new());
        let pipeline = Pipeline::new(transcriber.clone(), summarizer.clone(), options());

        let result = pipeline.run(blob(speech_wav()));

        assert!(matches!(result, Err(AppError::TranscriptionFailure(_))));
        assert_eq!(transcriber.call_count(), 1);
        assert_eq!(summarizer.call_count(), 0);
    }
}
