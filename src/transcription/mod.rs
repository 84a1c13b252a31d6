pub mod engine;
pub mod model;

pub use engine::{SpeechTranscriber, TranscriptSegment, TranscriptionResult, WhisperTranscriber};
