pub mod cleaner;
pub mod normalizer;

pub use cleaner::{CleanedAudio, SignalCleaner};
pub use normalizer::{FormatNormalizer, NormalizedAudio};

/// The fixed sample rate all audio is brought to before transcription.
/// Whisper models are trained on 16 kHz input.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;
