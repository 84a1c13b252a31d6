pub mod engine;
pub mod model;

pub use engine::{SummaryOptions, SummaryResult, T5Summarizer, TranscriptSummarizer};
