//! # Application State Management
//!
//! Shared state every HTTP request handler can reach: the configuration,
//! service metrics, and the two request-serving facilities built at
//! startup (the processing pipeline with its injected capability handles,
//! and the artifact persister).
//!
//! Mutable pieces sit behind `Arc<RwLock<...>>` so concurrent requests can
//! read without contention and metric updates stay race-free. The pipeline
//! and persister are immutable after startup and shared as plain `Arc`s.

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::storage::ResultPersister;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Service metrics, updated by middleware on every request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// The transcribe-and-summarize pipeline with its capability handles
    pub pipeline: Arc<Pipeline>,

    /// Artifact writer for the save endpoint
    pub persister: Arc<ResultPersister>,

    /// When the server started
    pub start_time: Instant,
}

/// Service metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since startup
    pub request_count: u64,

    /// Total number of failed requests since startup
    pub error_count: u64,

    /// Per-endpoint request statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Request statistics for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Arc<Pipeline>, persister: Arc<ResultPersister>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            pipeline,
            persister,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration. Cloning releases the read
    /// lock immediately so other requests are never blocked on it.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record one finished request against its endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Snapshot of the metrics for the observability endpoints. Cloned so
    /// no lock is held while the response serializes.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::summarization::{SummaryOptions, SummaryResult, TranscriptSummarizer};
    use crate::transcription::{SpeechTranscriber, TranscriptionResult};

    struct NoopTranscriber;
    impl SpeechTranscriber for NoopTranscriber {
        fn transcribe(&self, _audio: &crate::audio::CleanedAudio) -> AppResult<TranscriptionResult> {
            Ok(TranscriptionResult {
                text: String::new(),
                segments: Vec::new(),
            })
        }
    }

    struct NoopSummarizer;
    impl TranscriptSummarizer for NoopSummarizer {
        fn summarize(&self, _text: &str, _options: &SummaryOptions) -> AppResult<SummaryResult> {
            Ok(SummaryResult::empty())
        }
    }

    fn test_state() -> AppState {
        let config = AppConfig::default();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(NoopTranscriber),
            Arc::new(NoopSummarizer),
            SummaryOptions::from(&config.summary),
        ));
        let persister = Arc::new(ResultPersister::new(std::path::Path::new("outputs")));
        AppState::new(config, pipeline, persister)
    }

    #[test]
    fn test_metrics_counters() {
        let state = test_state();

        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();
        state.record_endpoint_request("POST /stt", 120, false);
        state.record_endpoint_request("POST /stt", 80, true);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);

        let endpoint = &snapshot.endpoint_metrics["POST /stt"];
        assert_eq!(endpoint.request_count, 2);
        assert_eq!(endpoint.average_duration_ms(), 100.0);
        assert_eq!(endpoint.error_rate(), 0.5);
    }
}
