//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix)
//! - Default values built into the code
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SUMMARY_MAXLENGTH, ...)
//! 2. Configuration file (config.toml)
//! 3. Defaults (the Default impl below)
//!
//! `HOST` and `PORT` without the prefix are honored as well since deployment
//! platforms commonly inject those.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub summary: SummaryConfig,
    pub storage: StorageConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Inference model settings.
///
/// ## Fields:
/// - `whisper_model`: HuggingFace repo of the Whisper checkpoint used for
///   speech recognition (e.g. "openai/whisper-tiny")
/// - `summarizer_model`: HuggingFace repo of the summarization checkpoint
///   (e.g. "google/flan-t5-base")
/// - `language`: ISO 639-1 language hint passed to the transcriber
/// - `device`: inference device preference ("auto", "cpu", "cuda", "metal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub summarizer_model: String,
    pub language: String,
    pub device: String,
}

/// Summary generation bounds.
///
/// These map one-to-one onto the summarizer invocation: the summary length
/// (in tokens) targets `[min_length, max_length]`, and `sampling` switches
/// the decoder from greedy to sampled generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub max_length: usize,
    pub min_length: usize,
    pub sampling: bool,
}

/// Artifact storage settings.
///
/// `output_root` holds the `uploads/` and `recordings/` category
/// directories; both are created at startup if absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                whisper_model: "openai/whisper-tiny".to_string(),
                summarizer_model: "google/flan-t5-base".to_string(),
                language: "en".to_string(),
                device: "auto".to_string(),
            },
            summary: SummaryConfig {
                max_length: 100,
                min_length: 30,
                sampling: false,
            },
            storage: StorageConfig {
                output_root: PathBuf::from("outputs"),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_PORT=3000`: override server port
    /// - `APP_MODELS_WHISPER_MODEL=openai/whisper-base`: bigger ASR model
    /// - `PORT=3000`: platform-injected override, no prefix
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - server port is not 0
    /// - summary bounds are non-degenerate (0 < min_length < max_length)
    /// - model identifiers are non-empty
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.summary.max_length == 0 {
            return Err(anyhow::anyhow!("summary.max_length must be greater than 0"));
        }

        if self.summary.min_length >= self.summary.max_length {
            return Err(anyhow::anyhow!(
                "summary.min_length ({}) must be less than summary.max_length ({})",
                self.summary.min_length,
                self.summary.max_length
            ));
        }

        if self.models.whisper_model.is_empty() || self.models.summarizer_model.is_empty() {
            return Err(anyhow::anyhow!("Model identifiers cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.summary.max_length, 100);
        assert_eq!(config.summary.min_length, 30);
        assert!(!config.summary.sampling);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_port_zero() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_inverted_summary_bounds() {
        let mut config = AppConfig::default();
        config.summary.min_length = 200;
        assert!(config.validate().is_err());
    }
}
