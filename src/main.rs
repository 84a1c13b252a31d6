//! # Speech Summary Backend - Main Application Entry Point
//!
//! HTTP server that accepts audio uploads, transcribes them, summarizes
//! the transcript, and optionally persists the pair as a text artifact.
//!
//! ## Startup Sequence:
//! 1. Load environment (.env) and initialize structured logging
//! 2. Load and validate configuration
//! 3. Create the artifact output directories
//! 4. Load both inference models (Whisper ASR + T5 summarizer) exactly
//!    once; they live for the whole process as immutable capability
//!    handles injected into the pipeline
//! 5. Serve `/stt`, `/save`, `/health`, `/metrics` until shutdown

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod state;
mod storage;
mod summarization;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use pipeline::Pipeline;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::ResultPersister;
use summarization::{SummaryOptions, T5Summarizer};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::WhisperTranscriber;

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speech-summary-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}, output root {}",
        config.server.host,
        config.server.port,
        config.storage.output_root.display()
    );

    // Output directories exist before the first save can arrive
    let persister = Arc::new(ResultPersister::new(&config.storage.output_root));
    persister
        .ensure_directories()
        .context("Failed to create output directories")?;

    // Both capability handles are loaded once and reused for every request
    let device_preference = config
        .models
        .device
        .parse::<device::DevicePreference>()
        .map_err(|e| anyhow::anyhow!(e))?;
    let device = device::select_device(device_preference);

    let transcriber = Arc::new(
        WhisperTranscriber::load(
            &config.models.whisper_model,
            &config.models.language,
            device.clone(),
        )
        .await
        .context("Failed to load transcription model")?,
    );
    let summarizer = Arc::new(
        T5Summarizer::load(&config.models.summarizer_model, device)
            .await
            .context("Failed to load summarization model")?,
    );

    let pipeline = Arc::new(Pipeline::new(
        transcriber,
        summarizer,
        SummaryOptions::from(&config.summary),
    ));

    let app_state = AppState::new(config.clone(), pipeline, persister);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Audio uploads can be sizeable; raise the payload cap to 50 MB
            .app_data(web::PayloadConfig::new(50 * 1024 * 1024))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::RequestTelemetry)
            .route("/stt", web::post().to(handlers::transcribe_audio))
            .route("/save", web::post().to(handlers::save_result))
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_summary_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
