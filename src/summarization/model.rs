//! # Summarization Model Wrapper
//!
//! Loads a T5-family summarization checkpoint from HuggingFace with Candle
//! and generates abstractive summaries with an incremental seq2seq decode.
//!
//! ## Length Policy:
//! The `[min_length, max_length]` bounds are targets, not hard guarantees:
//! EOS is suppressed until `min_length` tokens have been produced and the
//! loop stops at `max_length`, but the capability may still end early on a
//! forced EOS or run to the cap mid-sentence.

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5;
use candle_transformers::utils::apply_repeat_penalty;
use tokenizers::Tokenizer;

/// T5 task prefix for summarization.
const TASK_PREFIX: &str = "summarize: ";

/// Longest transcript slice fed to the encoder, in tokens.
const MAX_INPUT_TOKENS: usize = 512;

/// Sampling temperature when sampled generation is requested.
const SAMPLING_TEMPERATURE: f64 = 0.8;

/// Discourage verbatim loops in the generated summary.
const REPEAT_PENALTY: f32 = 1.1;
const REPEAT_LAST_N: usize = 64;

/// Fixed RNG seed so sampled runs are at least reproducible per process.
const SAMPLING_SEED: u64 = 299_792_458;

const DTYPE: DType = DType::F32;

/// A loaded summarization model ready for generation.
pub struct SummaryModel {
    model: t5::T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    device: Device,
    pad_token_id: u32,
    eos_token_id: u32,
}

impl SummaryModel {
    /// Download and load a summarization checkpoint.
    pub async fn load(model_id: &str, device: Device) -> Result<Self> {
        tracing::info!(model = model_id, "Loading summarization model");
        let start_time = std::time::Instant::now();

        let api = hf_hub::api::tokio::ApiBuilder::new()
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_progress(false)
            .build()?;
        let repo = api.model(model_id.to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("failed to download config.json from {}: {}", model_id, e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("failed to download tokenizer.json from {}: {}", model_id, e))?;
        let weights_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("failed to download model weights from {}: {}", model_id, e))?;

        let mut config: t5::Config =
            serde_json::from_str(&std::fs::read_to_string(config_filename)?)?;
        // Full decoder sequences are fed at every step, so the KV cache must
        // stay off or positions would be double-counted
        config.use_cache = false;

        let pad_token_id = config.pad_token_id as u32;
        let eos_token_id = config.eos_token_id as u32;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("failed to load tokenizer: {}", e))?;

        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = t5::T5ForConditionalGeneration::load(vb, &config)?;

        tracing::info!(
            model = model_id,
            load_seconds = format!("{:.2}", start_time.elapsed().as_secs_f64()),
            "Summarization model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            pad_token_id,
            eos_token_id,
        })
    }

    /// Generate a summary of `text`.
    ///
    /// ## Parameters:
    /// - **text**: source transcript (non-empty; the empty-input shortcut
    ///   lives in the orchestrator, not here)
    /// - **min_length / max_length**: target token bounds for the summary
    /// - **sampling**: false for greedy (deterministic) generation, true
    ///   for temperature sampling
    pub fn summarize(
        &mut self,
        text: &str,
        min_length: usize,
        max_length: usize,
        sampling: bool,
    ) -> Result<String> {
        let prompt = format!("{}{}", TASK_PREFIX, text.trim());
        let mut input_ids = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!("tokenizer encode error: {}", e))?
            .get_ids()
            .to_vec();

        // T5 positions cap out; keep the head of long transcripts
        if input_ids.len() > MAX_INPUT_TOKENS {
            input_ids.truncate(MAX_INPUT_TOKENS);
            if let Some(last) = input_ids.last_mut() {
                *last = self.eos_token_id;
            }
        }

        let input_tensor = Tensor::new(input_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_output = self.model.encode(&input_tensor)?;

        let temperature = if sampling {
            Some(SAMPLING_TEMPERATURE)
        } else {
            None
        };
        let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, temperature, None);

        // T5 decoding starts from the pad token
        let mut decoder_tokens = vec![self.pad_token_id];
        let mut output_tokens: Vec<u32> = Vec::new();

        while output_tokens.len() < max_length {
            let decoder_tensor =
                Tensor::new(decoder_tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .decode(&decoder_tensor, &encoder_output)?
                .squeeze(0)?;

            let logits = if output_tokens.is_empty() {
                logits
            } else {
                let context_start = output_tokens.len().saturating_sub(REPEAT_LAST_N);
                apply_repeat_penalty(&logits, REPEAT_PENALTY, &output_tokens[context_start..])?
            };

            // Suppress EOS until the minimum length is reached
            let logits = if output_tokens.len() < min_length {
                mask_token(&logits, self.eos_token_id, &self.device)?
            } else {
                logits
            };

            let next_token = logits_processor.sample(&logits)?;
            if next_token == self.eos_token_id {
                break;
            }

            decoder_tokens.push(next_token);
            output_tokens.push(next_token);
        }

        let summary = self
            .tokenizer
            .decode(&output_tokens, true)
            .map_err(|e| anyhow!("tokenizer decode error: {}", e))?
            .trim()
            .to_string();

        Ok(summary)
    }
}

/// Set one vocabulary entry to -inf so it can never be picked.
fn mask_token(logits: &Tensor, token: u32, device: &Device) -> candle_core::Result<Tensor> {
    let mut values: Vec<f32> = logits.to_vec1()?;
    if let Some(value) = values.get_mut(token as usize) {
        *value = f32::NEG_INFINITY;
    }
    let len = values.len();
    Tensor::from_vec(values, len, device)
}
