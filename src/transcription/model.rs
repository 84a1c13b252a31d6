//! # Whisper Model Wrapper
//!
//! Loads a Whisper checkpoint from HuggingFace with Candle and runs the
//! full audio-to-text decode: mel spectrogram, encoder, then an
//! autoregressive greedy decoder over 30-second windows.
//!
//! ## Loading Process:
//! 1. Download config, tokenizer, and safetensors weights (cached locally)
//! 2. Build the mel filterbank for the model's mel bin count
//! 3. Load model weights onto the selected device
//!
//! ## Decoding:
//! The mel spectrogram is processed in 30 s windows. Each window is decoded
//! greedily (deterministic output for identical input) and gated on the
//! model's own no-speech probability, so silence-adjacent windows produce
//! no text rather than hallucinated filler.

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use tokenizers::Tokenizer;

/// A chunk of transcribed speech with its time extent in seconds.
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A loaded Whisper model ready for transcription.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    device: Device,

    sot_token: u32,
    eot_token: u32,
    transcribe_token: u32,
    no_timestamps_token: u32,
    no_speech_token: Option<u32>,
    language_token: Option<u32>,
}

impl WhisperModel {
    /// Download and load a Whisper checkpoint.
    ///
    /// ## Parameters:
    /// - **model_id**: HuggingFace repo, e.g. "openai/whisper-tiny"
    /// - **language**: ISO 639-1 hint; ignored for English-only checkpoints
    ///   that carry no language tokens
    /// - **device**: inference device
    pub async fn load(model_id: &str, language: &str, device: Device) -> Result<Self> {
        tracing::info!(model = model_id, "Loading Whisper model");
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

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("failed to load tokenizer: {}", e))?;

        let mel_filters = mel_filter_bank(config.num_mel_bins as usize, m::N_FFT / 2 + 1);

        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let sot_token = required_token(&tokenizer, m::SOT_TOKEN)?;
        let eot_token = required_token(&tokenizer, m::EOT_TOKEN)?;
        let transcribe_token = required_token(&tokenizer, m::TRANSCRIBE_TOKEN)?;
        let no_timestamps_token = required_token(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?;
        let no_speech_token = m::NO_SPEECH_TOKENS
            .iter()
            .find_map(|token| tokenizer.token_to_id(token));
        let language_token = tokenizer.token_to_id(&format!("<|{}|>", language));

        tracing::info!(
            model = model_id,
            load_seconds = format!("{:.2}", start_time.elapsed().as_secs_f64()),
            "Whisper model loaded"
        );

        Ok(Self {
            model,
            config,
            tokenizer,
            mel_filters,
            device,
            sot_token,
            eot_token,
            transcribe_token,
            no_timestamps_token,
            no_speech_token,
            language_token,
        })
    }

    /// Transcribe 16 kHz mono samples.
    ///
    /// ## Returns:
    /// Per-window segments with start/end offsets. The full transcript is
    /// the concatenation of the segment texts; it is empty (not an error)
    /// when the model hears no speech.
    pub fn transcribe(&mut self, samples: &[f32]) -> Result<Vec<DecodedSegment>> {
        if samples.is_empty() {
            return Err(anyhow!("audio data is empty"));
        }

        let mel = audio::pcm_to_mel(&self.config, samples, &self.mel_filters);
        let mel_len = mel.len();
        let n_mels = self.config.num_mel_bins as usize;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;

        let (_, _, content_frames) = mel.dims3()?;
        let mut segments = Vec::new();
        let mut seek = 0;

        while seek < content_frames {
            let time_offset = (seek * m::HOP_LENGTH) as f64 / m::SAMPLE_RATE as f64;
            let window_size = usize::min(content_frames - seek, m::N_FRAMES);
            let mel_window = mel.narrow(2, seek, window_size)?;
            let window_duration = (window_size * m::HOP_LENGTH) as f64 / m::SAMPLE_RATE as f64;
            seek += window_size;

            let decoded = self.decode_window(&mel_window)?;

            if let Some(no_speech_prob) = decoded.no_speech_prob {
                if no_speech_prob > m::NO_SPEECH_THRESHOLD
                    && decoded.avg_logprob < m::LOGPROB_THRESHOLD
                {
                    tracing::debug!(
                        no_speech_prob = format!("{:.2}", no_speech_prob),
                        "No speech detected in window, skipping"
                    );
                    continue;
                }
            }

            if decoded.text.is_empty() {
                continue;
            }

            segments.push(DecodedSegment {
                start: time_offset,
                end: time_offset + window_duration,
                text: decoded.text,
            });
        }

        Ok(segments)
    }

    /// Greedy decode of one 30 s mel window.
    fn decode_window(&mut self, mel: &Tensor) -> Result<WindowDecode> {
        let audio_features = self.model.encoder.forward(mel, true)?;

        let mut tokens = vec![self.sot_token];
        if let Some(language_token) = self.language_token {
            tokens.push(language_token);
        }
        tokens.push(self.transcribe_token);
        tokens.push(self.no_timestamps_token);
        let prompt_len = tokens.len();

        let sample_len = self.config.max_target_positions / 2;
        let mut sum_logprob = 0f64;
        let mut no_speech_prob = None;

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            if i == 0 {
                if let Some(no_speech) = self.no_speech_token {
                    let first_logits = self.model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
                    no_speech_prob = Some(
                        softmax(&first_logits, 0)?
                            .i(no_speech as usize)?
                            .to_scalar::<f32>()? as f64,
                    );
                }
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;

            let logits_v: Vec<f32> = logits.to_vec1()?;
            let next_token = logits_v
                .iter()
                .enumerate()
                .max_by(|(_, u), (_, v)| u.total_cmp(v))
                .map(|(i, _)| i as u32)
                .ok_or_else(|| anyhow!("model produced empty logits"))?;

            if next_token == self.eot_token || tokens.len() > self.config.max_target_positions {
                break;
            }

            let prob = softmax(&logits, 0)?.i(next_token as usize)?.to_scalar::<f32>()? as f64;
            sum_logprob += prob.ln();
            tokens.push(next_token);
        }

        // Special tokens all sit at or above EOT in the vocabulary
        let output_tokens: Vec<u32> = tokens[prompt_len..]
            .iter()
            .copied()
            .filter(|&t| t < self.eot_token)
            .collect();
        let text = self
            .tokenizer
            .decode(&output_tokens, true)
            .map_err(|e| anyhow!("tokenizer decode error: {}", e))?
            .trim()
            .to_string();

        let decoded_len = tokens.len() - prompt_len;
        let avg_logprob = if decoded_len > 0 {
            sum_logprob / decoded_len as f64
        } else {
            f64::NEG_INFINITY
        };

        Ok(WindowDecode {
            text,
            avg_logprob,
            no_speech_prob,
        })
    }
}

struct WindowDecode {
    text: String,
    avg_logprob: f64,
    no_speech_prob: Option<f64>,
}

fn required_token(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("tokenizer has no token for {}", token))
}

/// Triangular mel filterbank, `n_mels x n_freqs`, row-major.
///
/// Computed at load time for the checkpoint's mel bin count instead of
/// shipping a precomputed filter file. Slaney-style area normalization so
/// each filter integrates to comparable energy.
fn mel_filter_bank(n_mels: usize, n_freqs: usize) -> Vec<f32> {
    let sample_rate = m::SAMPLE_RATE as f32;
    let f_max = sample_rate / 2.0;

    let hz_to_mel = |hz: f32| 2595.0 * (1.0 + hz / 700.0).log10();
    let mel_to_hz = |mel: f32| 700.0 * (10f32.powf(mel / 2595.0) - 1.0);

    let mel_max = hz_to_mel(f_max);
    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freqs: Vec<f32> = (0..n_freqs)
        .map(|i| f_max * i as f32 / (n_freqs - 1) as f32)
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freqs];
    for mel_idx in 0..n_mels {
        let (lower, center, upper) = (
            mel_points[mel_idx],
            mel_points[mel_idx + 1],
            mel_points[mel_idx + 2],
        );
        let norm = 2.0 / (upper - lower);

        for (freq_idx, &freq) in freqs.iter().enumerate() {
            let weight = if freq <= lower || freq >= upper {
                0.0
            } else if freq <= center {
                (freq - lower) / (center - lower)
            } else {
                (upper - freq) / (upper - center)
            };
            filters[mel_idx * n_freqs + freq_idx] = weight * norm;
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_filter_bank_shape() {
        let filters = mel_filter_bank(80, m::N_FFT / 2 + 1);
        assert_eq!(filters.len(), 80 * 201);
    }

    #[test]
    fn test_mel_filters_are_nonnegative_and_cover_spectrum() {
        let n_freqs = m::N_FFT / 2 + 1;
        let filters = mel_filter_bank(80, n_freqs);

        assert!(filters.iter().all(|&w| w >= 0.0));

        // Every filter should have some mass
        for mel_idx in 0..80 {
            let row = &filters[mel_idx * n_freqs..(mel_idx + 1) * n_freqs];
            let mass: f32 = row.iter().sum();
            assert!(mass > 0.0, "mel filter {} is empty", mel_idx);
        }
    }
}
