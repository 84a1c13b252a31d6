//! # Signal Cleaning
//!
//! Second pipeline stage: turns decoded PCM into the canonical form the
//! transcriber expects. Steps, in order:
//!
//! 1. **Resample** to the canonical 16 kHz rate (high-quality sinc
//!    interpolation, identity when already canonical)
//! 2. **Normalize amplitude** so the peak sits at 1.0
//! 3. **Noise reduction** by spectral gating, with the noise profile
//!    estimated from the quietest frames of the signal itself
//! 4. **Trim silence** from both ends, everything more than 20 dB below the
//!    loudest frame
//!
//! The whole stage is deterministic modulo floating-point tolerance: two
//! runs over identical input agree within a small numeric epsilon.

use crate::audio::normalizer::NormalizedAudio;
use crate::audio::CANONICAL_SAMPLE_RATE;
use crate::error::{AppError, AppResult};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

/// STFT analysis/synthesis window size for spectral gating.
const WINDOW_SIZE: usize = 2048;

/// Hop size between successive STFT frames (75% overlap).
const HOP_SIZE: usize = 512;

/// Frames whose energy falls in the quietest fifth of the clip feed the
/// noise profile.
const NOISE_FRAME_FRACTION: f64 = 0.2;

/// Gate opens for bins this factor above the noise profile magnitude.
const GATE_THRESHOLD_FACTOR: f32 = 1.5;

/// Residual gain applied to gated-out bins (-20 dB).
const GATE_FLOOR: f32 = 0.1;

/// Cleaned PCM at the canonical sample rate.
///
/// Invariant: mono, `sample_rate == CANONICAL_SAMPLE_RATE`. The clip may be
/// shorter than its input; it is never empty (that case is a terminal
/// `EmptyAudioFailure` instead).
#[derive(Debug, Clone)]
pub struct CleanedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl CleanedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Resamples, denoises, normalizes, and trims decoded audio.
pub struct SignalCleaner {
    target_sample_rate: u32,
    /// Relative silence threshold for trimming, in dB below the peak frame
    trim_threshold_db: f32,
}

impl Default for SignalCleaner {
    fn default() -> Self {
        Self {
            target_sample_rate: CANONICAL_SAMPLE_RATE,
            trim_threshold_db: 20.0,
        }
    }
}

impl SignalCleaner {
    pub fn new(target_sample_rate: u32, trim_threshold_db: f32) -> Self {
        Self {
            target_sample_rate,
            trim_threshold_db,
        }
    }

    /// Run the full cleaning sequence.
    ///
    /// ## Errors:
    /// `EmptyAudioFailure` when nothing audible survives - the input was
    /// empty, pure silence, or noise quiet enough that trimming removed it
    /// entirely.
    pub fn clean(&self, audio: NormalizedAudio) -> AppResult<CleanedAudio> {
        if audio.samples.is_empty() {
            return Err(AppError::EmptyAudioFailure);
        }

        let input_duration = audio.duration_seconds();

        // Step 1: bring everything to the canonical rate
        let mut samples = if audio.sample_rate == self.target_sample_rate {
            audio.samples
        } else {
            self.resample(audio.samples, audio.sample_rate)?
        };

        // Step 2: peak-normalize to [-1.0, 1.0]
        normalize_peak(&mut samples);

        // Step 3: spectral gating against the clip's own noise profile
        let samples = reduce_noise(&samples);

        // Step 4: drop leading/trailing silence
        let samples = self.trim_silence(&samples)?;

        let cleaned = CleanedAudio {
            samples,
            sample_rate: self.target_sample_rate,
        };

        tracing::debug!(
            input_seconds = format!("{:.2}", input_duration),
            output_seconds = format!("{:.2}", cleaned.duration_seconds()),
            "Signal cleaning complete"
        );

        Ok(cleaned)
    }

    /// Resample mono samples to the target rate using sinc interpolation.
    ///
    /// Single-pass processing with the chunk size set to the input length;
    /// 256-tap filter with a 0.95 cutoff to prevent aliasing.
    fn resample(&self, samples: Vec<f32>, source_rate: u32) -> AppResult<Vec<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resample_ratio = self.target_sample_rate as f64 / source_rate as f64;

        let mut resampler = SincFixedIn::<f32>::new(
            resample_ratio,
            4.0, // wide enough for 8 kHz phone audio up to 48 kHz studio rates
            params,
            samples.len(),
            1,
        )
        .map_err(|e| AppError::Internal(format!("failed to create resampler: {}", e)))?;

        let mut output = resampler
            .process(&[samples], None)
            .map_err(|e| AppError::Internal(format!("resampling failed: {}", e)))?;

        Ok(output.remove(0))
    }

    /// Cut leading and trailing frames quieter than `trim_threshold_db`
    /// below the loudest frame (frame RMS, 2048-sample frames, 512 hop).
    fn trim_silence(&self, samples: &[f32]) -> AppResult<Vec<f32>> {
        let frame_len = WINDOW_SIZE.min(samples.len().max(1));
        let hop = HOP_SIZE.min(frame_len);

        let mut frame_rms = Vec::new();
        let mut start = 0;
        while start < samples.len() {
            let end = (start + frame_len).min(samples.len());
            let frame = &samples[start..end];
            let energy: f32 = frame.iter().map(|s| s * s).sum();
            frame_rms.push((energy / frame.len() as f32).sqrt());
            if end == samples.len() {
                break;
            }
            start += hop;
        }

        let peak_rms = frame_rms.iter().cloned().fold(0.0f32, f32::max);
        let threshold = peak_rms * 10f32.powf(-self.trim_threshold_db / 20.0);

        let first = frame_rms.iter().position(|&rms| rms > threshold);
        let last = frame_rms.iter().rposition(|&rms| rms > threshold);

        let (first, last) = match (first, last) {
            (Some(f), Some(l)) => (f, l),
            // peak_rms == 0.0 lands here: nothing is strictly above zero
            _ => return Err(AppError::EmptyAudioFailure),
        };

        let begin = first * hop;
        let end = (last * hop + frame_len).min(samples.len());
        if begin >= end {
            return Err(AppError::EmptyAudioFailure);
        }

        Ok(samples[begin..end].to_vec())
    }
}

/// Scale samples so the absolute peak is 1.0. Silence is left untouched.
fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak > f32::EPSILON {
        let gain = 1.0 / peak;
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }
}

/// Spectral gating noise reduction.
///
/// ## Process:
/// 1. Hann-windowed STFT (2048/512)
/// 2. Noise profile: per-bin mean magnitude over the quietest 20% of frames
/// 3. Bins below `profile * GATE_THRESHOLD_FACTOR` are attenuated to
///    `GATE_FLOOR`; everything else passes unchanged
/// 4. Overlap-add resynthesis, normalized by the accumulated window energy
///
/// Clips shorter than one analysis window are returned unmodified.
fn reduce_noise(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n < WINDOW_SIZE {
        return samples.to_vec();
    }

    let half_window = WINDOW_SIZE / 2 + 1;
    let num_frames = (n - WINDOW_SIZE) / HOP_SIZE + 1;

    let hann: Vec<f32> = (0..WINDOW_SIZE)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / WINDOW_SIZE as f32).cos()))
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    let fft_forward = planner.plan_fft_forward(WINDOW_SIZE);
    let fft_inverse = planner.plan_fft_inverse(WINDOW_SIZE);

    // Analysis pass: keep every frame's spectrum, remember frame energies
    let mut spectra: Vec<Vec<Complex<f32>>> = Vec::with_capacity(num_frames);
    let mut frames_by_energy: Vec<(usize, f32)> = Vec::with_capacity(num_frames);

    for frame_idx in 0..num_frames {
        let offset = frame_idx * HOP_SIZE;
        let mut buf: Vec<Complex<f32>> = (0..WINDOW_SIZE)
            .map(|i| Complex::new(samples[offset + i] * hann[i], 0.0))
            .collect();
        fft_forward.process(&mut buf);

        let energy: f32 = buf[..half_window].iter().map(|c| c.norm_sqr()).sum();
        frames_by_energy.push((frame_idx, energy));
        spectra.push(buf);
    }

    // Noise profile from the quietest frames
    frames_by_energy.sort_by(|a, b| a.1.total_cmp(&b.1));
    let profile_count = ((num_frames as f64 * NOISE_FRAME_FRACTION).ceil() as usize).max(1);

    let mut noise_profile = vec![0.0f32; half_window];
    for &(frame_idx, _) in frames_by_energy.iter().take(profile_count) {
        for (bin, value) in noise_profile.iter_mut().enumerate() {
            *value += spectra[frame_idx][bin].norm();
        }
    }
    for value in noise_profile.iter_mut() {
        *value /= profile_count as f32;
    }

    // Gate and resynthesize
    let mut output = vec![0.0f32; n];
    let mut window_sum = vec![0.0f32; n];

    for (frame_idx, spectrum) in spectra.into_iter().enumerate() {
        let mut gated = spectrum;
        for bin in 0..half_window {
            let threshold = noise_profile[bin] * GATE_THRESHOLD_FACTOR;
            if gated[bin].norm() < threshold {
                gated[bin] *= GATE_FLOOR;
            }
        }
        // Conjugate symmetry keeps the inverse transform real-valued
        for bin in 1..half_window - 1 {
            gated[WINDOW_SIZE - bin] = gated[bin].conj();
        }

        fft_inverse.process(&mut gated);

        let norm = 1.0 / WINDOW_SIZE as f32;
        let offset = frame_idx * HOP_SIZE;
        for i in 0..WINDOW_SIZE {
            output[offset + i] += gated[i].re * norm * hann[i];
            window_sum[offset + i] += hann[i] * hann[i];
        }
    }

    for i in 0..n {
        if window_sum[i] > 1e-6 {
            output[i] /= window_sum[i];
        } else {
            // Edges the analysis never fully covered: keep the original
            output[i] = samples[i];
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(sample_rate: u32, seconds: f64, freq: f64, amplitude: f32) -> Vec<f32> {
        let len = (sample_rate as f64 * seconds) as usize;
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin() as f32 * amplitude
            })
            .collect()
    }

    #[test]
    fn test_output_is_canonical_rate() {
        let cleaner = SignalCleaner::default();
        let audio = NormalizedAudio {
            samples: sine(8000, 1.0, 440.0, 0.5),
            sample_rate: 8000,
        };

        let cleaned = cleaner.clean(audio).unwrap();
        assert_eq!(cleaned.sample_rate, CANONICAL_SAMPLE_RATE);
        assert!(!cleaned.samples.is_empty());
    }

    #[test]
    fn test_canonical_input_skips_resampling_but_still_cleans() {
        let cleaner = SignalCleaner::default();
        let samples = sine(16000, 1.0, 440.0, 0.25);
        let len_before = samples.len();
        let audio = NormalizedAudio {
            samples,
            sample_rate: 16000,
        };

        let cleaned = cleaner.clean(audio).unwrap();
        assert_eq!(cleaned.sample_rate, CANONICAL_SAMPLE_RATE);
        // A steady tone should survive essentially whole
        assert!(cleaned.samples.len() <= len_before);
        assert!(cleaned.samples.len() > len_before / 2);
    }

    #[test]
    fn test_peak_is_normalized() {
        let cleaner = SignalCleaner::default();
        // Quiet tone with a silent lead-in: the silence feeds the noise
        // profile, so the tone itself passes the gate unattenuated
        let mut samples = vec![0.0f32; 8000];
        samples.extend(sine(16000, 1.0, 440.0, 0.1));
        let audio = NormalizedAudio {
            samples,
            sample_rate: 16000,
        };

        let cleaned = cleaner.clean(audio).unwrap();
        let peak = cleaned.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(peak > 0.5, "quiet input was not amplified, peak {}", peak);
        assert!(peak <= 1.0 + 1e-3);
    }

    #[test]
    fn test_pure_silence_is_rejected() {
        let cleaner = SignalCleaner::default();
        let audio = NormalizedAudio {
            samples: vec![0.0; 16000],
            sample_rate: 16000,
        };

        assert!(matches!(
            cleaner.clean(audio),
            Err(AppError::EmptyAudioFailure)
        ));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let cleaner = SignalCleaner::default();
        let audio = NormalizedAudio {
            samples: Vec::new(),
            sample_rate: 16000,
        };

        assert!(matches!(
            cleaner.clean(audio),
            Err(AppError::EmptyAudioFailure)
        ));
    }

    #[test]
    fn test_surrounding_silence_is_trimmed() {
        let cleaner = SignalCleaner::default();
        let mut samples = vec![0.0f32; 8000]; // 0.5 s lead-in
        samples.extend(sine(16000, 1.0, 440.0, 0.8));
        samples.extend(vec![0.0f32; 8000]); // 0.5 s tail
        let total = samples.len();

        let audio = NormalizedAudio {
            samples,
            sample_rate: 16000,
        };

        let cleaned = cleaner.clean(audio).unwrap();
        // Both silent halves should be mostly gone (frame granularity leaves
        // at most one window on each side)
        assert!(cleaned.samples.len() < total - 8000);
        assert!(cleaned.samples.len() >= 16000 - WINDOW_SIZE);
    }

    #[test]
    fn test_cleaning_is_deterministic() {
        let cleaner = SignalCleaner::default();
        let make = || NormalizedAudio {
            samples: sine(22050, 0.7, 330.0, 0.4),
            sample_rate: 22050,
        };

        let a = cleaner.clean(make()).unwrap();
        let b = cleaner.clean(make()).unwrap();

        assert_eq!(a.samples.len(), b.samples.len());
        for (x, y) in a.samples.iter().zip(b.samples.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
