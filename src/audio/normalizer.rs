//! # Audio Format Normalization
//!
//! Decodes an uploaded audio payload - whatever container the browser or the
//! user produced (WebM/Opus voice recordings, MP3, WAV, OGG, FLAC, AAC, ...)
//! - into mono f32 PCM samples. This is the first pipeline stage; everything
//! downstream only ever sees PCM.
//!
//! ## Key Properties:
//! - **Format agnostic**: symphonia probes the container from the bytes
//!   themselves, with the original filename extension as an optional hint
//! - **Mono by construction**: multi-channel audio is averaged down
//! - **No side effects**: bytes in, samples out
//! - **Stable fixed point**: renormalizing the canonical WAV encoding of a
//!   `NormalizedAudio` reproduces the same samples

use crate::error::{AppError, AppResult};
use byteorder::{LittleEndian, WriteBytesExt};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

/// Mono PCM audio at the decoded container's native sample rate.
///
/// Invariant: single channel. The canonical-rate conversion happens in the
/// cleaning stage, not here.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Native sample rate of the source container in Hz
    pub sample_rate: u32,
}

impl NormalizedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Encode as a canonical 16-bit mono WAV byte stream.
    ///
    /// This is the normalizer's own output format: decoding it again yields
    /// the same samples (within 16-bit quantization), which keeps the
    /// normalizer a no-op on already-normalized input.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        let data_len = (self.samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);

        // RIFF/WAVE header, PCM16 mono
        out.extend_from_slice(b"RIFF");
        out.write_u32::<LittleEndian>(36 + data_len).unwrap();
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.write_u32::<LittleEndian>(16).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap(); // PCM
        out.write_u16::<LittleEndian>(1).unwrap(); // mono
        out.write_u32::<LittleEndian>(self.sample_rate).unwrap();
        out.write_u32::<LittleEndian>(self.sample_rate * 2).unwrap(); // byte rate
        out.write_u16::<LittleEndian>(2).unwrap(); // block align
        out.write_u16::<LittleEndian>(16).unwrap(); // bits per sample
        out.extend_from_slice(b"data");
        out.write_u32::<LittleEndian>(data_len).unwrap();

        for &sample in &self.samples {
            let quantized = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
            out.write_i16::<LittleEndian>(quantized).unwrap();
        }

        out
    }
}

/// Decodes arbitrary audio containers into `NormalizedAudio`.
pub struct FormatNormalizer;

impl FormatNormalizer {
    /// Decode raw container bytes into mono f32 PCM.
    ///
    /// ## Process:
    /// 1. Probe the container format from the byte stream
    /// 2. Select the first decodable audio track
    /// 3. Decode every packet, averaging channels down to mono
    ///
    /// ## Parameters:
    /// - **bytes**: complete container payload as uploaded
    /// - **file_name**: original filename, used only as a probe hint
    ///
    /// ## Errors:
    /// `DecodeFailure` when the container cannot be probed, no audio track
    /// exists, or decoding yields no samples at all.
    pub fn normalize(bytes: Vec<u8>, file_name: Option<&str>) -> AppResult<NormalizedAudio> {
        if bytes.is_empty() {
            return Err(AppError::DecodeFailure("empty payload".to_string()));
        }

        let mss = MediaSourceStream::new(Box::new(std::io::Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = file_name
            .and_then(|n| std::path::Path::new(n).extension())
            .and_then(|e| e.to_str())
        {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AppError::DecodeFailure(format!("unrecognized container: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AppError::DecodeFailure("no audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AppError::DecodeFailure("sample rate unknown".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AppError::DecodeFailure(format!("unsupported codec: {}", e)))?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(AppError::DecodeFailure(format!("packet read error: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| AppError::DecodeFailure(format!("packet decode error: {}", e)))?;

            append_mono(&decoded, &mut samples);
        }

        if samples.is_empty() {
            return Err(AppError::DecodeFailure(
                "container held no decodable audio".to_string(),
            ));
        }

        tracing::debug!(
            sample_rate = sample_rate,
            total_samples = samples.len(),
            "Audio payload decoded"
        );

        Ok(NormalizedAudio {
            samples,
            sample_rate,
        })
    }
}

/// Average all channels of a decoded buffer down to mono f32 and append.
fn append_mono(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    fn mix<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>)
    where
        S: Sample,
        f32: FromSample<S>,
    {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();
        out.reserve(num_frames);

        for frame_idx in 0..num_frames {
            let mut sum = 0.0f32;
            for ch in 0..num_channels {
                sum += f32::from_sample(buf.chan(ch)[frame_idx]);
            }
            out.push(sum / num_channels as f32);
        }
    }

    match decoded {
        AudioBufferRef::U8(buf) => mix(buf, out),
        AudioBufferRef::U16(buf) => mix(buf, out),
        AudioBufferRef::U24(buf) => mix(buf, out),
        AudioBufferRef::U32(buf) => mix(buf, out),
        AudioBufferRef::S8(buf) => mix(buf, out),
        AudioBufferRef::S16(buf) => mix(buf, out),
        AudioBufferRef::S24(buf) => mix(buf, out),
        AudioBufferRef::S32(buf) => mix(buf, out),
        AudioBufferRef::F32(buf) => mix(buf, out),
        AudioBufferRef::F64(buf) => mix(buf, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_audio(sample_rate: u32, seconds: f64, freq: f64) -> NormalizedAudio {
        let len = (sample_rate as f64 * seconds) as usize;
        let samples: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                // Quantize to i16 precision so the WAV round trip is exact
                let s = (2.0 * std::f64::consts::PI * freq * t).sin() * 0.5;
                ((s * 32768.0).round() / 32768.0) as f32
            })
            .collect();
        NormalizedAudio {
            samples,
            sample_rate,
        }
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let result = FormatNormalizer::normalize(vec![0xde, 0xad, 0xbe, 0xef], None);
        assert!(matches!(result, Err(AppError::DecodeFailure(_))));
    }

    #[test]
    fn test_rejects_empty_payload() {
        let result = FormatNormalizer::normalize(Vec::new(), Some("clip.webm"));
        assert!(matches!(result, Err(AppError::DecodeFailure(_))));
    }

    #[test]
    fn test_decodes_wav_payload() {
        let audio = sine_audio(8000, 0.25, 440.0);
        let decoded = FormatNormalizer::normalize(audio.to_wav_bytes(), Some("clip.wav")).unwrap();

        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.samples.len(), audio.samples.len());
    }

    #[test]
    fn test_normalize_is_fixed_point_on_own_encoding() {
        let audio = sine_audio(16000, 0.2, 220.0);

        let once = FormatNormalizer::normalize(audio.to_wav_bytes(), None).unwrap();
        let twice = FormatNormalizer::normalize(once.to_wav_bytes(), None).unwrap();

        assert_eq!(once.sample_rate, twice.sample_rate);
        assert_eq!(once.samples.len(), twice.samples.len());
        for (a, b) in once.samples.iter().zip(twice.samples.iter()) {
            assert!(
                (a - b).abs() <= 1.0 / 32768.0,
                "samples diverged: {} vs {}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_stereo_is_mixed_to_mono() {
        // Stereo fixture with left = 0.5, right = -0.5 everywhere, so the
        // mono mixdown must land on (almost) zero.
        let frames = 800usize;
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames {
                writer.write_sample(16384i16).unwrap();
                writer.write_sample(-16384i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = FormatNormalizer::normalize(cursor.into_inner(), Some("stereo.wav")).unwrap();
        assert_eq!(decoded.samples.len(), frames);
        for s in &decoded.samples {
            assert!(s.abs() < 1.0 / 32768.0 + f32::EPSILON);
        }
    }
}
