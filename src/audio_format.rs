//! # Audio Format Handling
//!
//! Модуль для кодирования и декодирования аудио на границах синхронизатора:
//! клипы от TTS-провайдеров приходят в MP3/AAC/WAV, выходная дорожка
//! сохраняется в WAV для мультиплексора.
//!
//! ## Примеры использования
//!
//! ```no_run
//! use speechbridge_sync::audio_format::{decode_audio_bytes, encode_wav};
//!
//! # fn main() -> speechbridge_sync::Result<()> {
//! let mp3 = std::fs::read("segment_0001.mp3")?;
//! let wave = decode_audio_bytes(&mp3)?;
//! encode_wav(&wave, "segment_0001.wav")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SyncError};
use crate::types::Waveform;

/// Вычисляет длительность аудио в секундах по количеству фреймов и частоте дискретизации.
pub fn duration_in_seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Декодирует сжатое или несжатое аудио (MP3, AAC, WAV, PCM) из памяти.
///
/// Каналы сохраняются как есть (с чередованием), приведение к формату
/// выходной дорожки выполняет синхронизатор.
///
/// # Ошибки
///
/// `SyncError::AudioProcessing`, если формат не распознан или в потоке нет аудио-трека.
pub fn decode_audio_bytes(data: &[u8]) -> Result<Waveform> {
    let cursor = std::io::Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&Hint::new(), mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| SyncError::AudioProcessing(format!("failed to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SyncError::AudioProcessing("no audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SyncError::AudioProcessing(format!("failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut samples = Vec::new();

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(e) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
        }
    }

    debug!(
        "Decoded {} samples ({} Hz, {} channels)",
        samples.len(),
        sample_rate,
        channels
    );
    Waveform::new(samples, sample_rate, channels)
}

/// Декодирует WAV-файл в волну f32.
///
/// Целочисленные форматы нормализуются в диапазон [-1.0, 1.0].
pub fn decode_wav_file<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Waveform::new(samples, spec.sample_rate, spec.channels)
}

/// Кодирует волну в WAV-файл (32-bit float).
pub fn encode_wav<P: AsRef<Path>>(wave: &Waveform, path: P) -> Result<()> {
    let spec = WavSpec {
        channels: wave.channels,
        sample_rate: wave.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in &wave.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!(
        "Saved WAV file: {} ({} frames, {} Hz)",
        path.as_ref().display(),
        wave.frames(),
        wave.sample_rate
    );
    Ok(())
}

/// Вычисляет среднеквадратичное значение (RMS) для массива семплов.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sine(freq: f32, frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 / sample_rate as f32 * freq * 2.0 * std::f32::consts::PI).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_duration_calculation() {
        assert_eq!(duration_in_seconds(44100, 44100), 1.0);
        assert_eq!(duration_in_seconds(22050, 44100), 0.5);
        assert_eq!(duration_in_seconds(0, 44100), 0.0);
        assert_eq!(duration_in_seconds(10, 0), 0.0);
    }

    #[test]
    fn test_compute_rms() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        assert!((compute_rms(&samples) - 0.7071).abs() < 0.0001);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn test_wav_encode_decode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let left = sine(440.0, 800, 8000);
        let samples: Vec<f32> = left.iter().flat_map(|&s| [s, -s]).collect();
        let wave = Waveform::new(samples, 8000, 2).unwrap();

        encode_wav(&wave, &path).unwrap();
        let decoded = decode_wav_file(&path).unwrap();

        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 800);
        for (a, b) in wave.samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_int_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pcm16.wav");

        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for v in [0_i16, 16384, -16384, i16::MAX] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_wav_file(&path).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), 4);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-4);
        assert!((decoded.samples[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_wav_bytes_with_symphonia() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.wav");

        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for s in sine(220.0, 2205, 22050) {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let wave = decode_audio_bytes(&bytes).unwrap();
        assert_eq!(wave.sample_rate, 22050);
        assert_eq!(wave.channels, 1);
        assert_eq!(wave.frames(), 2205);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_audio_bytes(b"definitely not audio");
        assert!(matches!(result, Err(SyncError::AudioProcessing(_))));
    }
}
