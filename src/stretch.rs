//! # Time Stretching
//!
//! Изменение длительности клипа с сохранением высоты тона.
//!
//! Основная реализация: WSOLA (Waveform Similarity Overlap-Add): выходной сигнал
//! собирается из окон Ханна с 50% перекрытием, а начало каждого следующего окна во
//! входном сигнале выбирается в окрестности номинальной позиции так, чтобы оно лучше
//! всего продолжало предыдущее окно. Это тот же класс алгоритмов, что использует SoundTouch.
//!
//! ```
//! use speechbridge_sync::stretch::{TimeStretch, WsolaStretcher};
//!
//! let input = vec![0.0_f32; 16000];
//! let stretched = WsolaStretcher::default()
//!     .stretch(&input, 1, 16000, 24000)
//!     .unwrap();
//! assert_eq!(stretched.len(), 24000);
//! ```

use log::trace;

use crate::audio_processing::linear_resize;
use crate::config::WsolaConfig;
use crate::error::Result;

/// Алгоритм изменения длительности аудио.
///
/// Реализация обязана вернуть ровно `out_frames` фреймов (`out_frames * channels` семплов)
/// и не зависеть ни от чего, кроме своих аргументов: синхронизатор вызывает её
/// параллельно для разных клипов.
pub trait TimeStretch: Send + Sync {
    fn stretch(
        &self,
        samples: &[f32],
        channels: usize,
        sample_rate: u32,
        out_frames: usize,
    ) -> Result<Vec<f32>>;
}

/// Шаг грубого поиска смещения (в семплах)
const COARSE_STEP: usize = 4;

/// WSOLA-растяжение с сохранением высоты тона
#[derive(Debug, Clone)]
pub struct WsolaStretcher {
    config: WsolaConfig,
}

impl Default for WsolaStretcher {
    fn default() -> Self {
        Self::new(WsolaConfig::default())
    }
}

impl WsolaStretcher {
    pub fn new(config: WsolaConfig) -> Self {
        Self { config }
    }

    fn frame_len(&self, sample_rate: u32) -> usize {
        let len = (self.config.frame_ms / 1000.0 * sample_rate as f64) as usize;
        // Четная длина, чтобы половинки окна Ханна складывались в единицу
        (len.max(8)) & !1
    }

    fn seek_len(&self, sample_rate: u32) -> usize {
        (self.config.seek_ms / 1000.0 * sample_rate as f64) as usize
    }

    /// Ищет начало окна в `[nominal - seek, nominal + seek]`, лучше всего
    /// продолжающее фрагмент `mono[target..target + overlap]`.
    fn best_offset(
        &self,
        mono: &[f32],
        target: usize,
        nominal: usize,
        seek: usize,
        overlap: usize,
        max_start: usize,
    ) -> usize {
        let lo = nominal.saturating_sub(seek);
        let hi = (nominal + seek).min(max_start);
        if lo >= hi {
            return nominal.min(max_start);
        }

        let reference = &mono[target..target + overlap];
        let score = |candidate: usize| -> f32 {
            let window = &mono[candidate..candidate + overlap];
            let mut corr = 0.0_f32;
            let mut energy = 0.0_f32;
            for j in (0..overlap).step_by(2) {
                corr += window[j] * reference[j];
                energy += window[j] * window[j];
            }
            if energy <= f32::EPSILON {
                0.0
            } else {
                corr / energy.sqrt()
            }
        };

        let mut best = nominal.clamp(lo, hi);
        let mut best_score = score(best);

        for candidate in (lo..=hi).step_by(COARSE_STEP) {
            let s = score(candidate);
            if s > best_score {
                best = candidate;
                best_score = s;
            }
        }

        let fine_lo = best.saturating_sub(COARSE_STEP - 1).max(lo);
        let fine_hi = (best + COARSE_STEP - 1).min(hi);
        for candidate in fine_lo..=fine_hi {
            let s = score(candidate);
            if s > best_score {
                best = candidate;
                best_score = s;
            }
        }

        best
    }
}

impl TimeStretch for WsolaStretcher {
    fn stretch(
        &self,
        samples: &[f32],
        channels: usize,
        sample_rate: u32,
        out_frames: usize,
    ) -> Result<Vec<f32>> {
        let channels = channels.max(1);
        let in_frames = samples.len() / channels;

        if out_frames == 0 {
            return Ok(Vec::new());
        }
        if in_frames == 0 {
            return Ok(vec![0.0; out_frames * channels]);
        }
        if in_frames == out_frames {
            return Ok(samples[..in_frames * channels].to_vec());
        }

        let frame_len = self.frame_len(sample_rate);
        if in_frames < frame_len || out_frames < frame_len {
            trace!(
                "Clip too short for WSOLA ({} -> {} frames), using linear interpolation",
                in_frames,
                out_frames
            );
            return Ok(linear_resize(samples, channels, out_frames));
        }

        let hop_out = frame_len / 2;
        let hop_in = hop_out as f64 * in_frames as f64 / out_frames as f64;
        let seek = self.seek_len(sample_rate);
        let max_start = in_frames - frame_len;

        let window: Vec<f32> = (0..frame_len)
            .map(|i| {
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / frame_len as f32).cos()
            })
            .collect();

        let mono: Vec<f32> = if channels == 1 {
            samples[..in_frames].to_vec()
        } else {
            samples
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        let mut output = vec![0.0_f32; (out_frames + frame_len) * channels];
        let mut weights = vec![0.0_f32; out_frames + frame_len];
        let mut prev_start = 0_usize;
        let mut k = 0_usize;

        loop {
            let out_pos = k * hop_out;
            if out_pos >= out_frames {
                break;
            }

            let nominal = ((k as f64 * hop_in).round() as usize).min(max_start);
            let start = if k == 0 {
                0
            } else {
                let target = (prev_start + hop_out).min(max_start);
                self.best_offset(&mono, target, nominal, seek, hop_out, max_start)
            };

            for (j, &w) in window.iter().enumerate() {
                let src = (start + j) * channels;
                let dst = (out_pos + j) * channels;
                for c in 0..channels {
                    output[dst + c] += samples[src + c] * w;
                }
                weights[out_pos + j] += w;
            }

            prev_start = start;
            k += 1;
        }

        output.truncate(out_frames * channels);
        for (frame, &weight) in output.chunks_exact_mut(channels).zip(weights.iter()) {
            if weight > 1e-3 {
                for sample in frame.iter_mut() {
                    *sample /= weight;
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * 0.8)
            .collect()
    }

    /// Частота по количеству пересечений нуля
    fn estimate_frequency(samples: &[f32], sample_rate: u32) -> f32 {
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        crossings as f32 / 2.0 / (samples.len() as f32 / sample_rate as f32)
    }

    #[test]
    fn test_exact_output_length() {
        let stretcher = WsolaStretcher::default();
        let input = sine(200.0, 8000, 8000);

        for out_frames in [4000, 5333, 8001, 12000, 16000] {
            let output = stretcher.stretch(&input, 1, 8000, out_frames).unwrap();
            assert_eq!(output.len(), out_frames);
        }
    }

    #[test]
    fn test_slow_down_preserves_pitch() {
        let stretcher = WsolaStretcher::default();
        let input = sine(200.0, 8000, 8000);
        let output = stretcher.stretch(&input, 1, 8000, 16000).unwrap();

        let middle = &output[2000..14000];
        let freq = estimate_frequency(middle, 8000);
        assert!((freq - 200.0).abs() < 20.0, "estimated frequency {}", freq);
    }

    #[test]
    fn test_speed_up_preserves_pitch() {
        let stretcher = WsolaStretcher::default();
        let input = sine(200.0, 16000, 8000);
        let output = stretcher.stretch(&input, 1, 8000, 8000).unwrap();

        let middle = &output[1000..7000];
        let freq = estimate_frequency(middle, 8000);
        assert!((freq - 200.0).abs() < 20.0, "estimated frequency {}", freq);
    }

    #[test]
    fn test_amplitude_preserved() {
        let stretcher = WsolaStretcher::default();
        let input = sine(250.0, 8000, 8000);
        let output = stretcher.stretch(&input, 1, 8000, 11000).unwrap();

        let peak = output[1000..10000].iter().fold(0.0_f32, |a, &b| a.max(b.abs()));
        assert!(peak > 0.6 && peak < 1.0, "peak {}", peak);
    }

    #[test]
    fn test_stereo_keeps_channels() {
        let stretcher = WsolaStretcher::default();
        let left = sine(200.0, 8000, 8000);
        let input: Vec<f32> = left.iter().flat_map(|&s| [s, 0.0]).collect();

        let output = stretcher.stretch(&input, 2, 8000, 6000).unwrap();
        assert_eq!(output.len(), 12000);
        assert!(output.iter().skip(1).step_by(2).all(|&s| s == 0.0));
        assert!(output.iter().step_by(2).any(|&s| s.abs() > 0.5));
    }

    #[test]
    fn test_identity_and_edge_cases() {
        let stretcher = WsolaStretcher::default();
        let input = sine(200.0, 1000, 8000);

        assert_eq!(stretcher.stretch(&input, 1, 8000, 1000).unwrap(), input);
        assert!(stretcher.stretch(&input, 1, 8000, 0).unwrap().is_empty());
        assert_eq!(stretcher.stretch(&[], 1, 8000, 10).unwrap(), vec![0.0; 10]);
    }

    #[test]
    fn test_short_clip_falls_back_to_interpolation() {
        let stretcher = WsolaStretcher::default();
        // 100 фреймов меньше окна WSOLA (320 фреймов при 8 кГц)
        let input = sine(200.0, 100, 8000);
        let output = stretcher.stretch(&input, 1, 8000, 150).unwrap();
        assert_eq!(output.len(), 150);
        assert_eq!(output[0], input[0]);
    }

    #[test]
    fn test_deterministic() {
        let stretcher = WsolaStretcher::default();
        let input = sine(180.0, 8000, 8000);
        let a = stretcher.stretch(&input, 1, 8000, 9500).unwrap();
        let b = stretcher.stretch(&input, 1, 8000, 9500).unwrap();
        assert_eq!(a, b);
    }
}
