//! # Synchronizer
//!
//! Собирает одну выходную дорожку из синтезированных клипов так, чтобы начала
//! сегментов и паузы между ними совпадали с исходной речью.
//!
//! Работа выполняется в два прохода:
//!
//! 1. Для каждого клипа независимо (параллельно через rayon): приведение формата,
//!    вычисление и ограничение коэффициента растяжения, растяжение, fade in/out (если включен).
//! 2. Последовательно, в исходном порядке: перенос дрейфа в следующие промежутки
//!    тишины и склейка дорожки.
//!
//! Вся арифметика временной шкалы ведется в целых фреймах выходной частоты
//! дискретизации, поэтому сумма длительностей тишины и клипов в точности равна
//! длине результата.

use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::audio_processing::{apply_fade, normalize_format};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::stretch::{TimeStretch, WsolaStretcher};
use crate::types::{
    AlignedTrack, ClipPlacement, Segment, SilenceGap, SyncWarning, SynthesizedClip, WarningKind,
    Waveform,
};

/// Допуск на погрешность округления при сравнении перекрытия с настройкой
const OVERLAP_EPSILON: f64 = 1e-9;

/// Окно сегмента на исходной шкале после исправления перекрытий
#[derive(Debug, Clone)]
struct Window {
    start: f64,
    end: f64,
    /// Величина исправленного перекрытия с предыдущим сегментом
    clamped_overlap: Option<f64>,
}

/// Результат первого прохода для одного клипа
#[derive(Debug)]
struct PreparedClip {
    samples: Vec<f32>,
    natural_frames: usize,
    adjusted_frames: usize,
    window_frames: usize,
    requested_ratio: f64,
    applied_ratio: f64,
}

impl PreparedClip {
    fn drift_frames(&self) -> i64 {
        self.adjusted_frames as i64 - self.window_frames as i64
    }

    fn is_clamped(&self) -> bool {
        self.natural_frames > 0 && self.requested_ratio != self.applied_ratio
    }
}

/// Синхронизатор озвучки с исходной временной шкалой.
///
/// Не хранит состояния между вызовами, кроме конфигурации и алгоритма растяжения,
/// поэтому один экземпляр можно использовать из нескольких потоков.
#[derive(Clone)]
pub struct Synchronizer {
    config: SyncConfig,
    stretcher: Arc<dyn TimeStretch>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Создает синхронизатор с WSOLA-растяжением
    pub fn new(config: SyncConfig) -> Result<Self> {
        let stretcher = Arc::new(WsolaStretcher::new(config.wsola.clone()));
        Self::with_stretcher(config, stretcher)
    }

    /// Создает синхронизатор с произвольным алгоритмом растяжения
    pub fn with_stretcher(config: SyncConfig, stretcher: Arc<dyn TimeStretch>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, stretcher })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Выравнивает клипы по исходным сегментам.
    ///
    /// # Ошибки
    ///
    /// * `SyncError::MismatchedSegmentCount`: количество сегментов и клипов различается
    /// * `SyncError::InvalidSegmentOrder`: сегмент перекрывает предыдущий сильнее
    ///   `overlap_tolerance` или имеет некорректные метки времени
    /// * `SyncError::Configuration`: отрицательная или нечисловая общая длительность
    ///
    /// Все расхождения длительностей не являются ошибками и возвращаются в
    /// `AlignedTrack::warnings`.
    pub fn align(
        &self,
        segments: &[Segment],
        clips: &[SynthesizedClip],
        total_duration: f64,
    ) -> Result<AlignedTrack> {
        if !(total_duration.is_finite() && total_duration >= 0.0) {
            return Err(SyncError::Configuration(format!(
                "total duration must be a non-negative number, got {}",
                total_duration
            )));
        }
        if segments.len() != clips.len() {
            return Err(SyncError::MismatchedSegmentCount {
                segments: segments.len(),
                clips: clips.len(),
            });
        }

        info!(
            "Aligning {} clips to a {:.3}s timeline",
            segments.len(),
            total_duration
        );

        let windows = self.validate_timeline(segments)?;
        let last_end = windows.last().map(|w| w.end).unwrap_or(0.0);
        let target_total = total_duration.max(last_end);

        let effective: Vec<Segment> = windows
            .iter()
            .zip(segments)
            .map(|(w, s)| Segment::new(w.start, w.end, s.text.clone()))
            .collect();
        let gaps = SilenceGap::from_segments(&effective, target_total);
        let gap_frames: Vec<usize> = gaps
            .iter()
            .map(|g| self.config.frames(g.end) - self.config.frames(g.start))
            .collect();
        let window_frames: Vec<usize> = windows
            .iter()
            .map(|w| self.config.frames(w.end) - self.config.frames(w.start))
            .collect();

        // Проход 1: независимая подготовка клипов
        let prepared: Vec<PreparedClip> = if self.config.parallel {
            clips
                .par_iter()
                .zip(window_frames.par_iter())
                .enumerate()
                .map(|(index, (clip, &window))| self.prepare_clip(index, clip, window))
                .collect::<Result<Vec<_>>>()?
        } else {
            clips
                .iter()
                .zip(window_frames.iter())
                .enumerate()
                .map(|(index, (clip, &window))| self.prepare_clip(index, clip, window))
                .collect::<Result<Vec<_>>>()?
        };

        // Проход 2: перенос дрейфа и склейка
        let track = self.assemble(&windows, &gap_frames, prepared, total_duration, target_total);

        info!(
            "Alignment finished: {:.3}s (target {:.3}s), {} warnings",
            track.actual_total_duration,
            track.target_total_duration,
            track.warnings.len()
        );
        Ok(track)
    }

    /// Выполняет `align` в пуле блокирующих задач tokio.
    ///
    /// Отмена грубая: при отмене задачи частичный результат не возвращается.
    pub async fn align_async(
        self: Arc<Self>,
        segments: Vec<Segment>,
        clips: Vec<SynthesizedClip>,
        total_duration: f64,
    ) -> Result<AlignedTrack> {
        tokio::task::spawn_blocking(move || self.align(&segments, &clips, total_duration))
            .await
            .map_err(|e| SyncError::Other(anyhow::anyhow!("alignment task failed: {}", e)))?
    }

    /// Проверяет метки времени и исправляет небольшие перекрытия
    fn validate_timeline(&self, segments: &[Segment]) -> Result<Vec<Window>> {
        let mut windows = Vec::with_capacity(segments.len());
        let mut prev_end = 0.0_f64;

        for (index, segment) in segments.iter().enumerate() {
            let valid = segment.start.is_finite()
                && segment.end.is_finite()
                && segment.start >= 0.0
                && segment.end >= segment.start;
            if !valid {
                return Err(SyncError::InvalidSegmentOrder {
                    index,
                    overlap: (segment.start - segment.end).max(0.0),
                });
            }

            let mut window = Window {
                start: segment.start,
                end: segment.end,
                clamped_overlap: None,
            };

            if index > 0 && segment.start < prev_end {
                let overlap = prev_end - segment.start;
                if overlap > self.config.overlap_tolerance + OVERLAP_EPSILON {
                    return Err(SyncError::InvalidSegmentOrder { index, overlap });
                }
                debug!(
                    "Segment {} overlaps the previous one by {:.3}s, clamping",
                    index, overlap
                );
                window.start = prev_end;
                window.end = segment.end.max(prev_end);
                window.clamped_overlap = Some(overlap);
            }

            prev_end = window.end;
            windows.push(window);
        }

        Ok(windows)
    }

    /// Первый проход для одного клипа: формат, коэффициент, растяжение, fade
    fn prepare_clip(
        &self,
        index: usize,
        clip: &SynthesizedClip,
        window_frames: usize,
    ) -> Result<PreparedClip> {
        let config = &self.config;
        let normalized = normalize_format(&clip.audio, config.sample_rate, config.channels)?;
        let natural_frames = normalized.frames();
        let channels = config.channels as usize;

        if natural_frames == 0 {
            return Ok(PreparedClip {
                samples: Vec::new(),
                natural_frames: 0,
                adjusted_frames: 0,
                window_frames,
                requested_ratio: 1.0,
                applied_ratio: 1.0,
            });
        }

        let requested_ratio = window_frames as f64 / natural_frames as f64;
        let applied_ratio = requested_ratio.clamp(config.min_ratio, config.max_ratio);
        let adjusted_frames = if applied_ratio == requested_ratio {
            window_frames
        } else {
            (natural_frames as f64 * applied_ratio).round() as usize
        };

        debug!(
            "Fragment {}: natural {:.3}s -> window {:.3}s -> adjusted {:.3}s (ratio {:.3}, requested {:.3})",
            index,
            config.seconds(natural_frames),
            config.seconds(window_frames),
            config.seconds(adjusted_frames),
            applied_ratio,
            requested_ratio
        );

        let mut samples = if adjusted_frames == natural_frames {
            normalized.samples
        } else {
            self.stretcher.stretch(
                &normalized.samples,
                channels,
                config.sample_rate,
                adjusted_frames,
            )?
        };

        if samples.len() != adjusted_frames * channels {
            return Err(SyncError::TimeStretching(format!(
                "stretcher returned {} samples for fragment {}, expected {}",
                samples.len(),
                index,
                adjusted_frames * channels
            )));
        }

        apply_fade(&mut samples, channels, config.fade_ms, config.sample_rate);

        Ok(PreparedClip {
            samples,
            natural_frames,
            adjusted_frames,
            window_frames,
            requested_ratio,
            applied_ratio,
        })
    }

    /// Второй проход: последовательная склейка с переносом дрейфа вперед
    fn assemble(
        &self,
        windows: &[Window],
        gap_frames: &[usize],
        prepared: Vec<PreparedClip>,
        total_duration: f64,
        target_total: f64,
    ) -> AlignedTrack {
        let config = &self.config;
        let channels = config.channels as usize;
        let secs = |frames: i64| frames as f64 / config.sample_rate as f64;

        let estimated = gap_frames.iter().sum::<usize>()
            + prepared.iter().map(|p| p.adjusted_frames).sum::<usize>();
        let mut samples: Vec<f32> = Vec::with_capacity(estimated * channels);
        let mut warnings = Vec::new();
        let mut placements = Vec::with_capacity(prepared.len());

        // Перенесенный дрейф во фреймах: > 0 клипы опаздывают, < 0 есть запас
        let mut carry: i64 = 0;

        for (index, clip) in prepared.into_iter().enumerate() {
            let gap = gap_frames[index] as i64;
            let emitted = (gap - carry).max(0);
            let leftover = (carry - gap).max(0);
            let absorbed = gap - emitted;

            if index > 0 && absorbed != 0 {
                warnings.push(SyncWarning {
                    segment_index: index - 1,
                    kind: WarningKind::DriftAbsorbed,
                    magnitude: secs(absorbed),
                });
            }
            if leftover > 0 {
                warn!(
                    "Fragment {} overruns into segment {} by {:.3}s",
                    index.saturating_sub(1),
                    index,
                    secs(leftover)
                );
                warnings.push(SyncWarning {
                    segment_index: index.saturating_sub(1),
                    kind: WarningKind::TimingOverrun,
                    magnitude: secs(leftover),
                });
            }

            let window = &windows[index];
            if let Some(overlap) = window.clamped_overlap {
                warnings.push(SyncWarning {
                    segment_index: index,
                    kind: WarningKind::OverlapClamped,
                    magnitude: overlap,
                });
            }
            if clip.is_clamped() {
                warnings.push(SyncWarning {
                    segment_index: index,
                    kind: WarningKind::RatioClamped,
                    magnitude: clip.requested_ratio,
                });
            }
            if clip.natural_frames == 0 {
                warnings.push(SyncWarning {
                    segment_index: index,
                    kind: WarningKind::EmptyClip,
                    magnitude: secs(clip.window_frames as i64),
                });
            }

            samples.resize(samples.len() + emitted as usize * channels, 0.0);
            let output_start = samples.len() / channels;
            samples.extend_from_slice(&clip.samples);

            let drift = clip.drift_frames();
            placements.push(ClipPlacement {
                index,
                original_start: window.start,
                original_end: window.end,
                output_start: config.seconds(output_start),
                natural_duration: config.seconds(clip.natural_frames),
                adjusted_duration: config.seconds(clip.adjusted_frames),
                requested_ratio: clip.requested_ratio,
                applied_ratio: clip.applied_ratio,
                drift: secs(drift),
            });

            carry = leftover + drift;
        }

        let last_index = windows.len().saturating_sub(1);
        let trailing = gap_frames.last().copied().unwrap_or(0) as i64;
        let emitted = (trailing - carry).max(0);
        let residual = (carry - trailing).max(0);
        let absorbed = trailing - emitted;

        if !windows.is_empty() && absorbed != 0 {
            warnings.push(SyncWarning {
                segment_index: last_index,
                kind: WarningKind::DriftAbsorbed,
                magnitude: secs(absorbed),
            });
        }
        if residual > 0 {
            warn!(
                "Unabsorbed drift of {:.3}s at the end of the track",
                secs(residual)
            );
            warnings.push(SyncWarning {
                segment_index: last_index,
                kind: WarningKind::TrailingResidual,
                magnitude: secs(residual),
            });
        }
        if target_total > total_duration {
            warnings.push(SyncWarning {
                segment_index: last_index,
                kind: WarningKind::TotalDurationExtended,
                magnitude: target_total - total_duration,
            });
        }

        samples.resize(samples.len() + emitted as usize * channels, 0.0);

        let waveform = Waveform {
            samples,
            sample_rate: config.sample_rate,
            channels: config.channels,
        };

        AlignedTrack {
            actual_total_duration: waveform.duration(),
            target_total_duration: target_total,
            residual_drift: secs(residual),
            waveform,
            placements,
            warnings,
        }
    }
}

/// Выравнивает клипы по сегментам с заданной конфигурацией.
///
/// Удобная обертка над [`Synchronizer::align`].
pub fn align(
    segments: &[Segment],
    clips: &[SynthesizedClip],
    total_duration: f64,
    config: &SyncConfig,
) -> Result<AlignedTrack> {
    Synchronizer::new(config.clone())?.align(segments, clips, total_duration)
}
