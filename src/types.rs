//! # Sync Types
//!
//! Общие типы данных синхронизатора: исходные сегменты речи, синтезированные клипы,
//! промежутки тишины и собранная выходная дорожка вместе с предупреждениями.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio_format;
use crate::error::{Result, SyncError};

/// Один сегмент исходной речи, полученный от распознавателя.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Начальное время в секундах
    pub start: f64,
    /// Конечное время в секундах
    pub end: f64,
    /// Текст сегмента (синхронизатором не используется)
    #[serde(default)]
    pub text: String,
}

impl Segment {
    /// Создает новый сегмент
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Длительность сегмента в исходной дорожке
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Декодированная аудиоволна: семплы f32 с чередованием каналов.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    /// Семплы PCM (f32), каналы чередуются
    pub samples: Vec<f32>,
    /// Частота дискретизации
    pub sample_rate: u32,
    /// Количество каналов
    pub channels: u16,
}

impl Waveform {
    /// Создает волну, проверяя, что буфер содержит целое число фреймов
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(SyncError::AudioProcessing(format!(
                "invalid audio format: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(SyncError::AudioProcessing(format!(
                "sample buffer of {} samples is not divisible into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Моно-волна из готовых семплов
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Тишина заданной длины во фреймах
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    /// Количество фреймов (семплов на канал)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Длительность в секундах
    pub fn duration(&self) -> f64 {
        audio_format::duration_in_seconds(self.frames(), self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Синтезированная озвучка переведенного текста одного сегмента.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesizedClip {
    /// Декодированное аудио клипа
    pub audio: Waveform,
}

impl SynthesizedClip {
    pub fn new(audio: Waveform) -> Self {
        Self { audio }
    }

    /// Естественная длительность клипа до какой-либо корректировки
    pub fn natural_duration(&self) -> f64 {
        self.audio.duration()
    }
}

/// Промежуток исходной дорожки без целевой речи.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SilenceGap {
    pub start: f64,
    pub end: f64,
}

impl SilenceGap {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Строит промежутки тишины исходной дорожки: перед первым сегментом,
    /// между соседними сегментами и после последнего (до `total_duration`).
    ///
    /// Результат всегда содержит `segments.len() + 1` промежутков.
    pub fn from_segments(segments: &[Segment], total_duration: f64) -> Vec<SilenceGap> {
        let mut gaps = Vec::with_capacity(segments.len() + 1);
        let mut cursor = 0.0_f64;

        for segment in segments {
            gaps.push(SilenceGap {
                start: cursor,
                end: segment.start.max(cursor),
            });
            cursor = cursor.max(segment.end);
        }

        gaps.push(SilenceGap {
            start: cursor,
            end: total_duration.max(cursor),
        });
        gaps
    }
}

/// Вид нефатального предупреждения синхронизации
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Требуемый коэффициент растяжения вышел за границы и был ограничен
    RatioClamped,
    /// Промежуток после сегмента изменен из-за накопленного дрейфа
    DriftAbsorbed,
    /// Клип сегмента закончился позже исходного начала следующего сегмента.
    ///
    /// Опоздание может быть унаследовано: если клип сегмента начался поздно из-за
    /// более ранних клипов, предупреждение получает и он, даже при нулевом
    /// собственном дрейфе. Источник виден по `ClipPlacement::drift`.
    TimingOverrun,
    /// Дрейф не поглощен до конца дорожки, итоговая длительность больше исходной
    TrailingResidual,
    /// Небольшое перекрытие с предыдущим сегментом исправлено сдвигом начала
    OverlapClamped,
    /// Клип нулевой длины, окно сегмента отдано под тишину
    EmptyClip,
    /// Общая длительность меньше конца последнего сегмента и была увеличена
    TotalDurationExtended,
}

/// Структурированное предупреждение, привязанное к сегменту
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncWarning {
    /// Индекс сегмента, к которому относится предупреждение
    pub segment_index: usize,
    /// Вид предупреждения
    pub kind: WarningKind,
    /// Величина: секунды либо коэффициент (для `RatioClamped`)
    pub magnitude: f64,
}

/// Размещение одного скорректированного клипа в выходной дорожке
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipPlacement {
    pub index: usize,
    /// Исходное начало сегмента (после исправления перекрытия)
    pub original_start: f64,
    pub original_end: f64,
    /// Начало клипа в выходной дорожке
    pub output_start: f64,
    pub natural_duration: f64,
    pub adjusted_duration: f64,
    /// Коэффициент, необходимый для точного попадания в окно
    pub requested_ratio: f64,
    /// Коэффициент после ограничения
    pub applied_ratio: f64,
    /// adjusted_duration - окно сегмента
    pub drift: f64,
}

impl ClipPlacement {
    /// Насколько клип начинается позже исходного начала сегмента
    pub fn start_delay(&self) -> f64 {
        self.output_start - self.original_start
    }
}

/// Собранная выходная дорожка
#[derive(Clone, Debug)]
pub struct AlignedTrack {
    /// Итоговая волна
    pub waveform: Waveform,
    /// Длительность, к которой стремился синхронизатор:
    /// max(totalDuration, конец последнего сегмента)
    pub target_total_duration: f64,
    /// Фактическая длительность выходной дорожки
    pub actual_total_duration: f64,
    /// Непоглощенный дрейф в секундах (actual - target)
    pub residual_drift: f64,
    /// Размещения клипов в исходном порядке
    pub placements: Vec<ClipPlacement>,
    /// Нефатальные предупреждения
    pub warnings: Vec<SyncWarning>,
}

impl AlignedTrack {
    pub fn sample_rate(&self) -> u32 {
        self.waveform.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.waveform.channels
    }

    /// Предупреждения заданного вида
    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &SyncWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    /// Совпадает ли итоговая длительность с целевой (в пределах одного семпла)
    pub fn is_duration_exact(&self) -> bool {
        (self.actual_total_duration - self.target_total_duration).abs()
            <= 1.0 / self.sample_rate() as f64
    }

    /// Сохраняет дорожку в WAV-файл (32-bit float)
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        audio_format::encode_wav(&self.waveform, path)
    }

    /// Отчет о синхронизации без аудиоданных
    pub fn report(&self) -> SyncReport {
        SyncReport {
            sample_rate: self.sample_rate(),
            channels: self.channels(),
            total_frames: self.waveform.frames(),
            target_total_duration: self.target_total_duration,
            actual_total_duration: self.actual_total_duration,
            residual_drift: self.residual_drift,
            placements: self.placements.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Сериализуемый отчет о синхронизации для мультиплексора или ревью качества
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_frames: usize,
    pub target_total_duration: f64,
    pub actual_total_duration: f64,
    pub residual_drift: f64,
    pub placements: Vec<ClipPlacement>,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_frames() {
        let wave = Waveform::new(vec![0.0; 8], 4, 2).unwrap();
        assert_eq!(wave.frames(), 4);
        assert_eq!(wave.duration(), 1.0);

        assert!(Waveform::new(vec![0.0; 7], 4, 2).is_err());
        assert!(Waveform::new(vec![0.0; 4], 0, 1).is_err());
    }

    #[test]
    fn test_silence() {
        let wave = Waveform::silence(100, 1000, 2);
        assert_eq!(wave.samples.len(), 200);
        assert!(wave.samples.iter().all(|&s| s == 0.0));
        assert!((wave.duration() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_gaps_from_segments() {
        let segments = vec![
            Segment::new(1.0, 2.0, "a"),
            Segment::new(2.5, 4.0, "b"),
        ];
        let gaps = SilenceGap::from_segments(&segments, 6.0);

        assert_eq!(gaps.len(), 3);
        assert_eq!(gaps[0], SilenceGap { start: 0.0, end: 1.0 });
        assert_eq!(gaps[1], SilenceGap { start: 2.0, end: 2.5 });
        assert_eq!(gaps[2], SilenceGap { start: 4.0, end: 6.0 });
    }

    #[test]
    fn test_gaps_never_negative() {
        // Перекрытие и общая длительность короче последнего сегмента
        let segments = vec![
            Segment::new(0.0, 2.0, "a"),
            Segment::new(1.98, 3.0, "b"),
        ];
        let gaps = SilenceGap::from_segments(&segments, 2.5);

        assert_eq!(gaps[0].duration(), 0.0);
        assert_eq!(gaps[1].duration(), 0.0);
        assert_eq!(gaps[2].duration(), 0.0);
    }

    #[test]
    fn test_empty_segments_single_gap() {
        let gaps = SilenceGap::from_segments(&[], 3.0);
        assert_eq!(gaps, vec![SilenceGap { start: 0.0, end: 3.0 }]);
    }

    #[test]
    fn test_segment_deserialize_without_text() {
        let segment: Segment = serde_json::from_str(r#"{ "start": 1.5, "end": 2.0 }"#).unwrap();
        assert_eq!(segment.text, "");
        assert_eq!(segment.duration(), 0.5);
    }

    #[test]
    fn test_warning_kind_serialization() {
        let warning = SyncWarning {
            segment_index: 2,
            kind: WarningKind::TimingOverrun,
            magnitude: 0.5,
        };
        let json = serde_json::to_string(&warning).unwrap();
        assert!(json.contains("\"timing_overrun\""));
    }
}
