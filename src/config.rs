//! Модуль конфигурации библиотеки speechbridge-sync
//!
//! Этот модуль содержит параметры синхронизатора: границы коэффициента растяжения,
//! допуск на перекрытие сегментов, формат выходной дорожки и параметры WSOLA.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Параметры алгоритма WSOLA
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WsolaConfig {
    /// Длина окна анализа в миллисекундах
    pub frame_ms: f64,
    /// Радиус поиска наилучшего совпадения в миллисекундах
    pub seek_ms: f64,
}

impl Default for WsolaConfig {
    fn default() -> Self {
        Self {
            frame_ms: 40.0,
            seek_ms: 15.0,
        }
    }
}

/// Параметры поиска начала речи в исходной дорожке
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechStartConfig {
    /// Порог тишины в dBFS (RMS окна анализа)
    pub threshold_db: f32,
    /// Минимальная длительность ведущей тишины в секундах
    pub min_silence: f64,
    /// Насколько раньше найденного начала речи может стоять первый сегмент
    pub tolerance: f64,
}

impl Default for SpeechStartConfig {
    fn default() -> Self {
        Self {
            threshold_db: -30.0,
            min_silence: 0.5,
            tolerance: 0.5,
        }
    }
}

impl SpeechStartConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_db.is_finite() && self.threshold_db <= 0.0) {
            return Err(SyncError::Configuration(format!(
                "threshold_db must be a non-positive dBFS value, got {}",
                self.threshold_db
            )));
        }
        if !(self.min_silence.is_finite() && self.min_silence >= 0.0) {
            return Err(SyncError::Configuration(format!(
                "min_silence must be non-negative, got {}",
                self.min_silence
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(SyncError::Configuration(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Конфигурация синхронизатора
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Нижняя граница коэффициента растяжения (0.5 = ускорение не более чем в 2 раза)
    pub min_ratio: f64,
    /// Верхняя граница коэффициента растяжения (2.0 = замедление не более чем в 2 раза)
    pub max_ratio: f64,
    /// Максимальное перекрытие соседних сегментов (в секундах), которое исправляется без ошибки
    pub overlap_tolerance: f64,
    /// Частота дискретизации выходной дорожки
    pub sample_rate: u32,
    /// Количество каналов выходной дорожки
    pub channels: u16,
    /// Длительность fade in/out для каждого клипа в миллисекундах.
    /// По умолчанию 0: звук клипа не меняется ничем, кроме растяжения.
    pub fade_ms: u32,
    /// Обрабатывать клипы параллельно (первый проход)
    pub parallel: bool,
    /// Параметры WSOLA
    pub wsola: WsolaConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_ratio: 0.5,
            max_ratio: 2.0,
            overlap_tolerance: 0.05,
            sample_rate: 44100,
            channels: 2,
            fade_ms: 0,
            parallel: true,
            wsola: WsolaConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Загрузить конфигурацию из JSON-строки. Отсутствующие поля берутся по умолчанию.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Загрузить конфигурацию из JSON-файла
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Проверить корректность конфигурации
    pub fn validate(&self) -> Result<()> {
        if !(self.min_ratio.is_finite() && self.min_ratio > 0.0) {
            return Err(SyncError::Configuration(format!(
                "min_ratio must be a positive number, got {}",
                self.min_ratio
            )));
        }
        if !self.max_ratio.is_finite() || self.max_ratio < self.min_ratio {
            return Err(SyncError::Configuration(format!(
                "max_ratio must be >= min_ratio ({}), got {}",
                self.min_ratio, self.max_ratio
            )));
        }
        if !(self.overlap_tolerance.is_finite() && self.overlap_tolerance >= 0.0) {
            return Err(SyncError::Configuration(format!(
                "overlap_tolerance must be non-negative, got {}",
                self.overlap_tolerance
            )));
        }
        if self.sample_rate == 0 {
            return Err(SyncError::Configuration("sample_rate must be positive".to_string()));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(SyncError::Configuration(format!(
                "channels must be in 1..=8, got {}",
                self.channels
            )));
        }
        if !(self.wsola.frame_ms.is_finite() && self.wsola.frame_ms > 0.0) {
            return Err(SyncError::Configuration(format!(
                "wsola.frame_ms must be positive, got {}",
                self.wsola.frame_ms
            )));
        }
        if !(self.wsola.seek_ms.is_finite() && self.wsola.seek_ms >= 0.0) {
            return Err(SyncError::Configuration(format!(
                "wsola.seek_ms must be non-negative, got {}",
                self.wsola.seek_ms
            )));
        }
        Ok(())
    }

    /// Перевести время в секундах в количество фреймов выходной дорожки
    pub fn frames(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }

    /// Перевести количество фреймов в секунды
    pub fn seconds(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}
