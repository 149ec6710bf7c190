//! Модуль обработки ошибок библиотеки speechbridge-sync
//!
//! Фатальными для выравнивания считаются только нарушения контракта входных данных
//! (`MismatchedSegmentCount`, `InvalidSegmentOrder`). Всё, что связано с несовпадением
//! длительностей, не является ошибкой и возвращается как предупреждение в результате.

use thiserror::Error;

/// Ошибки библиотеки speechbridge-sync
#[derive(Debug, Error)]
pub enum SyncError {
    /// Количество сегментов не совпадает с количеством синтезированных клипов
    #[error("Mismatched segment count: {segments} segments, {clips} clips")]
    MismatchedSegmentCount { segments: usize, clips: usize },

    /// Сегмент начинается раньше конца предыдущего больше, чем допускает конфигурация,
    /// либо его собственные временные метки некорректны
    #[error("Invalid segment order at index {index}: overlap {overlap:.3}s")]
    InvalidSegmentOrder { index: usize, overlap: f64 },

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка изменения темпа или ресемплинга
    #[error("Time-stretching error: {0}")]
    TimeStretching(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка WAV-кодирования
    #[error("WAV error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Является ли ошибка нарушением контракта входных данных
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::MismatchedSegmentCount { .. } | Self::InvalidSegmentOrder { .. }
        )
    }
}

/// Тип Result для библиотеки speechbridge-sync
pub type Result<T> = std::result::Result<T, SyncError>;
