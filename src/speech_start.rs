//! # Speech Start Detection
//!
//! Распознаватель нередко ставит начало первого сегмента внутрь ведущей тишины
//! (заставка, пауза перед речью). Модуль находит, где в исходной дорожке
//! действительно начинается речь, и сдвигает первый сегмент, если он стоит
//! заметно раньше. Коррекция выполняется по желанию вызывающего, до `align`.

use log::{debug, info};

use crate::audio_format::{compute_rms, duration_in_seconds};
use crate::config::SpeechStartConfig;
use crate::error::Result;
use crate::types::{Segment, Waveform};

/// Длина окна анализа RMS в миллисекундах
const ANALYSIS_WINDOW_MS: f64 = 10.0;

/// Возвращает время (в секундах), когда заканчивается ведущая тишина.
///
/// Тишиной считаются окна с RMS ниже `threshold_db` dBFS. Если ведущая тишина
/// короче `min_silence` или вся дорожка тихая, возвращается 0.0.
pub fn detect_speech_start(wave: &Waveform, threshold_db: f32, min_silence: f64) -> f64 {
    let frames = wave.frames();
    if frames == 0 || wave.sample_rate == 0 {
        return 0.0;
    }

    let channels = wave.channels.max(1) as usize;
    let window = ((ANALYSIS_WINDOW_MS / 1000.0 * wave.sample_rate as f64) as usize).max(1);
    let threshold = 10f32.powf(threshold_db / 20.0);

    let speech_frame = wave
        .samples
        .chunks(window * channels)
        .position(|chunk| compute_rms(chunk) >= threshold)
        .map(|index| index * window);

    let Some(speech_frame) = speech_frame else {
        debug!("No speech above {} dBFS found", threshold_db);
        return 0.0;
    };

    let start = duration_in_seconds(speech_frame, wave.sample_rate);
    if start < min_silence {
        return 0.0;
    }

    debug!("Detected speech start at {:.2}s", start);
    start
}

/// Сдвигает начало первого сегмента к найденному началу речи.
///
/// Сегмент сдвигается, только если он начинается раньше найденного начала
/// больше чем на `config.tolerance`; новое начало не выходит за его конец.
/// Возвращает новое начало, если сегмент был изменен.
pub fn correct_first_segment(
    segments: &mut [Segment],
    original: &Waveform,
    config: &SpeechStartConfig,
) -> Result<Option<f64>> {
    config.validate()?;

    let Some(first) = segments.first_mut() else {
        return Ok(None);
    };

    let detected = detect_speech_start(original, config.threshold_db, config.min_silence);
    if first.start >= detected - config.tolerance {
        return Ok(None);
    }

    let new_start = detected.min(first.end);
    info!(
        "Detected silence at start: {:.2}s (first segment starts at {:.2}s)",
        detected, first.start
    );
    first.start = new_start;
    Ok(Some(new_start))
}
