//! # Audio Processing
//!
//! Приведение клипов к формату выходной дорожки и вспомогательные операции
//! над семплами с чередованием каналов.
//!
//! ## Основные возможности
//!
//! - Ресемплинг через **Rubato** (Sinc-интерполяция) с точным числом выходных фреймов
//! - Преобразование количества каналов (моно ↔ стерео и т.д.)
//! - Плавные fade in/out для устранения щелчков на стыках клипов и тишины
//! - Линейная интерполяция длины для очень коротких фрагментов

use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, SyncError};
use crate::types::Waveform;

/// Размер входного блока ресемплера во фреймах
const RESAMPLE_CHUNK: usize = 1024;

/// Приводит волну к заданным частоте дискретизации и количеству каналов.
///
/// При уменьшении количества каналов сначала сводятся каналы, затем выполняется
/// ресемплинг (меньше работы для ресемплера); при увеличении наоборот.
pub fn normalize_format(wave: &Waveform, sample_rate: u32, channels: u16) -> Result<Waveform> {
    if wave.sample_rate == sample_rate && wave.channels == channels {
        return Ok(wave.clone());
    }

    debug!(
        "Normalizing clip format: {} Hz/{} ch -> {} Hz/{} ch",
        wave.sample_rate, wave.channels, sample_rate, channels
    );

    if channels <= wave.channels {
        let remapped = remap_channels(wave, channels);
        resample(&remapped, sample_rate)
    } else {
        let resampled = resample(wave, sample_rate)?;
        Ok(remap_channels(&resampled, channels))
    }
}

/// Преобразует количество каналов.
///
/// - N → 1: среднее по каналам
/// - 1 → N: дублирование
/// - иначе: выходной канал `c` берется из входного канала `c % N`
pub fn remap_channels(wave: &Waveform, channels: u16) -> Waveform {
    let src = wave.channels.max(1) as usize;
    let dst = channels.max(1) as usize;
    if src == dst {
        return wave.clone();
    }

    let frames = wave.frames();
    let mut samples = Vec::with_capacity(frames * dst);

    for frame in wave.samples.chunks_exact(src) {
        if dst == 1 {
            samples.push(frame.iter().sum::<f32>() / src as f32);
        } else if src == 1 {
            samples.extend(std::iter::repeat(frame[0]).take(dst));
        } else {
            samples.extend((0..dst).map(|c| frame[c % src]));
        }
    }

    Waveform {
        samples,
        sample_rate: wave.sample_rate,
        channels: dst as u16,
    }
}

/// Изменяет частоту дискретизации с помощью Rubato.
///
/// Возвращает ровно `round(frames * target_rate / sample_rate)` фреймов:
/// задержка фильтра отбрасывается, хвост добивается нулями при необходимости.
pub fn resample(wave: &Waveform, target_rate: u32) -> Result<Waveform> {
    if wave.sample_rate == target_rate {
        return Ok(wave.clone());
    }
    if wave.sample_rate == 0 || target_rate == 0 {
        return Err(SyncError::TimeStretching(format!(
            "cannot resample {} Hz -> {} Hz",
            wave.sample_rate, target_rate
        )));
    }

    let channels = wave.channels.max(1) as usize;
    let frames = wave.frames();
    if frames == 0 {
        return Ok(Waveform::silence(0, target_rate, wave.channels));
    }

    let ratio = target_rate as f64 / wave.sample_rate as f64;
    let expected = (frames as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, channels)
        .map_err(|e| SyncError::TimeStretching(format!("failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let planar = deinterleave(&wave.samples, channels);
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut pos = 0;
    while frames - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..pos + needed]).collect();
        let processed = resampler
            .process(&chunk[..], None)
            .map_err(|e| SyncError::TimeStretching(format!("resampling failed: {}", e)))?;
        append_planar(&mut output, processed);
        pos += needed;
    }

    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..]).collect();
        let processed = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| SyncError::TimeStretching(format!("resampling failed: {}", e)))?;
        append_planar(&mut output, processed);
    }

    // Выталкиваем хвост фильтра
    let mut flushes = 0;
    while output[0].len() < expected + delay && flushes < 16 {
        let processed = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| SyncError::TimeStretching(format!("resampling failed: {}", e)))?;
        if processed[0].is_empty() {
            break;
        }
        append_planar(&mut output, processed);
        flushes += 1;
    }

    for channel in output.iter_mut() {
        let skip = delay.min(channel.len());
        channel.drain(..skip);
        channel.resize(expected, 0.0);
    }

    Ok(Waveform {
        samples: interleave(&output),
        sample_rate: target_rate,
        channels: wave.channels,
    })
}

/// Растягивает или сжимает волну до `out_frames` линейной интерполяцией.
///
/// Высота тона не сохраняется; используется только для фрагментов,
/// слишком коротких для WSOLA.
pub fn linear_resize(samples: &[f32], channels: usize, out_frames: usize) -> Vec<f32> {
    let channels = channels.max(1);
    let in_frames = samples.len() / channels;
    if out_frames == 0 {
        return Vec::new();
    }
    if in_frames == 0 {
        return vec![0.0; out_frames * channels];
    }
    if in_frames == out_frames {
        return samples[..in_frames * channels].to_vec();
    }

    let step = if out_frames > 1 {
        (in_frames - 1) as f64 / (out_frames - 1) as f64
    } else {
        0.0
    };

    let mut output = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let next = (idx + 1).min(in_frames - 1);
        for c in 0..channels {
            let a = samples[idx * channels + c];
            let b = samples[next * channels + c];
            output.push(a + (b - a) * frac);
        }
    }
    output
}

/// Применяет линейные fade in/out к семплам с чередованием каналов.
///
/// Если fade длиннее половины фрагмента, он уменьшается до четверти длины фрагмента.
pub fn apply_fade(samples: &mut [f32], channels: usize, fade_ms: u32, sample_rate: u32) {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    if frames == 0 || fade_ms == 0 {
        return;
    }

    let mut fade_frames = ((fade_ms as f64 / 1000.0) * sample_rate as f64) as usize;
    if fade_frames * 2 >= frames {
        fade_frames = frames / 4;
    }
    if fade_frames == 0 {
        return;
    }

    for i in 0..fade_frames {
        let fade_in = i as f32 / fade_frames as f32;
        let head = i * channels;
        let tail = (frames - 1 - i) * channels;
        for c in 0..channels {
            samples[head + c] *= fade_in;
            samples[tail + c] *= fade_in;
        }
    }
}

/// Разбивает семплы с чередованием на отдельные каналы
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (c, &s) in frame.iter().enumerate() {
            planar[c].push(s);
        }
    }
    planar
}

/// Собирает отдельные каналы в семплы с чередованием
pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for channel in planar {
            samples.push(channel[i]);
        }
    }
    samples
}

fn append_planar(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (dst, src) in output.iter_mut().zip(processed) {
        dst.extend_from_slice(&src);
    }
}
