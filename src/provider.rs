//! # Providers
//!
//! Узкие интерфейсы внешних сервисов, которыми пользуется оркестратор:
//! распознаватель выдает сегменты, синтезатор озвучивает переведенный текст сегмента.
//! Синхронизатору нужны только их результаты, поэтому интерфейсы описывают
//! возможности, а не конкретных поставщиков.

use std::path::PathBuf;

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};

use crate::error::{Result, SyncError};
use crate::types::{Segment, SynthesizedClip};

/// Источник сегментов исходной речи (распознаватель, кэш, файл)
#[async_trait::async_trait]
pub trait SegmentSource: Send + Sync {
    /// Сегменты в порядке следования
    async fn segments(&self) -> Result<Vec<Segment>>;
}

/// Синтезатор речи для одного сегмента
#[async_trait::async_trait]
pub trait ClipSynthesizer: Send + Sync {
    /// Озвучивает `text`, переведенный текст сегмента `segment`
    async fn synthesize(&self, segment: &Segment, text: &str) -> Result<SynthesizedClip>;
}

#[async_trait::async_trait]
impl SegmentSource for Vec<Segment> {
    async fn segments(&self) -> Result<Vec<Segment>> {
        Ok(self.clone())
    }
}

/// Сегменты из JSON-файла вида `[{"start": 0.0, "end": 1.2, "text": "..."}]`
#[derive(Debug, Clone)]
pub struct JsonSegmentFile {
    path: PathBuf,
}

impl JsonSegmentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SegmentSource for JsonSegmentFile {
    async fn segments(&self) -> Result<Vec<Segment>> {
        let data = tokio::fs::read_to_string(&self.path).await?;
        let segments: Vec<Segment> = serde_json::from_str(&data)?;
        debug!(
            "Loaded {} segments from {}",
            segments.len(),
            self.path.display()
        );
        Ok(segments)
    }
}

/// Озвучивает все сегменты, выполняя не более `concurrency` запросов одновременно.
///
/// Клипы возвращаются в порядке сегментов, поэтому `clips[i]` всегда соответствует
/// `segments[i]`. Первая ошибка синтеза прерывает работу.
pub async fn synthesize_segments(
    synthesizer: &dyn ClipSynthesizer,
    segments: &[Segment],
    texts: &[String],
    concurrency: usize,
) -> Result<Vec<SynthesizedClip>> {
    if segments.len() != texts.len() {
        return Err(SyncError::Configuration(format!(
            "got {} texts for {} segments",
            texts.len(),
            segments.len()
        )));
    }

    info!(
        "Synthesizing {} segments (concurrency {})",
        segments.len(),
        concurrency.max(1)
    );

    stream::iter(segments.iter().zip(texts.iter()))
        .map(|(segment, text)| synthesizer.synthesize(segment, text))
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Waveform;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Синтезатор, выдающий тишину длиной в 10 семплов на символ
    struct SilentSynth {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ClipSynthesizer for SilentSynth {
        async fn synthesize(&self, segment: &Segment, text: &str) -> Result<SynthesizedClip> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Первые сегменты отвечают дольше, чтобы проверить сохранение порядка
            let delay = (10.0 - segment.start).max(0.0) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(SynthesizedClip::new(Waveform::silence(text.len() * 10, 1000, 1)))
        }
    }

    struct FailingSynth;

    #[async_trait::async_trait]
    impl ClipSynthesizer for FailingSynth {
        async fn synthesize(&self, segment: &Segment, _text: &str) -> Result<SynthesizedClip> {
            Err(SyncError::AudioProcessing(format!(
                "provider rejected segment at {:.1}s",
                segment.start
            )))
        }
    }

    fn segments() -> Vec<Segment> {
        (0..6)
            .map(|i| Segment::new(i as f64, i as f64 + 0.5, format!("segment {}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_synthesize_keeps_order() {
        let synth = SilentSynth {
            calls: AtomicUsize::new(0),
        };
        let segments = segments();
        let texts: Vec<String> = (0..6).map(|i| "x".repeat(i + 1)).collect();

        let clips = synthesize_segments(&synth, &segments, &texts, 3).await.unwrap();

        assert_eq!(clips.len(), 6);
        for (i, clip) in clips.iter().enumerate() {
            assert_eq!(clip.audio.frames(), (i + 1) * 10);
        }
        assert_eq!(synth.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_synthesize_rejects_mismatched_texts() {
        let synth = SilentSynth {
            calls: AtomicUsize::new(0),
        };
        let result = synthesize_segments(&synth, &segments(), &["one".to_string()], 2).await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_synthesize_propagates_errors() {
        let texts = vec!["a".to_string(); 6];
        let result = synthesize_segments(&FailingSynth, &segments(), &texts, 0).await;
        assert!(matches!(result, Err(SyncError::AudioProcessing(_))));
    }

    #[test]
    fn test_vec_segment_source() {
        let source = segments();
        let loaded = tokio_test::block_on(source.segments()).unwrap();
        assert_eq!(loaded, source);
    }

    #[tokio::test]
    async fn test_json_segment_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.json");
        std::fs::write(
            &path,
            r#"[{"start": 0.5, "end": 1.5, "text": "hello"}, {"start": 2.0, "end": 3.0}]"#,
        )
        .unwrap();

        let segments = JsonSegmentFile::new(&path).segments().await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello");
        assert_eq!(segments[1].text, "");

        let missing = JsonSegmentFile::new(dir.path().join("missing.json"));
        assert!(matches!(missing.segments().await, Err(SyncError::Io(_))));
    }
}
