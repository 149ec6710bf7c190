//! Основной файл библиотеки speechbridge-sync
//!
//! Библиотека выравнивает синтезированную озвучку переведенных сегментов по временной
//! шкале исходной речи: каждый клип растягивается или сжимается под окно своего
//! сегмента, промежутки тишины сохраняются, а неизбежный дрейф переносится в
//! следующие паузы, чтобы итоговая дорожка совпадала по длительности с видео.
//!
//! ```no_run
//! use speechbridge_sync::audio_format::decode_audio_bytes;
//! use speechbridge_sync::{Segment, SyncConfig, SynthesizedClip, Synchronizer};
//!
//! # fn main() -> speechbridge_sync::Result<()> {
//! let segments = vec![Segment::new(0.5, 2.0, "Hello"), Segment::new(2.4, 4.0, "world")];
//! let mut clips = Vec::new();
//! for path in ["hello.mp3", "world.mp3"] {
//!     let bytes = std::fs::read(path)?;
//!     clips.push(SynthesizedClip::new(decode_audio_bytes(&bytes)?));
//! }
//!
//! let synchronizer = Synchronizer::new(SyncConfig::default())?;
//! let track = synchronizer.align(&segments, &clips, 5.0)?;
//! track.write_wav("dubbed.wav")?;
//! println!("{}", track.report().to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod audio_format;
pub mod audio_processing;
pub mod config;
pub mod error;
pub mod logger;
pub mod provider;
pub mod speech_start;
pub mod stretch;
pub mod synchronizer;
pub mod types;

pub use config::{SpeechStartConfig, SyncConfig, WsolaConfig};
pub use error::{Result, SyncError};
pub use provider::{synthesize_segments, ClipSynthesizer, JsonSegmentFile, SegmentSource};
pub use speech_start::{correct_first_segment, detect_speech_start};
pub use stretch::{TimeStretch, WsolaStretcher};
pub use synchronizer::{align, Synchronizer};
pub use types::{
    AlignedTrack, ClipPlacement, Segment, SilenceGap, SyncReport, SyncWarning, SynthesizedClip,
    WarningKind, Waveform,
};
