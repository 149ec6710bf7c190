//! Бенчмарки выравнивания
//!
//! Запуск: cargo bench --bench align

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use speechbridge_sync::stretch::{TimeStretch, WsolaStretcher};
use speechbridge_sync::{Segment, SyncConfig, SynthesizedClip, Synchronizer, Waveform};

const RATE: u32 = 16000;

fn speech_like(seconds: f64, seed: usize) -> Vec<f32> {
    let frames = (seconds * RATE as f64) as usize;
    let base = 120.0 + (seed % 7) as f32 * 15.0;
    (0..frames)
        .map(|i| {
            let t = i as f32 / RATE as f32;
            let envelope = (std::f32::consts::PI * 3.0 * t).sin().abs();
            ((2.0 * std::f32::consts::PI * base * t).sin() * 0.6
                + (2.0 * std::f32::consts::PI * base * 2.5 * t).sin() * 0.2)
                * envelope
        })
        .collect()
}

fn bench_wsola(c: &mut Criterion) {
    let mut group = c.benchmark_group("wsola");
    let stretcher = WsolaStretcher::default();
    let input = speech_like(2.0, 0);

    for ratio in [0.6_f64, 0.9, 1.25, 1.8] {
        let out_frames = (input.len() as f64 * ratio).round() as usize;
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("mono_2s", ratio), &out_frames, |b, &out| {
            b.iter(|| stretcher.stretch(black_box(&input), 1, RATE, out))
        });
    }

    group.finish();
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");
    group.sample_size(10);

    for count in [10_usize, 50] {
        let segments: Vec<Segment> = (0..count)
            .map(|i| Segment::new(i as f64 * 3.0 + 0.5, i as f64 * 3.0 + 2.5, format!("segment {}", i)))
            .collect();
        let clips: Vec<SynthesizedClip> = (0..count)
            .map(|i| {
                let natural = 1.4 + (i % 5) as f64 * 0.3;
                SynthesizedClip::new(Waveform::mono(speech_like(natural, i), RATE))
            })
            .collect();
        let total = count as f64 * 3.0;

        for parallel in [false, true] {
            let config = SyncConfig {
                sample_rate: RATE,
                channels: 1,
                parallel,
                ..SyncConfig::default()
            };
            let Ok(synchronizer) = Synchronizer::new(config) else {
                continue;
            };
            let name = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(name, count), &count, |b, _| {
                b.iter(|| synchronizer.align(black_box(&segments), black_box(&clips), total))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_wsola, bench_align);
criterion_main!(benches);
