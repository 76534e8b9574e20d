//! Full-engine throughput benchmarks.
//!
//! Tests each synthesis core's `process()` under realistic polyphony and
//! buffer-size conditions rather than individual primitives.
//!
//! Performance target: real-time at 48kHz leaves roughly 21us/sample of
//! wall-clock budget per active voice before a host's audio thread misses
//! its deadline; these benchmarks track that margin as voice count grows.
//!
//! Run: `cargo bench --bench engine_perf`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sonance_core::block::{BlockDescriptor, SampleFormat};
use sonance_core::engines::dm::DmEngine;
use sonance_core::engines::fm::FmEngine;
use sonance_core::engines::pm::PmEngine;
use sonance_core::engines::va::VaEngine;
use sonance_core::event::ScheduledEvent;
use sonance_core::InstrumentEngine;

const SAMPLE_RATE: f64 = 48_000.0;

fn stereo_buffers(block_size: usize) -> (Vec<f32>, Vec<f32>) {
    (vec![0.0; block_size], vec![0.0; block_size])
}

fn render_block<E: InstrumentEngine>(
    engine: &mut E,
    left: &mut [f32],
    right: &mut [f32],
    descriptor: &BlockDescriptor,
) {
    let mut left_ch = left;
    let mut right_ch = right;
    let mut channels: [&mut [f32]; 2] = [&mut left_ch, &mut right_ch];
    engine.process(&mut channels, descriptor);
}

/// Benchmark each engine at its own full polyphony ceiling (VA/FM/DM=16,
/// PM=6), block size 256.
fn bench_engines_full_polyphony(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_full_polyphony");
    let block_size = 256;
    let descriptor = BlockDescriptor::new(SAMPLE_RATE, block_size as i32, 2, SampleFormat::Planar);

    group.bench_function("va_16_voices", |b| {
        let mut engine = VaEngine::new();
        engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
        for note in 0..16u8 {
            engine.handle_event(ScheduledEvent::note_on(0, 48 + note, 0.8, 0));
        }
        let (mut left, mut right) = stereo_buffers(block_size);
        b.iter(|| {
            render_block(&mut engine, &mut left, &mut right, &descriptor);
            black_box(left[0]);
            black_box(right[0]);
        });
    });

    group.bench_function("fm_16_voices", |b| {
        let mut engine = FmEngine::new();
        engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
        for note in 0..16u8 {
            engine.handle_event(ScheduledEvent::note_on(0, 48 + note, 0.8, 0));
        }
        let (mut left, mut right) = stereo_buffers(block_size);
        b.iter(|| {
            render_block(&mut engine, &mut left, &mut right, &descriptor);
            black_box(left[0]);
            black_box(right[0]);
        });
    });

    group.bench_function("pm_6_voices", |b| {
        let mut engine = PmEngine::new();
        engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
        for note in 0..6u8 {
            engine.handle_event(ScheduledEvent::note_on(0, 48 + note, 0.8, 0));
        }
        let (mut left, mut right) = stereo_buffers(block_size);
        b.iter(|| {
            render_block(&mut engine, &mut left, &mut right, &descriptor);
            black_box(left[0]);
            black_box(right[0]);
        });
    });

    group.bench_function("dm_16_voices", |b| {
        let mut engine = DmEngine::new();
        engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
        for note in 0..16u8 {
            engine.handle_event(ScheduledEvent::note_on(0, 36 + note, 0.9, 0));
        }
        let (mut left, mut right) = stereo_buffers(block_size);
        b.iter(|| {
            render_block(&mut engine, &mut left, &mut right, &descriptor);
            black_box(left[0]);
            black_box(right[0]);
        });
    });

    group.finish();
}

/// Benchmark VA scaling from one voice to its 16-voice ceiling.
fn bench_va_voice_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("va_voice_scaling");
    let block_size = 256;
    let descriptor = BlockDescriptor::new(SAMPLE_RATE, block_size as i32, 2, SampleFormat::Planar);

    for voices in [1usize, 4, 8, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(voices),
            &voices,
            |b, &voices| {
                let mut engine = VaEngine::new();
                engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
                for note in 0..voices as u8 {
                    engine.handle_event(ScheduledEvent::note_on(0, 48 + note, 0.8, 0));
                }
                let (mut left, mut right) = stereo_buffers(block_size);
                b.iter(|| {
                    render_block(&mut engine, &mut left, &mut right, &descriptor);
                    black_box(left[0]);
                    black_box(right[0]);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark block-size scaling at a fixed mid-size polyphony, matching the
/// buffer sizes a real host plugin shell would actually negotiate.
fn bench_block_size_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_block_size_scaling");

    for block_size in [64usize, 256, 1024] {
        group.bench_with_input(
            BenchmarkId::new("va_8_voices", block_size),
            &block_size,
            |b, &block_size| {
                let descriptor =
                    BlockDescriptor::new(SAMPLE_RATE, block_size as i32, 2, SampleFormat::Planar);
                let mut engine = VaEngine::new();
                engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
                for note in 0..8u8 {
                    engine.handle_event(ScheduledEvent::note_on(0, 48 + note, 0.8, 0));
                }
                let (mut left, mut right) = stereo_buffers(block_size);
                b.iter(|| {
                    render_block(&mut engine, &mut left, &mut right, &descriptor);
                    black_box(left[0]);
                    black_box(right[0]);
                });
            },
        );
    }

    group.finish();
}

/// Worst case for the drum engine: dense per-step triggering forcing
/// continuous voice stealing across all 17 kit voices.
fn bench_dm_dense_pattern(c: &mut Criterion) {
    let block_size = 256;
    let descriptor = BlockDescriptor::new(SAMPLE_RATE, block_size as i32, 2, SampleFormat::Planar);

    c.bench_function("dm_dense_pattern_stress", |b| {
        let mut engine = DmEngine::new();
        engine.prepare(SAMPLE_RATE, block_size as i32).unwrap();
        engine.set_parameter("tempo", 174.0);
        engine.set_parameter("swing", 0.6);
        engine.set_parameter("dillaAmount", 1.0);
        for track in 0..16i32 {
            for step in 0..16i32 {
                let id = format!("track{track}Step{step}");
                engine.set_parameter(&id, 0.9);
            }
        }
        let (mut left, mut right) = stereo_buffers(block_size);
        b.iter(|| {
            render_block(&mut engine, &mut left, &mut right, &descriptor);
            black_box(left[0]);
            black_box(right[0]);
        });
    });
}

criterion_group!(
    engine_perf_benches,
    bench_engines_full_polyphony,
    bench_va_voice_scaling,
    bench_block_size_scaling,
    bench_dm_dense_pattern,
);

criterion_main!(engine_perf_benches);
