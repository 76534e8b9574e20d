//! Core DSP primitive benchmarks.
//!
//! Tests the building blocks in isolation (oscillators, filters, envelopes,
//! noise) in each module's `dsp/` source. These are the fastest benchmarks
//! and the ones to run most often while touching a primitive.
//!
//! Run: `cargo bench --bench dsp_primitives`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sonance_core::dsp::{
    AdsrEnvelope, BiquadResonator, FilterType, Lfo, LfoWaveform, Noise, OnePole,
    PolyBlepOscillator, StateVariableFilter, Waveform,
};

/// Performance target @ 48kHz: < 30ns/sample for sine, < 60ns for the
/// band-limited waveforms (PolyBLEP correction adds branches per edge).
fn bench_oscillator_waveforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("oscillator_waveforms");

    for waveform in [
        Waveform::Sine,
        Waveform::Saw,
        Waveform::Square,
        Waveform::Triangle,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", waveform)),
            &waveform,
            |b, &waveform| {
                let mut osc = PolyBlepOscillator::new(48000.0);
                osc.set_waveform(waveform);
                osc.set_frequency(220.0);
                b.iter(|| black_box(osc.process()));
            },
        );
    }

    group.finish();
}

fn bench_svf_filter_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("svf_filter_types");

    for filter_type in [
        FilterType::Lowpass,
        FilterType::Highpass,
        FilterType::Bandpass,
        FilterType::Notch,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", filter_type)),
            &filter_type,
            |b, &filter_type| {
                let mut filter = StateVariableFilter::new(48000.0);
                filter.set_filter_type(filter_type);
                filter.set_cutoff(1200.0);
                filter.set_resonance(0.5);
                b.iter(|| black_box(filter.process(black_box(0.5))));
            },
        );
    }

    group.finish();
}

fn bench_biquad_resonator(c: &mut Criterion) {
    let mut resonator = BiquadResonator::new(48000.0, 800.0, 4.0, 1.0);
    c.bench_function("biquad_resonator_process", |b| {
        b.iter(|| black_box(resonator.process(black_box(0.5))));
    });
}

fn bench_onepole(c: &mut Criterion) {
    let mut filter = OnePole::new(48000.0);
    filter.set_cutoff(400.0);
    c.bench_function("onepole_process", |b| {
        b.iter(|| black_box(filter.process(black_box(0.5))));
    });
}

fn bench_adsr_envelope(c: &mut Criterion) {
    let mut env = AdsrEnvelope::new(48000.0);
    env.set_attack(0.01);
    env.set_decay(0.1);
    env.set_sustain(0.7);
    env.set_release(0.2);
    env.note_on();

    c.bench_function("adsr_envelope_process", |b| {
        b.iter(|| black_box(env.process()));
    });
}

fn bench_lfo(c: &mut Criterion) {
    let mut group = c.benchmark_group("lfo_waveforms");

    for waveform in [
        LfoWaveform::Sine,
        LfoWaveform::Triangle,
        LfoWaveform::SampleAndHold,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", waveform)),
            &waveform,
            |b, &waveform| {
                let mut lfo = Lfo::new(48000.0, 11);
                lfo.set_waveform(waveform);
                lfo.set_rate(5.0);
                b.iter(|| black_box(lfo.process()));
            },
        );
    }

    group.finish();
}

fn bench_noise(c: &mut Criterion) {
    let mut noise = Noise::new(1);
    c.bench_function("noise_next", |b| {
        b.iter(|| black_box(noise.next()));
    });
}

criterion_group!(
    dsp_primitives_benches,
    bench_oscillator_waveforms,
    bench_svf_filter_types,
    bench_biquad_resonator,
    bench_onepole,
    bench_adsr_envelope,
    bench_lfo,
    bench_noise,
);

criterion_main!(dsp_primitives_benches);
