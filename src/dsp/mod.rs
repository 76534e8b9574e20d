//! Real-time-safe DSP primitives shared by every synthesis engine: phase
//! accumulator oscillators, biquad and state-variable filters, an ADSR
//! stage machine, and an LFO. None of these allocate, lock, or branch on
//! I/O inside `process()`.

pub mod biquad;
pub mod delay;
pub mod envelope;
pub mod lfo;
pub mod noise;
pub mod onepole;
pub mod oscillator;
pub mod slew;
pub mod svf;

pub use biquad::BiquadResonator;
pub use delay::FractionalDelayLine;
pub use envelope::{AdsrEnvelope, EnvelopeStage};
pub use lfo::{Lfo, LfoWaveform};
pub use noise::Noise;
pub use onepole::OnePole;
pub use oscillator::{PolyBlepOscillator, Waveform};
pub use slew::SlewLimiter;
pub use svf::{FilterType, StateVariableFilter};

/// Convert a semitone offset to a frequency ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2f32.powf(semitones / 12.0)
}

/// MIDI note number to frequency in Hz, A4 (note 69) = 440 Hz.
#[inline]
pub fn midi_note_to_hz(note: f32) -> f32 {
    440.0 * 2f32.powf((note - 69.0) / 12.0)
}

/// Soft clip used at every engine boundary and
/// inside feedback paths that could otherwise diverge.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    if !x.is_finite() {
        return 0.0;
    }
    x.tanh()
}
