//! One drum hit: a pitched/decaying sine (or a small bank of inharmonic
//! partials for bell-like kinds) plus a filtered-noise layer and a short
//! click transient, each with its own exponential envelope.
//!
//! Grounded on `dsp/onepole.rs`'s exponential-coefficient style (a target
//! time constant turned into a per-sample multiplier once, not recomputed
//! every sample) and `dsp/svf.rs` for the noise-shaping filter.

use crate::dsp::Noise;
use crate::dsp::StateVariableFilter;
use super::kit::{voice_spec, VoiceKind, VoiceSpec};
use super::params::VoiceModifiers;

fn decay_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = (time_ms.max(1.0) * 0.001 * sample_rate).max(1.0);
    // -6.91 = ln(0.001): the envelope reaches -60 dB after `time_ms`.
    (-6.91_f32 / samples).exp()
}

pub struct DrumVoice {
    kind: Option<VoiceKind>,
    active: bool,
    pub age_samples: u64,
    phase: f32,
    freq_hz: f32,
    pitch_env: f32,
    pitch_decay_coeff: f32,
    pitch_sweep_span: f32,
    amp_env: f32,
    amp_decay_coeff: f32,
    click_env: f32,
    click_decay_coeff: f32,
    noise: Noise,
    filter: StateVariableFilter,
    sample_rate: f32,
    velocity: f32,
    spec: VoiceSpec,
}

impl DrumVoice {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        Self {
            kind: None,
            active: false,
            age_samples: 0,
            phase: 0.0,
            freq_hz: 110.0,
            pitch_env: 0.0,
            pitch_decay_coeff: 0.999,
            pitch_sweep_span: 0.0,
            amp_env: 0.0,
            amp_decay_coeff: 0.999,
            click_env: 0.0,
            click_decay_coeff: 0.9,
            noise: Noise::new(seed),
            filter: StateVariableFilter::new(sample_rate),
            sample_rate,
            velocity: 1.0,
            spec: voice_spec(VoiceKind::Kick),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.filter.set_sample_rate(sample_rate);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn kind(&self) -> Option<VoiceKind> {
        self.kind
    }

    pub fn tick_age(&mut self) {
        if self.active {
            self.age_samples = self.age_samples.saturating_add(1);
        }
    }

    pub fn trigger(&mut self, kind: VoiceKind, velocity: f32, modifiers: &VoiceModifiers) {
        let mut spec = voice_spec(kind);
        match kind.family() {
            super::kit::DrumFamily::Kick => {
                spec.base_freq_hz *= modifiers.kick_pitch.clamp(0.25, 4.0);
                spec.amp_decay_ms *= modifiers.kick_decay.clamp(0.1, 4.0);
                spec.click_amount *= modifiers.kick_click.clamp(0.0, 2.0);
            }
            super::kit::DrumFamily::Snare => {
                spec.tonal_amount *= modifiers.snare_tone.clamp(0.0, 2.0);
                spec.click_amount *= 0.5 + modifiers.snare_snap.clamp(0.0, 2.0) * 0.5;
                spec.amp_decay_ms /= 0.5 + modifiers.snare_snap.clamp(0.0, 2.0) * 0.5;
            }
            _ => {}
        }

        self.kind = Some(kind);
        self.active = true;
        self.age_samples = 0;
        self.velocity = velocity.clamp(0.0, 1.0);
        self.phase = 0.0;
        self.freq_hz = spec.base_freq_hz;
        self.pitch_env = 1.0;
        self.pitch_sweep_span = spec.pitch_sweep_ratio - 1.0;
        self.pitch_decay_coeff = decay_coeff(spec.pitch_sweep_ms, self.sample_rate);
        self.amp_env = 1.0;
        self.amp_decay_coeff = decay_coeff(spec.amp_decay_ms, self.sample_rate);
        self.click_env = 1.0;
        self.click_decay_coeff = decay_coeff(6.0, self.sample_rate);
        self.filter.set_filter_type(spec.filter_type);
        self.filter.set_cutoff(spec.filter_cutoff_hz);
        self.filter.set_resonance(spec.filter_resonance);
        self.filter.reset();
        self.spec = spec;
    }

    pub fn force_idle(&mut self) {
        self.active = false;
        self.kind = None;
    }

    fn tonal_sample(&self) -> f32 {
        const TAU: f32 = std::f32::consts::TAU;
        match self.spec.metallic_ratios {
            Some(ratios) => {
                let mut sum = 0.0;
                let mut count = 0.0;
                for ratio in ratios {
                    if ratio > 0.0 {
                        sum += (self.phase * ratio * TAU).sin();
                        count += 1.0;
                    }
                }
                if count > 0.0 {
                    sum / count
                } else {
                    0.0
                }
            }
            None => (self.phase * TAU).sin(),
        }
    }

    pub fn process(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }

        let swept_freq = self.freq_hz * (1.0 + self.pitch_sweep_span * self.pitch_env);
        self.phase += swept_freq / self.sample_rate;
        self.phase -= self.phase.floor();
        self.pitch_env *= self.pitch_decay_coeff;

        let tonal = self.tonal_sample() * self.amp_env * self.spec.tonal_amount;

        let noise_raw = self.noise.next();
        let noise = self.filter.process(noise_raw) * self.amp_env * self.spec.noise_amount;

        let click = self.noise.next() * self.click_env * self.spec.click_amount;
        self.amp_env *= self.amp_decay_coeff;
        self.click_env *= self.click_decay_coeff;

        let out = (tonal + noise + click) * self.velocity;

        if self.amp_env < 1.0e-4 && self.click_env < 1.0e-4 {
            self.active = false;
        }

        if out.is_finite() {
            out
        } else {
            self.active = false;
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_modifiers() -> VoiceModifiers {
        VoiceModifiers {
            kick_pitch: 1.0,
            kick_decay: 1.0,
            kick_click: 1.0,
            snare_tone: 1.0,
            snare_snap: 1.0,
        }
    }

    #[test]
    fn every_kind_produces_a_finite_decaying_hit() {
        for kind in super::super::kit::ALL_KINDS {
            let mut voice = DrumVoice::new(48000.0, 7);
            voice.trigger(kind, 0.9, &default_modifiers());
            let mut peak_early = 0.0f32;
            let mut peak_late = 0.0f32;
            for i in 0..(48000 * 3) {
                let y = voice.process();
                assert!(y.is_finite(), "{:?} produced non-finite output", kind);
                if i < 500 {
                    peak_early = peak_early.max(y.abs());
                }
                if i > 48000 * 2 {
                    peak_late = peak_late.max(y.abs());
                }
            }
            assert!(peak_early > 0.0, "{:?} never sounded", kind);
            assert!(peak_late <= peak_early, "{:?} didn't decay", kind);
        }
    }

    #[test]
    fn idle_voice_produces_silence() {
        let mut voice = DrumVoice::new(48000.0, 1);
        assert_eq!(voice.process(), 0.0);
        assert!(!voice.is_active());
    }

    #[test]
    fn kick_click_modifier_scales_transient() {
        let mut loud = DrumVoice::new(48000.0, 3);
        loud.trigger(
            VoiceKind::Kick,
            1.0,
            &VoiceModifiers { kick_click: 2.0, ..default_modifiers() },
        );
        let mut quiet = DrumVoice::new(48000.0, 3);
        quiet.trigger(
            VoiceKind::Kick,
            1.0,
            &VoiceModifiers { kick_click: 0.1, ..default_modifiers() },
        );
        let loud_peak = (0..32).map(|_| loud.process().abs()).fold(0.0f32, f32::max);
        let quiet_peak = (0..32).map(|_| quiet.process().abs()).fold(0.0f32, f32::max);
        assert!(loud_peak > quiet_peak);
    }
}
