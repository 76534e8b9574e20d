//! One playable string: a [`WaveguideString`] driven by an [`Exciter`],
//! plus the shared voice-slot bookkeeping and anti-click steal crossfade
//! every engine's voice carries.

use super::exciter::{Articulation, Exciter};
use super::string::WaveguideString;
use crate::dsp::{midi_note_to_hz, OnePole};
use crate::voice::{STEAL_CROSSFADE_MS, VoiceSlotState};

#[derive(Debug, Clone, Copy)]
pub struct PmVoiceParams {
    pub damping: f32,
    pub stiffness: f32,
    pub brightness: f32,
    pub dispersion: f32,
    pub nonlinearity: f32,
    pub pick_position: f32,
    pub bow_pressure: f32,
    pub attack_velocity_scale: f32,
    pub articulation: Articulation,
    pub pitch_bend_range: f32,
}

pub struct PmVoice {
    pub state: VoiceSlotState,
    string: WaveguideString,
    exciter: Exciter,
    steal_fade: OnePole,
    sample_rate: f64,
}

impl PmVoice {
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        let mut steal_fade = OnePole::new(sample_rate as f32);
        steal_fade.set_cutoff(1000.0 / STEAL_CROSSFADE_MS.max(1.0));
        steal_fade.reset(1.0);
        Self {
            state: VoiceSlotState::default(),
            string: WaveguideString::new(sample_rate, 20.0),
            exciter: Exciter::new(sample_rate as f32, seed),
            steal_fade,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.string.set_sample_rate(sample_rate);
        self.exciter.set_sample_rate(sample_rate as f32);
        self.steal_fade = OnePole::new(sample_rate as f32);
        self.steal_fade.set_cutoff(1000.0 / STEAL_CROSSFADE_MS.max(1.0));
        self.steal_fade.reset(1.0);
    }

    pub fn amplitude_linear(&self) -> f32 {
        self.string.last_output().abs()
    }

    pub fn trigger(&mut self, midi_note: u8, velocity: f32, articulation: Articulation) {
        self.state.trigger(midi_note, velocity);
        self.steal_fade.reset(0.0);
        self.string.set_frequency(midi_note_to_hz(midi_note as f32) as f64);
        self.exciter.trigger(articulation);
    }

    pub fn begin_release(&mut self) {
        self.state.begin_release();
        self.exciter.release();
    }

    pub fn force_idle(&mut self) {
        self.state.deactivate();
        self.string.clear();
        self.exciter.force_idle();
    }

    fn is_ringing(&self) -> bool {
        self.exciter.is_active() || self.string.last_output().abs() > crate::voice::silence_threshold_linear()
    }

    /// Render one sample of this string's own output (dry, pre-bridge).
    /// Callers are expected to sum this across voices, feed a fraction
    /// into the shared bridge accumulator, and mix the body/sympathetic
    /// return back in.
    pub fn process_sample(&mut self, p: &PmVoiceParams, pitch_wheel: f32) -> f32 {
        self.state.tick(1);
        if !self.state.active {
            return 0.0;
        }

        let bend_semitones = pitch_wheel * p.pitch_bend_range;
        let frequency_hz = (midi_note_to_hz(self.state.midi_note as f32) as f64) * 2f64.powf(bend_semitones as f64 / 12.0);
        self.string.set_frequency(frequency_hz);

        let velocity = self.state.velocity * p.attack_velocity_scale;
        let excitation = self.exciter.process(velocity, p.bow_pressure, p.brightness, frequency_hz as f32);

        let output = self.string.process(
            excitation,
            p.pick_position,
            p.damping,
            p.stiffness,
            p.brightness,
            p.dispersion,
            p.nonlinearity,
        );

        let fade = self.steal_fade.process(1.0);
        let output = output * fade;

        if self.state.releasing && !self.is_ringing() {
            self.state.deactivate();
        }

        output
    }
}

/// A sympathetic string: never excited directly, only driven by the
/// shared bridge accumulator. Tracks
/// whatever frequency it is last told to, with no envelope of its own —
/// it rings for as long as bridge energy and its own loop feedback sustain
/// it.
pub struct SympatheticString {
    string: WaveguideString,
}

impl SympatheticString {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            string: WaveguideString::new(sample_rate, 20.0),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.string.set_sample_rate(sample_rate);
    }

    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.string.set_frequency(frequency_hz);
    }

    pub fn clear(&mut self) {
        self.string.clear();
    }

    pub fn process(&mut self, bridge_input: f32, damping: f32, brightness: f32) -> f32 {
        self.string.process(bridge_input, 0.5, damping, 0.2, brightness, 0.1, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggered_voice_produces_sound_then_returns_to_idle() {
        let mut voice = PmVoice::new(48000.0, 1);
        let params = PmVoiceParams {
            damping: 0.9,
            stiffness: 0.3,
            brightness: 0.5,
            dispersion: 0.2,
            nonlinearity: 0.1,
            pick_position: 0.2,
            bow_pressure: 0.0,
            attack_velocity_scale: 1.0,
            articulation: Articulation::Pluck,
            pitch_bend_range: 2.0,
        };
        voice.trigger(57, 0.9, Articulation::Pluck);
        let mut peak = 0.0f32;
        for i in 0..(48000 * 3) {
            let y = voice.process_sample(&params, 0.0);
            peak = peak.max(y.abs());
            if i == 2400 {
                voice.begin_release();
            }
        }
        assert!(peak > 0.0);
        assert!(!voice.state.active, "voice should have fully decayed and deactivated within 3s");
    }
}
