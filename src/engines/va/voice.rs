//! A single VA voice: two oscillators, sub-oscillator, noise, SVF, two
//! envelopes, two LFOs, and the per-sample modulation-matrix evaluation
//! that drives all of them.
//!
//! Per-sample `process()` shape is oscillators -> filter -> envelope ->
//! output, with an anti-click crossfade on steal/retrigger.

use crate::dsp::{
    midi_note_to_hz, semitones_to_ratio, soft_clip, AdsrEnvelope, FilterType, Lfo, LfoWaveform, Noise,
    OnePole, PolyBlepOscillator, SlewLimiter, StateVariableFilter, Waveform,
};
use crate::voice::VoiceSlotState;

use super::modmatrix::{ModDestination, ModSlot, ModSource};

/// Accumulated modulation-matrix contribution per destination for the
/// current sample, reset and refilled every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModAccumulator {
    pub osc1_pitch: f32,
    pub osc1_warp: f32,
    pub osc1_pulse_width: f32,
    pub osc1_level: f32,
    pub osc2_pitch: f32,
    pub osc2_warp: f32,
    pub osc2_pulse_width: f32,
    pub osc2_level: f32,
    pub sub_level: f32,
    pub noise_level: f32,
    pub filter_cutoff: f32,
    pub filter_resonance: f32,
    pub filter_env_amount: f32,
    pub amp_attack: f32,
    pub amp_decay: f32,
    pub amp_sustain: f32,
    pub amp_release: f32,
    pub lfo1_rate: f32,
    pub lfo1_depth: f32,
    pub lfo2_rate: f32,
    pub lfo2_depth: f32,
}

impl ModAccumulator {
    pub fn add(&mut self, dest: ModDestination, amount: f32) {
        let field = match dest {
            ModDestination::Osc1Pitch => &mut self.osc1_pitch,
            ModDestination::Osc1Warp => &mut self.osc1_warp,
            ModDestination::Osc1PulseWidth => &mut self.osc1_pulse_width,
            ModDestination::Osc1Level => &mut self.osc1_level,
            ModDestination::Osc2Pitch => &mut self.osc2_pitch,
            ModDestination::Osc2Warp => &mut self.osc2_warp,
            ModDestination::Osc2PulseWidth => &mut self.osc2_pulse_width,
            ModDestination::Osc2Level => &mut self.osc2_level,
            ModDestination::SubLevel => &mut self.sub_level,
            ModDestination::NoiseLevel => &mut self.noise_level,
            ModDestination::FilterCutoff => &mut self.filter_cutoff,
            ModDestination::FilterResonance => &mut self.filter_resonance,
            ModDestination::FilterEnvAmount => &mut self.filter_env_amount,
            ModDestination::AmpAttack => &mut self.amp_attack,
            ModDestination::AmpDecay => &mut self.amp_decay,
            ModDestination::AmpSustain => &mut self.amp_sustain,
            ModDestination::AmpRelease => &mut self.amp_release,
            ModDestination::Lfo1Rate => &mut self.lfo1_rate,
            ModDestination::Lfo1Depth => &mut self.lfo1_depth,
            ModDestination::Lfo2Rate => &mut self.lfo2_rate,
            ModDestination::Lfo2Depth => &mut self.lfo2_depth,
        };
        *field += amount;
    }
}

/// Base (unmodulated) parameters a voice reads once per block from the
/// engine's [`crate::param::ParameterStore`], after macro offsets have
/// already been folded in.
#[derive(Debug, Clone, Copy)]
pub struct VaVoiceParams {
    pub osc1_waveform: Waveform,
    pub osc1_shape: f32,
    pub osc1_warp: f32,
    pub osc1_pulse_width: f32,
    pub osc1_detune: f32,
    pub osc1_level: f32,
    pub osc1_pan: f32,
    pub osc2_waveform: Waveform,
    pub osc2_shape: f32,
    pub osc2_warp: f32,
    pub osc2_pulse_width: f32,
    pub osc2_detune: f32,
    pub osc2_level: f32,
    pub osc2_pan: f32,
    pub sub_enabled: bool,
    pub sub_level: f32,
    pub noise_level: f32,
    pub filter_type: FilterType,
    pub filter_cutoff: f32,
    pub filter_resonance: f32,
    pub filter_env_amount: f32,
    pub filter_key_track: f32,
    pub filter_vel_track: f32,
    pub filter_env_attack: f32,
    pub filter_env_decay: f32,
    pub filter_env_sustain: f32,
    pub filter_env_release: f32,
    pub amp_env_attack: f32,
    pub amp_env_decay: f32,
    pub amp_env_sustain: f32,
    pub amp_env_release: f32,
    pub lfo1_waveform: LfoWaveform,
    pub lfo1_rate: f32,
    pub lfo1_depth: f32,
    pub lfo1_bipolar: bool,
    pub lfo2_waveform: LfoWaveform,
    pub lfo2_rate: f32,
    pub lfo2_depth: f32,
    pub lfo2_bipolar: bool,
    pub fm_enabled: bool,
    pub fm_carrier_osc: f32,
    pub fm_depth: f32,
    pub fm_modulator_ratio: f32,
}

pub struct VaVoice {
    pub state: VoiceSlotState,
    osc1: PolyBlepOscillator,
    osc2: PolyBlepOscillator,
    sub_osc: PolyBlepOscillator,
    noise: Noise,
    filter: StateVariableFilter,
    amp_env: AdsrEnvelope,
    filter_env: AdsrEnvelope,
    lfo1: Lfo,
    lfo2: Lfo,
    glide: SlewLimiter,
    /// Anti-click ramp applied to the previous note's tail when this slot
    /// is stolen.
    steal_fade: OnePole,
    aftertouch: f32,
    sample_rate: f32,
}

impl VaVoice {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        let mut steal_fade = OnePole::new(sample_rate);
        steal_fade.set_cutoff(1000.0 / crate::voice::STEAL_CROSSFADE_MS.max(1.0));
        steal_fade.reset(1.0);
        Self {
            state: VoiceSlotState::default(),
            osc1: PolyBlepOscillator::new(sample_rate),
            osc2: PolyBlepOscillator::new(sample_rate),
            sub_osc: PolyBlepOscillator::new(sample_rate),
            noise: Noise::new(seed),
            filter: StateVariableFilter::new(sample_rate),
            amp_env: AdsrEnvelope::new(sample_rate),
            filter_env: AdsrEnvelope::new(sample_rate),
            lfo1: Lfo::new(sample_rate, seed ^ 0x9E37_79B9),
            lfo2: Lfo::new(sample_rate, seed ^ 0x85EB_CA6B),
            glide: SlewLimiter::new(sample_rate),
            steal_fade,
            aftertouch: 0.0,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.osc1.set_sample_rate(sample_rate);
        self.osc2.set_sample_rate(sample_rate);
        self.sub_osc.set_sample_rate(sample_rate);
        self.filter.set_sample_rate(sample_rate);
        self.amp_env.set_sample_rate(sample_rate);
        self.filter_env.set_sample_rate(sample_rate);
        self.lfo1.set_sample_rate(sample_rate);
        self.lfo2.set_sample_rate(sample_rate);
        self.glide = SlewLimiter::new(sample_rate);
        self.steal_fade = OnePole::new(sample_rate);
        self.steal_fade.reset(1.0);
    }

    pub fn is_silent_tail(&self) -> bool {
        self.state.releasing && self.amp_env.level() < crate::voice::silence_threshold_linear()
    }

    pub fn amplitude_linear(&self) -> f32 {
        self.amp_env.level()
    }

    /// Begin a new note. If this slot was already active (steal, retrigger)
    /// the crossfade ramp restarts so the old tail fades rather than clicks.
    pub fn trigger(&mut self, midi_note: u8, velocity: f32, glide_from: Option<f32>, retrigger_envelopes: bool) {
        self.state.trigger(midi_note, velocity);
        self.steal_fade.reset(0.0);
        let target_note = midi_note as f32;
        match glide_from {
            Some(from_note) => {
                self.glide.snap_to(from_note);
                self.glide.set_target(target_note);
            }
            None => self.glide.snap_to(target_note),
        }
        if retrigger_envelopes {
            self.amp_env.note_on();
            self.filter_env.note_on();
        }
    }

    pub fn begin_release(&mut self) {
        self.state.begin_release();
        self.amp_env.note_off();
        self.filter_env.note_off();
    }

    pub fn force_idle(&mut self) {
        self.state.deactivate();
        self.amp_env.reset();
        self.filter_env.reset();
        self.lfo1.reset();
        self.lfo2.reset();
        self.filter.reset();
        self.osc1.reset();
        self.osc2.reset();
        self.sub_osc.reset();
    }

    pub fn set_aftertouch(&mut self, value: f32) {
        self.aftertouch = value.clamp(0.0, 1.0);
    }

    pub fn set_glide_time(&mut self, seconds: f32) {
        self.glide.set_time(seconds);
    }

    /// Render one sample. `pitch_wheel`/`mod_wheel`/`macros` are shared,
    /// engine-level modulation sources; `mod_slots` is the shared 16-slot
    /// routing table.
    #[allow(clippy::too_many_arguments)]
    pub fn process_sample(
        &mut self,
        p: &VaVoiceParams,
        mod_slots: &[ModSlot],
        pitch_wheel: f32,
        mod_wheel: f32,
        macro_values: [f32; 8],
        master_tune_semitones: f32,
    ) -> (f32, f32) {
        if !self.state.active {
            return (0.0, 0.0);
        }

        // Modulation sources evaluated once per sample; `FilterEnv`/`AmpEnv`
        // use the *previous* sample's level so the matrix and the envelope
        // advance in the same order every call (deterministic).
        let lfo1_value = self.lfo1.process();
        let lfo2_value = self.lfo2.process();
        let filter_env_value = self.filter_env.level();
        let amp_env_value = self.amp_env.level();
        let velocity = self.state.velocity * 2.0 - 1.0;

        let mut acc = ModAccumulator::default();
        for slot in mod_slots {
            let Some(source) = slot.source else { continue };
            let source_value = match source {
                ModSource::Lfo1 => lfo1_value,
                ModSource::Lfo2 => lfo2_value,
                ModSource::FilterEnv => filter_env_value * 2.0 - 1.0,
                ModSource::AmpEnv => amp_env_value * 2.0 - 1.0,
                ModSource::Velocity => velocity,
                ModSource::Aftertouch => self.aftertouch * 2.0 - 1.0,
                ModSource::PitchWheel => pitch_wheel,
                ModSource::ModWheel => mod_wheel * 2.0 - 1.0,
                ModSource::Macro1 => macro_values[0] * 2.0 - 1.0,
                ModSource::Macro2 => macro_values[1] * 2.0 - 1.0,
                ModSource::Macro3 => macro_values[2] * 2.0 - 1.0,
                ModSource::Macro4 => macro_values[3] * 2.0 - 1.0,
                ModSource::Macro5 => macro_values[4] * 2.0 - 1.0,
                ModSource::Macro6 => macro_values[5] * 2.0 - 1.0,
                ModSource::Macro7 => macro_values[6] * 2.0 - 1.0,
                ModSource::Macro8 => macro_values[7] * 2.0 - 1.0,
            };
            if let Some((dest, amount)) = slot.evaluate(source_value) {
                acc.add(dest, amount);
            }
        }

        // LFO rate/depth modulation applies to the *next* sample's LFO.
        self.lfo1.set_waveform(p.lfo1_waveform);
        self.lfo1.set_bipolar(p.lfo1_bipolar);
        self.lfo1.set_rate((p.lfo1_rate + acc.lfo1_rate).clamp(0.01, 20.0));
        self.lfo1.set_depth((p.lfo1_depth + acc.lfo1_depth).clamp(0.0, 1.0));
        self.lfo2.set_waveform(p.lfo2_waveform);
        self.lfo2.set_bipolar(p.lfo2_bipolar);
        self.lfo2.set_rate((p.lfo2_rate + acc.lfo2_rate).clamp(0.01, 20.0));
        self.lfo2.set_depth((p.lfo2_depth + acc.lfo2_depth).clamp(0.0, 1.0));

        self.amp_env.set_attack((p.amp_env_attack * (1.0 + acc.amp_attack)).max(0.0001));
        self.amp_env.set_decay((p.amp_env_decay * (1.0 + acc.amp_decay)).max(0.0001));
        self.amp_env.set_sustain(p.amp_env_sustain + acc.amp_sustain);
        self.amp_env.set_release((p.amp_env_release * (1.0 + acc.amp_release)).max(0.0001));
        self.filter_env.set_attack(p.filter_env_attack);
        self.filter_env.set_decay(p.filter_env_decay);
        self.filter_env.set_sustain(p.filter_env_sustain);
        self.filter_env.set_release(p.filter_env_release);

        let glide_note = self.glide.process();
        let base_note = glide_note + master_tune_semitones;

        self.osc1
            .set_waveform(p.osc1_waveform);
        self.osc1.set_shape(p.osc1_shape);
        self.osc1.set_pulse_width((p.osc1_pulse_width + acc.osc1_pulse_width).clamp(0.01, 0.99));
        self.osc1.set_warp((p.osc1_warp + acc.osc1_warp).clamp(-1.0, 1.0));
        self.osc1
            .set_frequency(midi_note_to_hz(base_note + p.osc1_detune + acc.osc1_pitch));

        self.osc2.set_waveform(p.osc2_waveform);
        self.osc2.set_shape(p.osc2_shape);
        self.osc2.set_pulse_width((p.osc2_pulse_width + acc.osc2_pulse_width).clamp(0.01, 0.99));
        self.osc2.set_warp((p.osc2_warp + acc.osc2_warp).clamp(-1.0, 1.0));
        self.osc2
            .set_frequency(midi_note_to_hz(base_note + p.osc2_detune + acc.osc2_pitch));

        self.sub_osc.set_waveform(Waveform::Square);
        self.sub_osc.set_frequency(midi_note_to_hz(base_note - 12.0));

        let (osc1_sample, osc2_sample) = if p.fm_enabled {
            // single-sided linear FM: the carrier's phase is
            // offset by depth x modulator sample each sample.
            let modulator_freq = midi_note_to_hz(base_note) * p.fm_modulator_ratio;
            if p.fm_carrier_osc < 0.5 {
                self.osc2.set_frequency(modulator_freq);
                let modulator = self.osc2.process();
                let carrier = self.osc1.process_modulated(p.fm_depth * modulator);
                (carrier, modulator)
            } else {
                self.osc1.set_frequency(modulator_freq);
                let modulator = self.osc1.process();
                let carrier = self.osc2.process_modulated(p.fm_depth * modulator);
                (modulator, carrier)
            }
        } else {
            (self.osc1.process(), self.osc2.process())
        };

        let sub_sample = if p.sub_enabled { self.sub_osc.process() } else { 0.0 };
        let noise_sample = self.noise.next();

        let osc1_level = (p.osc1_level + acc.osc1_level).clamp(0.0, 1.0);
        let osc2_level = (p.osc2_level + acc.osc2_level).clamp(0.0, 1.0);
        let sub_level = (p.sub_level + acc.sub_level).clamp(0.0, 1.0);
        let noise_level = (p.noise_level + acc.noise_level).clamp(0.0, 1.0);

        let mix = osc1_sample * osc1_level
            + osc2_sample * osc2_level
            + sub_sample * sub_level
            + noise_sample * noise_level;

        let filter_env_out = self.filter_env.process();
        let key_track_semitones = p.filter_key_track * (base_note - 60.0);
        let vel_track_semitones = p.filter_vel_track * (self.state.velocity - 0.5) * 24.0;
        let env_amount = (p.filter_env_amount + acc.filter_env_amount).clamp(-1.0, 1.0);
        let env_semitones = env_amount * filter_env_out * 48.0;
        let cutoff_semitones = acc.filter_cutoff + key_track_semitones + vel_track_semitones + env_semitones;

        self.filter.set_filter_type(p.filter_type);
        self.filter
            .set_cutoff(p.filter_cutoff * semitones_to_ratio(cutoff_semitones));
        self.filter
            .set_resonance((p.filter_resonance + acc.filter_resonance).clamp(0.0, 0.99));

        let filtered = self.filter.process(mix);

        let amp_out = self.amp_env.process();
        let fade = self.steal_fade.process(1.0);
        let sample = soft_clip(filtered) * amp_out * self.state.velocity.max(0.05) * fade;

        self.state.tick(1);
        if self.state.releasing && !self.amp_env.is_active() {
            self.force_idle();
        }

        let pan = if osc1_level + osc2_level > 1e-6 {
            (p.osc1_pan * osc1_level + p.osc2_pan * osc2_level) / (osc1_level + osc2_level)
        } else {
            0.0
        };
        // Constant-power pan law.
        let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
        (sample * angle.cos(), sample * angle.sin())
    }
}
