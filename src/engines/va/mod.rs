//! Virtual-Analog engine: two PolyBLEP oscillators, sub-oscillator, noise,
//! state-variable filter, two envelopes, two LFOs, a 16-slot modulation
//! matrix and 8 macros, driving up to 16 voices in Poly/Mono/Legato mode
//! with optional glide.

mod modmatrix;
mod voice;

use crate::block::BlockDescriptor;
use crate::dsp::{FilterType, LfoWaveform, OnePole, Waveform};
use crate::engine::InstrumentEngine;
use crate::error::SonanceError;
use crate::event::{EventKind, EventPayload, EventQueue, ScheduledEvent, CAPACITY as EVENT_CAPACITY};
use crate::param::{ParamRange, ParameterStore};
use crate::preset;
use crate::voice::{choose_steal_target, find_idle, StealCandidate};

use modmatrix::{Macro, ModCurve, ModDestination, ModSlot, ModSource};
use voice::{ModAccumulator, VaVoice, VaVoiceParams};

const MAX_VOICES: usize = 16;
const NUM_MOD_SLOTS: usize = 16;
const NUM_MACROS: usize = 8;
const ENGINE_NAME: &str = "va";
const ENGINE_VERSION: &str = "v1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolyMode {
    Poly,
    Mono,
    Legato,
}

impl PolyMode {
    fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            1 => PolyMode::Mono,
            2 => PolyMode::Legato,
            _ => PolyMode::Poly,
        }
    }

    fn to_param(self) -> f32 {
        match self {
            PolyMode::Poly => 0.0,
            PolyMode::Mono => 1.0,
            PolyMode::Legato => 2.0,
        }
    }
}

fn waveform_from_shape(shape_param: f32) -> (Waveform, f32) {
    let clamped = shape_param.clamp(0.0, 4.999);
    let index = clamped.floor() as i32;
    let blend = clamped - clamped.floor();
    let waveform = match index {
        0 => Waveform::Saw,
        1 => Waveform::Square,
        2 => Waveform::Triangle,
        3 => Waveform::Sine,
        _ => Waveform::Pulse,
    };
    (waveform, blend)
}

fn filter_type_from_param(value: f32) -> FilterType {
    match value.round() as i32 {
        1 => FilterType::Highpass,
        2 => FilterType::Bandpass,
        3 => FilterType::Notch,
        _ => FilterType::Lowpass,
    }
}

fn lfo_waveform_from_param(value: f32) -> LfoWaveform {
    match value.round() as i32 {
        1 => LfoWaveform::Triangle,
        2 => LfoWaveform::Saw,
        3 => LfoWaveform::Square,
        4 => LfoWaveform::SampleAndHold,
        _ => LfoWaveform::Sine,
    }
}

/// Leak a formatted parameter id (`"modSource3"`, `"macroValue7"`, ...)
/// into a `&'static str`. Called only from [`VaEngine::new`] — never from
/// the audio path — so this one-time allocation is fine even though
/// `process` never allocates.
fn leak_id(text: String) -> &'static str {
    Box::leak(text.into_boxed_str())
}

/// Cached parameter ids for one modulation-matrix slot, leaked once at
/// construction so the audio path looks them up instead of formatting a
/// fresh string every block.
#[derive(Clone, Copy)]
struct ModSlotKeys {
    source: &'static str,
    destination: &'static str,
    amount: &'static str,
    bipolar: &'static str,
    curve: &'static str,
}

impl ModSlotKeys {
    fn build(i: usize) -> Self {
        Self {
            source: leak_id(format!("modSource{i}")),
            destination: leak_id(format!("modDestination{i}")),
            amount: leak_id(format!("modAmount{i}")),
            bipolar: leak_id(format!("modBipolar{i}")),
            curve: leak_id(format!("modCurve{i}")),
        }
    }
}

pub struct VaEngine {
    params: ParameterStore,
    voices: Vec<VaVoice>,
    note_stack: Vec<u8>,
    mod_slots: [ModSlot; NUM_MOD_SLOTS],
    mod_slot_keys: [ModSlotKeys; NUM_MOD_SLOTS],
    macro_value_keys: [&'static str; NUM_MACROS],
    macros: [Macro; NUM_MACROS],
    sample_rate: f64,
    block_size: i32,
    prepared: bool,
    pitch_wheel_semitones: f32,
    pitch_bend_range: f32,
    mod_wheel: f32,
    master_tune_smoother: OnePole,
    master_volume_smoother: OnePole,
    event_queue: EventQueue,
    event_scratch: Vec<ScheduledEvent>,
}

impl VaEngine {
    pub fn new() -> Self {
        let mod_slot_keys: [ModSlotKeys; NUM_MOD_SLOTS] = std::array::from_fn(ModSlotKeys::build);
        let macro_value_keys: [&'static str; NUM_MACROS] = std::array::from_fn(|i| leak_id(format!("macroValue{i}")));

        let mut params = ParameterStore::new();
        Self::declare_params(&mut params, &mod_slot_keys, &macro_value_keys);

        let sample_rate = 48000.0;
        let mut voices = Vec::with_capacity(MAX_VOICES);
        for i in 0..MAX_VOICES {
            voices.push(VaVoice::new(sample_rate as f32, 0xA17E_5EED ^ (i as u64).wrapping_mul(0x9E37_79B9)));
        }

        Self {
            params,
            voices,
            note_stack: Vec::with_capacity(MAX_VOICES),
            mod_slots: [ModSlot::default(); NUM_MOD_SLOTS],
            mod_slot_keys,
            macro_value_keys,
            macros: [Macro::default(); NUM_MACROS],
            sample_rate,
            block_size: 512,
            prepared: false,
            pitch_wheel_semitones: 0.0,
            pitch_bend_range: 2.0,
            mod_wheel: 0.0,
            master_tune_smoother: OnePole::new(sample_rate as f32),
            master_volume_smoother: OnePole::new(sample_rate as f32),
            event_queue: EventQueue::new(512),
            event_scratch: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    fn declare_params(
        params: &mut ParameterStore,
        mod_slot_keys: &[ModSlotKeys; NUM_MOD_SLOTS],
        macro_value_keys: &[&'static str; NUM_MACROS],
    ) {
        for prefix in ["osc1", "osc2"] {
            params.declare(leak_id(format!("{prefix}Shape")), ParamRange::new(0.0, 4.999, 0.0));
            params.declare(leak_id(format!("{prefix}Warp")), ParamRange::new(-1.0, 1.0, 0.0));
            params.declare(leak_id(format!("{prefix}PulseWidth")), ParamRange::new(0.01, 0.99, 0.5));
            params.declare(leak_id(format!("{prefix}Detune")), ParamRange::new(-24.0, 24.0, 0.0));
            let default_level = if prefix == "osc1" { 0.8 } else { 0.0 };
            params.declare(leak_id(format!("{prefix}Level")), ParamRange::new(0.0, 1.0, default_level));
            params.declare(leak_id(format!("{prefix}Pan")), ParamRange::new(-1.0, 1.0, 0.0));
        }
        params.declare("subEnabled", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("subLevel", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("noiseLevel", ParamRange::new(0.0, 1.0, 0.0));

        params.declare("filterType", ParamRange::new(0.0, 3.0, 0.0));
        params.declare("filterCutoff", ParamRange::new(20.0, 20000.0, 2000.0));
        params.declare("filterResonance", ParamRange::new(0.0, 0.99, 0.1));
        params.declare("filterEnvAmount", ParamRange::new(-1.0, 1.0, 0.0));
        params.declare("filterKeyTrack", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("filterVelTrack", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("filterEnvAttack", ParamRange::new(0.0001, 10.0, 0.01));
        params.declare("filterEnvDecay", ParamRange::new(0.0001, 10.0, 0.2));
        params.declare("filterEnvSustain", ParamRange::new(0.0, 1.0, 0.5));
        params.declare("filterEnvRelease", ParamRange::new(0.0001, 10.0, 0.3));

        params.declare("ampEnvAttack", ParamRange::new(0.0001, 10.0, 0.005));
        params.declare("ampEnvDecay", ParamRange::new(0.0001, 10.0, 0.15));
        params.declare("ampEnvSustain", ParamRange::new(0.0, 1.0, 0.7));
        params.declare("ampEnvRelease", ParamRange::new(0.0001, 10.0, 0.25));

        for prefix in ["lfo1", "lfo2"] {
            params.declare(leak_id(format!("{prefix}Waveform")), ParamRange::new(0.0, 4.0, 0.0));
            params.declare(leak_id(format!("{prefix}Rate")), ParamRange::new(0.01, 20.0, 2.0));
            params.declare(leak_id(format!("{prefix}Depth")), ParamRange::new(0.0, 1.0, 0.0));
            params.declare(leak_id(format!("{prefix}Bipolar")), ParamRange::new(0.0, 1.0, 1.0));
        }

        params.declare("fmEnabled", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("fmCarrierOsc", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("fmDepth", ParamRange::new(0.0, 2.0, 0.0));
        params.declare("fmModulatorRatio", ParamRange::new(0.25, 8.0, 1.0));

        params.declare("polyMode", ParamRange::new(0.0, 2.0, 0.0));
        params.declare("glideEnabled", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("glideTime", ParamRange::new(0.0, 5.0, 0.05));

        params.declare("masterTune", ParamRange::new(-24.0, 24.0, 0.0));
        params.declare("masterVolume", ParamRange::new(0.0, 1.5, 0.8));
        params.declare("structure", ParamRange::new(0.0, 1.0, 0.0));

        for keys in mod_slot_keys {
            params.declare(keys.source, ParamRange::new(-1.0, 15.0, -1.0));
            params.declare(keys.destination, ParamRange::new(-1.0, 20.0, -1.0));
            params.declare(keys.amount, ParamRange::new(-1.0, 1.0, 0.0));
            params.declare(keys.bipolar, ParamRange::new(0.0, 1.0, 1.0));
            params.declare(keys.curve, ParamRange::new(0.0, 3.0, 0.0));
        }
        for &key in macro_value_keys {
            params.declare(key, ParamRange::new(0.0, 1.0, 0.0));
        }
    }

    fn sync_mod_slots_from_params(&mut self) {
        for i in 0..NUM_MOD_SLOTS {
            let keys = self.mod_slot_keys[i];
            let source = ModSource::from_index(self.params.get(keys.source).round() as i32);
            let destination = ModDestination::from_index(self.params.get(keys.destination).round() as i32);
            self.mod_slots[i] = ModSlot {
                source,
                destination,
                amount: self.params.get(keys.amount),
                bipolar: self.params.get(keys.bipolar) >= 0.5,
                curve: ModCurve::from_index(self.params.get(keys.curve).round() as i32),
            };
        }
        for i in 0..NUM_MACROS {
            self.macros[i].value = self.params.get(self.macro_value_keys[i]);
        }
    }

    fn build_voice_params(&self) -> VaVoiceParams {
        let p = &self.params;
        let mut macro_acc = ModAccumulator::default();
        for m in &self.macros {
            for dest in &m.destinations {
                if let Some((d, amount)) = dest.contribution(m.value) {
                    macro_acc.add(d, amount);
                }
            }
        }

        let (osc1_waveform, osc1_shape) = waveform_from_shape(p.get("osc1Shape"));
        let (osc2_waveform, osc2_shape) = waveform_from_shape(p.get("osc2Shape"));
        let structure = p.get("structure");

        VaVoiceParams {
            osc1_waveform,
            osc1_shape,
            osc1_warp: (p.get("osc1Warp") + macro_acc.osc1_warp).clamp(-1.0, 1.0),
            osc1_pulse_width: (p.get("osc1PulseWidth") + macro_acc.osc1_pulse_width).clamp(0.01, 0.99),
            osc1_detune: p.get("osc1Detune"),
            osc1_level: (p.get("osc1Level") + macro_acc.osc1_level).clamp(0.0, 1.0),
            osc1_pan: p.get("osc1Pan"),
            osc2_waveform,
            osc2_shape,
            osc2_warp: (p.get("osc2Warp") + macro_acc.osc2_warp).clamp(-1.0, 1.0),
            osc2_pulse_width: (p.get("osc2PulseWidth") + macro_acc.osc2_pulse_width).clamp(0.01, 0.99),
            osc2_detune: p.get("osc2Detune") + structure * 0.15,
            osc2_level: (p.get("osc2Level") + macro_acc.osc2_level).clamp(0.0, 1.0),
            osc2_pan: p.get("osc2Pan"),
            sub_enabled: p.get("subEnabled") >= 0.5,
            sub_level: (p.get("subLevel") + macro_acc.sub_level).clamp(0.0, 1.0),
            noise_level: (p.get("noiseLevel") + macro_acc.noise_level).clamp(0.0, 1.0),
            filter_type: filter_type_from_param(p.get("filterType")),
            filter_cutoff: p.get("filterCutoff"),
            filter_resonance: (p.get("filterResonance") + macro_acc.filter_resonance + structure * 0.1).clamp(0.0, 0.99),
            filter_env_amount: p.get("filterEnvAmount"),
            filter_key_track: p.get("filterKeyTrack"),
            filter_vel_track: p.get("filterVelTrack"),
            filter_env_attack: p.get("filterEnvAttack"),
            filter_env_decay: p.get("filterEnvDecay"),
            filter_env_sustain: p.get("filterEnvSustain"),
            filter_env_release: p.get("filterEnvRelease"),
            amp_env_attack: p.get("ampEnvAttack"),
            amp_env_decay: p.get("ampEnvDecay"),
            amp_env_sustain: p.get("ampEnvSustain"),
            amp_env_release: p.get("ampEnvRelease"),
            lfo1_waveform: lfo_waveform_from_param(p.get("lfo1Waveform")),
            lfo1_rate: p.get("lfo1Rate"),
            lfo1_depth: p.get("lfo1Depth"),
            lfo1_bipolar: p.get("lfo1Bipolar") >= 0.5,
            lfo2_waveform: lfo_waveform_from_param(p.get("lfo2Waveform")),
            lfo2_rate: p.get("lfo2Rate"),
            lfo2_depth: p.get("lfo2Depth"),
            lfo2_bipolar: p.get("lfo2Bipolar") >= 0.5,
            fm_enabled: p.get("fmEnabled") >= 0.5,
            fm_carrier_osc: p.get("fmCarrierOsc"),
            fm_depth: p.get("fmDepth"),
            fm_modulator_ratio: p.get("fmModulatorRatio"),
        }
    }

    fn poly_mode(&self) -> PolyMode {
        PolyMode::from_param(self.params.get("polyMode"))
    }

    fn note_on(&mut self, midi_note: u8, velocity: f32) {
        let glide_enabled = self.params.get("glideEnabled") >= 0.5;
        let glide_time = self.params.get("glideTime");

        match self.poly_mode() {
            PolyMode::Poly => {
                let candidates: [StealCandidate; MAX_VOICES] = std::array::from_fn(|index| {
                    let v = &self.voices[index];
                    StealCandidate {
                        index,
                        active: v.state.active,
                        releasing: v.state.releasing,
                        amplitude_linear: v.amplitude_linear(),
                        age_samples: v.state.age_samples,
                    }
                });
                let target = find_idle(&candidates).or_else(|| choose_steal_target(&candidates));
                if let Some(index) = target {
                    self.voices[index].set_glide_time(if glide_enabled { glide_time } else { 0.0 });
                    self.voices[index].trigger(midi_note, velocity, None, true);
                }
            }
            PolyMode::Mono | PolyMode::Legato => {
                let retrigger = self.note_stack.is_empty() || self.poly_mode() == PolyMode::Mono;
                let glide_from = if glide_enabled && !self.note_stack.is_empty() {
                    Some(self.voices[0].state.midi_note as f32)
                } else {
                    None
                };
                self.note_stack.retain(|&n| n != midi_note);
                self.note_stack.push(midi_note);
                self.voices[0].set_glide_time(if glide_enabled { glide_time } else { 0.0 });
                self.voices[0].trigger(midi_note, velocity, glide_from, retrigger);
            }
        }
    }

    fn note_off(&mut self, midi_note: u8) {
        match self.poly_mode() {
            PolyMode::Poly => {
                if let Some(voice) = self
                    .voices
                    .iter_mut()
                    .filter(|v| v.state.active && !v.state.releasing && v.state.midi_note == midi_note)
                    .max_by_key(|v| v.state.age_samples)
                {
                    voice.begin_release();
                }
            }
            PolyMode::Mono | PolyMode::Legato => {
                self.note_stack.retain(|&n| n != midi_note);
                if let Some(&next_note) = self.note_stack.last() {
                    let glide_enabled = self.params.get("glideEnabled") >= 0.5;
                    let from = self.voices[0].state.midi_note as f32;
                    self.voices[0].trigger(next_note, self.voices[0].state.velocity, if glide_enabled { Some(from) } else { None }, false);
                } else {
                    self.voices[0].begin_release();
                }
            }
        }
    }

    fn all_notes_off(&mut self) {
        self.note_stack.clear();
        for voice in &mut self.voices {
            if voice.state.active {
                voice.begin_release();
            }
        }
    }

    fn render_range(&mut self, outputs: &mut [&mut [f32]], start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.sync_mod_slots_from_params();
        let voice_params = self.build_voice_params();
        let pitch_wheel = (self.pitch_wheel_semitones / self.pitch_bend_range.max(0.01)).clamp(-1.0, 1.0);
        let mod_wheel = self.mod_wheel;
        let mut macro_values = [0.0f32; NUM_MACROS];
        for (i, slot) in macro_values.iter_mut().enumerate() {
            *slot = self.macros[i].value;
        }

        self.master_tune_smoother.set_cutoff(30.0);
        self.master_volume_smoother.set_cutoff(30.0);
        let master_tune_target = self.params.get("masterTune");
        let master_volume_target = self.params.get("masterVolume");

        let num_channels = outputs.len();
        for sample_index in start..end {
            let master_tune = self.master_tune_smoother.process(master_tune_target);
            let master_volume = self.master_volume_smoother.process(master_volume_target);

            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for voice in &mut self.voices {
                let (l, r) = voice.process_sample(&voice_params, &self.mod_slots, pitch_wheel, mod_wheel, macro_values, master_tune);
                left += l;
                right += r;
            }
            left = crate::dsp::soft_clip(left * master_volume);
            right = crate::dsp::soft_clip(right * master_volume);

            if num_channels >= 2 {
                outputs[0][sample_index] = left;
                outputs[1][sample_index] = right;
                for channel in outputs.iter_mut().skip(2) {
                    channel[sample_index] = 0.0;
                }
            } else if num_channels == 1 {
                outputs[0][sample_index] = (left + right) * 0.5;
            }
        }
    }

    fn apply_event(&mut self, event: &ScheduledEvent) {
        match event.kind {
            EventKind::NoteOn => {
                if let EventPayload::Note { midi_note, velocity, .. } = event.payload {
                    if velocity <= 0.0 {
                        self.note_off(midi_note);
                    } else {
                        self.note_on(midi_note, velocity);
                    }
                }
            }
            EventKind::NoteOff => {
                if let EventPayload::Note { midi_note, .. } = event.payload {
                    self.note_off(midi_note);
                }
            }
            EventKind::Cc => {
                if let EventPayload::Cc { controller, value } = event.payload {
                    if controller == 1 {
                        self.mod_wheel = value.clamp(0.0, 1.0);
                    } else if controller == 128 {
                        for voice in &mut self.voices {
                            voice.set_aftertouch(value);
                        }
                    }
                }
            }
            EventKind::PitchBend => {
                if let EventPayload::PitchBend { semitones, range } = event.payload {
                    self.pitch_wheel_semitones = semitones;
                    if range > 0.0 {
                        self.pitch_bend_range = range;
                    }
                }
            }
            EventKind::Aftertouch => {
                if let EventPayload::Aftertouch { value } = event.payload {
                    for voice in &mut self.voices {
                        voice.set_aftertouch(value);
                    }
                }
            }
            EventKind::AllNotesOff => self.all_notes_off(),
            EventKind::TempoChange => {}
        }
    }
}

impl Default for VaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentEngine for VaEngine {
    fn prepare(&mut self, sample_rate: f64, block_size: i32) -> Result<(), SonanceError> {
        if !(8000.0..=192000.0).contains(&sample_rate) {
            return Err(SonanceError::SampleRateOutOfRange(sample_rate));
        }
        if !(1..=8192).contains(&block_size) {
            return Err(SonanceError::BlockSizeOutOfRange(block_size));
        }
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        for voice in &mut self.voices {
            voice.set_sample_rate(sample_rate as f32);
        }
        self.master_tune_smoother = OnePole::new(sample_rate as f32);
        self.master_volume_smoother = OnePole::new(sample_rate as f32);
        self.event_queue.set_block_size(block_size);
        self.prepared = true;
        log::debug!("va engine prepared: sr={sample_rate}, block={block_size}");
        Ok(())
    }

    fn reset(&mut self) {
        self.note_stack.clear();
        for voice in &mut self.voices {
            voice.force_idle();
        }
        self.event_queue.clear();
    }

    fn handle_event(&mut self, event: ScheduledEvent) {
        self.event_queue.push(event);
    }

    fn process(&mut self, outputs: &mut [&mut [f32]], descriptor: &BlockDescriptor) {
        let num_samples = descriptor.block_size as usize;
        if !self.prepared {
            for channel in outputs.iter_mut() {
                channel[..num_samples].fill(0.0);
            }
            return;
        }

        // Sample-accurate dispatch: render up to each pending
        // event's offset, apply it, then continue from there, rather than
        // applying every event at the top of the block. `event_scratch` is
        // a reusable buffer so draining the queue never allocates here.
        self.event_queue.drain_into(&mut self.event_scratch);
        let mut cursor = 0usize;
        for i in 0..self.event_scratch.len() {
            let event = self.event_scratch[i];
            let offset = (event.sample_offset as usize).min(num_samples);
            if offset > cursor {
                self.render_range(outputs, cursor, offset);
                cursor = offset;
            }
            self.apply_event(&event);
        }
        if cursor < num_samples {
            self.render_range(outputs, cursor, num_samples);
        }
    }

    fn set_parameter(&mut self, id: &str, value: f32) {
        self.params.set(id, value);
    }

    fn get_parameter(&self, id: &str) -> f32 {
        self.params.get(id)
    }

    fn save_preset(&self) -> Result<String, SonanceError> {
        let parameters = self.params.iter().map(|(id, value)| (id.to_string(), value));

        let mut extra = serde_json::Map::new();
        let mod_matrix: Vec<serde_json::Value> = self
            .mod_slots
            .iter()
            .map(|slot| {
                serde_json::json!({
                    "source": ModSource::to_index(slot.source),
                    "destination": ModDestination::to_index(slot.destination),
                    "amount": slot.amount,
                    "bipolar": slot.bipolar,
                    "curve": slot.curve.to_index(),
                })
            })
            .collect();
        extra.insert("modMatrix".to_string(), serde_json::Value::Array(mod_matrix));

        let macros: Vec<serde_json::Value> = self
            .macros
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let destinations: Vec<serde_json::Value> = m
                    .destinations
                    .iter()
                    .map(|d| {
                        serde_json::json!({
                            "destination": ModDestination::to_index(d.destination),
                            "amount": d.amount,
                            "min": d.min,
                            "max": d.max,
                        })
                    })
                    .collect();
                serde_json::json!({ "name": format!("macro{i}"), "value": m.value, "destinations": destinations })
            })
            .collect();
        extra.insert("macros".to_string(), serde_json::Value::Array(macros));

        Ok(preset::encode(ENGINE_NAME, ENGINE_VERSION, parameters, extra))
    }

    fn load_preset(&mut self, json: &str) -> Result<(), SonanceError> {
        let decoded = preset::decode(json, ENGINE_NAME, ENGINE_VERSION)?;

        for (id, value) in &decoded.parameters {
            self.params.set(id, *value);
        }

        if let Some(serde_json::Value::Array(slots)) = decoded.extra.get("modMatrix") {
            for (i, slot) in slots.iter().take(NUM_MOD_SLOTS).enumerate() {
                let source = slot.get("source").and_then(|v| v.as_i64()).unwrap_or(-1) as i32;
                let destination = slot.get("destination").and_then(|v| v.as_i64()).unwrap_or(-1) as i32;
                let amount = slot.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
                let bipolar = slot.get("bipolar").and_then(|v| v.as_bool()).unwrap_or(true);
                let curve = slot.get("curve").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
                self.params.set(&format!("modSource{i}"), source as f32);
                self.params.set(&format!("modDestination{i}"), destination as f32);
                self.params.set(&format!("modAmount{i}"), amount);
                self.params.set(&format!("modBipolar{i}"), if bipolar { 1.0 } else { 0.0 });
                self.params.set(&format!("modCurve{i}"), curve as f32);
            }
        }
        if let Some(serde_json::Value::Array(macros)) = decoded.extra.get("macros") {
            for (i, m) in macros.iter().take(NUM_MACROS).enumerate() {
                let value = m.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
                self.params.set(&format!("macroValue{i}"), value);
            }
        }

        self.params.publish();
        self.reset();
        Ok(())
    }

    fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.state.active).count()
    }

    fn max_polyphony(&self) -> usize {
        MAX_VOICES
    }

    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn version(&self) -> &'static str {
        ENGINE_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SampleFormat;

    fn make_engine() -> VaEngine {
        let mut e = VaEngine::new();
        e.prepare(48000.0, 512).unwrap();
        e
    }

    fn run_block(engine: &mut VaEngine, num_samples: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0f32; num_samples];
        let mut right = vec![0.0f32; num_samples];
        let descriptor = BlockDescriptor::new(48000.0, num_samples as i32, 2, SampleFormat::Planar);
        {
            let mut outputs: Vec<&mut [f32]> = vec![&mut left, &mut right];
            engine.process(&mut outputs, &descriptor);
        }
        (left, right)
    }

    #[test]
    fn silent_voice_yields_silence() {
        let mut engine = make_engine();
        engine.set_parameter("osc1Level", 0.0);
        engine.set_parameter("osc2Level", 0.0);
        engine.set_parameter("subLevel", 0.0);
        engine.set_parameter("noiseLevel", 0.0);
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        let (left, right) = run_block(&mut engine, 512);
        let peak = left.iter().chain(right.iter()).fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak < 10f32.powf(-80.0 / 20.0));
    }

    #[test]
    fn note_on_produces_nonzero_output() {
        let mut engine = make_engine();
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        let (left, right) = run_block(&mut engine, 2048);
        let peak = left.iter().chain(right.iter()).fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak > 0.01);
    }

    #[test]
    fn voice_stealing_caps_active_count_at_polyphony() {
        let mut engine = make_engine();
        for n in 60..(60 + MAX_VOICES as u8 + 1) {
            engine.handle_event(ScheduledEvent::note_on(0, n, 0.7, 0));
            run_block(&mut engine, 64);
        }
        assert_eq!(engine.active_voice_count(), MAX_VOICES);
    }

    #[test]
    fn note_off_eventually_returns_to_idle() {
        let mut engine = make_engine();
        engine.set_parameter("ampEnvRelease", 0.01);
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        run_block(&mut engine, 512);
        engine.handle_event(ScheduledEvent::note_off(0, 60, 0));
        for _ in 0..100 {
            run_block(&mut engine, 512);
        }
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn preset_round_trip_restores_parameters() {
        let mut engine = make_engine();
        engine.set_parameter("filterCutoff", 1234.0);
        engine.set_parameter("osc1Detune", 7.0);
        let json = engine.save_preset().unwrap();

        let mut fresh = make_engine();
        fresh.load_preset(&json).unwrap();
        assert_eq!(fresh.get_parameter("filterCutoff"), 1234.0);
        assert_eq!(fresh.get_parameter("osc1Detune"), 7.0);
    }

    #[test]
    fn not_prepared_writes_silence() {
        let mut engine = VaEngine::new();
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        let (left, right) = run_block(&mut engine, 256);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn mono_mode_uses_a_single_voice_with_last_note_priority() {
        let mut engine = make_engine();
        engine.set_parameter("polyMode", 1.0);
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        engine.handle_event(ScheduledEvent::note_on(0, 64, 0.8, 0));
        run_block(&mut engine, 64);
        assert_eq!(engine.active_voice_count(), 1);
        engine.handle_event(ScheduledEvent::note_off(0, 64, 0));
        run_block(&mut engine, 64);
        assert_eq!(engine.voices[0].state.midi_note, 60);
    }
}
