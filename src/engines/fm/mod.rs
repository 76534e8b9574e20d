//! Six-operator FM engine: 32 algorithm topologies, per-operator DX7-style
//! envelopes, and `structure`/stereo macros.

mod algorithms;
mod operator;
mod voice;

use crate::block::BlockDescriptor;
use crate::engine::InstrumentEngine;
use crate::error::SonanceError;
use crate::event::{EventKind, EventPayload, EventQueue, ScheduledEvent, CAPACITY as EVENT_CAPACITY};
use crate::param::{ParamRange, ParameterStore};
use crate::preset;
use crate::voice::{choose_steal_target, find_idle, StealCandidate};

use algorithms::{algorithm, topological_order, ModMatrix, NUM_ALGORITHMS, NUM_OPERATORS};
use operator::OperatorMode;
use voice::{FmVoice, FmVoiceParams, OperatorParams};

const MAX_VOICES: usize = 16;
const ENGINE_NAME: &str = "fm";
const ENGINE_VERSION: &str = "v1.0";

fn leak_id(text: String) -> &'static str {
    Box::leak(text.into_boxed_str())
}

fn operator_mode_from_param(value: f32) -> OperatorMode {
    if value.round() as i32 == 1 {
        OperatorMode::FixedHz
    } else {
        OperatorMode::Ratio
    }
}

/// `structure` ∈ [0,1] biases operator ratios toward integers/low
/// modulation at 0 and toward exotic ratios/heavy modulation at 1.
fn structure_adjusted_ratio(base_ratio: f32, operator_index: usize, structure: f32) -> f32 {
    let integer_biased = base_ratio.round().max(0.5);
    let exotic = base_ratio + (operator_index as f32 + 1.0) * 0.137;
    integer_biased * (1.0 - structure) + exotic * structure
}

fn structure_adjusted_feedback(base_feedback: f32, structure: f32) -> f32 {
    (base_feedback * (1.0 + structure)).clamp(0.0, 1.0)
}

pub struct FmEngine {
    params: ParameterStore,
    voices: Vec<FmVoice>,
    sample_rate: f64,
    block_size: i32,
    prepared: bool,
    pitch_wheel_semitones: f32,
    event_queue: EventQueue,
    event_scratch: Vec<ScheduledEvent>,
}

impl FmEngine {
    pub fn new() -> Self {
        let mut params = ParameterStore::new();
        Self::declare_params(&mut params);

        let sample_rate = 48000.0;
        let voices = (0..MAX_VOICES).map(|_| FmVoice::new(sample_rate)).collect();

        Self {
            params,
            voices,
            sample_rate,
            block_size: 512,
            prepared: false,
            pitch_wheel_semitones: 0.0,
            event_queue: EventQueue::new(512),
            event_scratch: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    fn declare_params(params: &mut ParameterStore) {
        params.declare("algorithm", ParamRange::new(0.0, (NUM_ALGORITHMS - 1) as f32, 0.0));
        params.declare("masterVolume", ParamRange::new(0.0, 1.5, 0.8));
        params.declare("pitchBendRange", ParamRange::new(0.0, 24.0, 2.0));
        params.declare("polyphony", ParamRange::new(1.0, MAX_VOICES as f32, MAX_VOICES as f32));
        params.declare("structure", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("stereoWidth", ParamRange::new(0.0, 1.0, 0.5));
        params.declare("stereoOperatorDetune", ParamRange::new(0.0, 50.0, 0.0));
        params.declare("stereoOddEvenSeparation", ParamRange::new(0.0, 1.0, 0.5));

        for op in 1..=NUM_OPERATORS {
            let default_ratio = 1.0;
            let default_level = if op == NUM_OPERATORS { 0.8 } else { 0.5 };
            params.declare(leak_id(format!("op{op}Ratio")), ParamRange::new(0.5, 32.0, default_ratio));
            params.declare(leak_id(format!("op{op}Detune")), ParamRange::new(-50.0, 50.0, 0.0));
            params.declare(leak_id(format!("op{op}Level")), ParamRange::new(0.0, 1.0, default_level));
            params.declare(leak_id(format!("op{op}Feedback")), ParamRange::new(0.0, 1.0, 0.0));
            params.declare(leak_id(format!("op{op}Mode")), ParamRange::new(0.0, 1.0, 0.0));
            params.declare(leak_id(format!("op{op}FixedHz")), ParamRange::new(1.0, 10000.0, 440.0));
            const DEFAULT_RATES: [f32; 4] = [50.0, 40.0, 30.0, 40.0];
            const DEFAULT_LEVELS: [f32; 4] = [1.0, 0.8, 0.6, 0.0];
            for seg in 1..=4 {
                params.declare(leak_id(format!("op{op}EgRate{seg}")), ParamRange::new(0.0, 99.0, DEFAULT_RATES[seg - 1]));
                params.declare(leak_id(format!("op{op}EgLevel{seg}")), ParamRange::new(0.0, 1.0, DEFAULT_LEVELS[seg - 1]));
            }
        }
    }

    fn build_matrix_and_order(&self) -> (ModMatrix, [usize; NUM_OPERATORS]) {
        let index = self.params.get("algorithm").round() as usize;
        let matrix = algorithm(index);
        let order = topological_order(&matrix);
        (matrix, order)
    }

    fn build_voice_params(&self, matrix: ModMatrix, eval_order: [usize; NUM_OPERATORS]) -> FmVoiceParams {
        let p = &self.params;
        let structure = p.get("structure");

        let mut operators = [OperatorParams::default(); NUM_OPERATORS];
        for (i, op_params) in operators.iter_mut().enumerate() {
            let op = i + 1;
            let base_ratio = p.get(&format!("op{op}Ratio"));
            let base_feedback = p.get(&format!("op{op}Feedback"));
            *op_params = OperatorParams {
                mode: operator_mode_from_param(p.get(&format!("op{op}Mode"))),
                ratio: structure_adjusted_ratio(base_ratio, i, structure),
                detune_cents: p.get(&format!("op{op}Detune")),
                fixed_hz: p.get(&format!("op{op}FixedHz")),
                level: p.get(&format!("op{op}Level")),
                feedback: structure_adjusted_feedback(base_feedback, structure),
                eg_rates: [
                    p.get(&format!("op{op}EgRate1")),
                    p.get(&format!("op{op}EgRate2")),
                    p.get(&format!("op{op}EgRate3")),
                    p.get(&format!("op{op}EgRate4")),
                ],
                eg_levels: [
                    p.get(&format!("op{op}EgLevel1")),
                    p.get(&format!("op{op}EgLevel2")),
                    p.get(&format!("op{op}EgLevel3")),
                    p.get(&format!("op{op}EgLevel4")),
                ],
            };
        }

        FmVoiceParams {
            matrix,
            eval_order,
            operators,
            pitch_bend_range: p.get("pitchBendRange"),
            stereo_width: p.get("stereoWidth"),
            stereo_operator_detune_cents: p.get("stereoOperatorDetune"),
            stereo_odd_even_separation: p.get("stereoOddEvenSeparation"),
        }
    }

    fn polyphony(&self) -> usize {
        (self.params.get("polyphony").round() as usize).clamp(1, MAX_VOICES)
    }

    fn note_on(&mut self, midi_note: u8, velocity: f32, matrix: &ModMatrix) {
        let usable = self.polyphony();
        let candidates: Vec<StealCandidate> = self.voices[..usable]
            .iter()
            .enumerate()
            .map(|(index, v)| StealCandidate {
                index,
                active: v.state.active,
                releasing: v.state.releasing,
                amplitude_linear: v.amplitude_linear(matrix),
                age_samples: v.state.age_samples,
            })
            .collect();
        let target = find_idle(&candidates).or_else(|| choose_steal_target(&candidates));
        if let Some(index) = target {
            self.voices[index].trigger(midi_note, velocity);
        }
    }

    fn note_off(&mut self, midi_note: u8) {
        if let Some(voice) = self
            .voices
            .iter_mut()
            .filter(|v| v.state.active && !v.state.releasing && v.state.midi_note == midi_note)
            .max_by_key(|v| v.state.age_samples)
        {
            voice.begin_release();
        }
    }

    fn all_notes_off(&mut self) {
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
        let (matrix, eval_order) = self.build_matrix_and_order();
        let voice_params = self.build_voice_params(matrix, eval_order);
        let pitch_wheel = (self.pitch_wheel_semitones / voice_params.pitch_bend_range.max(0.01)).clamp(-1.0, 1.0);
        let master_volume = self.params.get("masterVolume");
        let num_channels = outputs.len();

        for sample_index in start..end {
            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for voice in &mut self.voices {
                let (l, r) = voice.process_sample(&voice_params, pitch_wheel, 0.0);
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
        let (matrix, _) = self.build_matrix_and_order();
        match event.kind {
            EventKind::NoteOn => {
                if let EventPayload::Note { midi_note, velocity, .. } = event.payload {
                    if velocity <= 0.0 {
                        self.note_off(midi_note);
                    } else {
                        self.note_on(midi_note, velocity, &matrix);
                    }
                }
            }
            EventKind::NoteOff => {
                if let EventPayload::Note { midi_note, .. } = event.payload {
                    self.note_off(midi_note);
                }
            }
            EventKind::PitchBend => {
                if let EventPayload::PitchBend { semitones, .. } = event.payload {
                    self.pitch_wheel_semitones = semitones;
                }
            }
            EventKind::AllNotesOff => self.all_notes_off(),
            EventKind::Cc | EventKind::Aftertouch | EventKind::TempoChange => {}
        }
    }
}

impl Default for FmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentEngine for FmEngine {
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
            voice.set_sample_rate(sample_rate);
        }
        self.event_queue.set_block_size(block_size);
        self.prepared = true;
        log::debug!("fm engine prepared: sr={sample_rate}, block={block_size}");
        Ok(())
    }

    fn reset(&mut self) {
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
        Ok(preset::encode(ENGINE_NAME, ENGINE_VERSION, parameters, serde_json::Map::new()))
    }

    fn load_preset(&mut self, json: &str) -> Result<(), SonanceError> {
        let decoded = preset::decode(json, ENGINE_NAME, ENGINE_VERSION)?;
        for (id, value) in &decoded.parameters {
            self.params.set(id, *value);
        }
        self.params.publish();
        self.reset();
        Ok(())
    }

    fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.state.active).count()
    }

    fn max_polyphony(&self) -> usize {
        self.polyphony()
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

    fn make_engine() -> FmEngine {
        let mut e = FmEngine::new();
        e.prepare(48000.0, 512).unwrap();
        e
    }

    fn run_block(engine: &mut FmEngine, num_samples: usize) -> (Vec<f32>, Vec<f32>) {
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
    fn note_on_produces_nonzero_output() {
        let mut engine = make_engine();
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        let (left, right) = run_block(&mut engine, 2048);
        let peak = left.iter().chain(right.iter()).fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak > 0.01);
    }

    #[test]
    fn all_operator_levels_zero_yields_silence() {
        let mut engine = make_engine();
        for op in 1..=NUM_OPERATORS {
            engine.set_parameter(&format!("op{op}Level"), 0.0);
        }
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        let (left, right) = run_block(&mut engine, 512);
        let peak = left.iter().chain(right.iter()).fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak < 10f32.powf(-80.0 / 20.0));
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
        for op in 1..=NUM_OPERATORS {
            engine.set_parameter(&format!("op{op}EgRate4"), 99.0);
        }
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
        engine.set_parameter("algorithm", 3.0);
        engine.set_parameter("op1Ratio", 2.5);
        let json = engine.save_preset().unwrap();

        let mut fresh = make_engine();
        fresh.load_preset(&json).unwrap();
        assert_eq!(fresh.get_parameter("algorithm"), 3.0);
        assert_eq!(fresh.get_parameter("op1Ratio"), 2.5);
    }

    #[test]
    fn not_prepared_writes_silence() {
        let mut engine = FmEngine::new();
        engine.handle_event(ScheduledEvent::note_on(0, 60, 0.8, 0));
        let (left, right) = run_block(&mut engine, 256);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn polyphony_parameter_lowers_effective_voice_cap() {
        let mut engine = make_engine();
        engine.set_parameter("polyphony", 4.0);
        for n in 60..70 {
            engine.handle_event(ScheduledEvent::note_on(0, n, 0.7, 0));
            run_block(&mut engine, 64);
        }
        assert_eq!(engine.active_voice_count(), 4);
    }
}
