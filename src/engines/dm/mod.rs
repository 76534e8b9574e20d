//! Drum Machine engine: a 17-voice percussion bank, a 16-track step
//! sequencer up to 64 steps long, and the groove stack (swing, timing
//! role, seeded drift) layered on top of the grid in that strict order.

mod groove;
mod kit;
mod params;
mod voice;

use crate::block::BlockDescriptor;
use crate::engine::InstrumentEngine;
use crate::error::SonanceError;
use crate::event::{EventKind, EventPayload, EventQueue, ScheduledEvent, CAPACITY as EVENT_CAPACITY};
use crate::param::{ParamRange, ParameterStore};
use crate::preset;

use groove::{groove_offset_fraction, TimingRole};
use kit::{VoiceKind, ALL_KINDS};
use params::VoiceModifiers;
use voice::DrumVoice;

const MAX_VOICES: usize = 16;
const NUM_TRACKS: usize = 16;
const MAX_STEPS: usize = 64;
const PER_KIND_POLYPHONY: usize = 4;
const ENGINE_NAME: &str = "dm";
const ENGINE_VERSION: &str = "v1.0";
const PATTERN_SEED: u64 = 0xD111A_5EED_u64;

fn leak_id(text: String) -> &'static str {
    Box::leak(text.into_boxed_str())
}

/// Per-track parameter ids, leaked once at construction so the audio path
/// looks them up instead of formatting a fresh string every block.
#[derive(Clone, Copy)]
struct TrackParamKeys {
    volume: &'static str,
    pan: &'static str,
    voice: &'static str,
    role: &'static str,
    steps: [&'static str; MAX_STEPS],
}

impl TrackParamKeys {
    fn build(t: usize) -> Self {
        Self {
            volume: leak_id(format!("trackVolume{t}")),
            pan: leak_id(format!("trackPan{t}")),
            voice: leak_id(format!("trackVoice{t}")),
            role: leak_id(format!("trackRole{t}")),
            steps: std::array::from_fn(|s| leak_id(format!("track{t}Step{s}"))),
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    kind: VoiceKind,
    role: TimingRole,
    volume: f32,
    pan: f32,
    steps: [f32; MAX_STEPS],
}

impl Track {
    fn default_for_index(index: usize) -> Self {
        let kind = ALL_KINDS[index % ALL_KINDS.len()];
        Self {
            kind,
            role: TimingRole::default_for_family(kind.family()),
            volume: 0.8,
            pan: 0.0,
            steps: [0.0; MAX_STEPS],
        }
    }
}

pub struct DmEngine {
    params: ParameterStore,
    voices: Vec<DrumVoice>,
    voice_track: Vec<Option<usize>>,
    tracks: Vec<Track>,
    sample_rate: f64,
    block_size: i32,
    prepared: bool,
    absolute_sample: u64,
    next_boundary_sample: u64,
    pending_step_index: usize,
    bar_counter: u64,
    scheduled: Vec<(u64, usize, f32)>,
    schedule_initialized: bool,
    event_queue: EventQueue,
    event_scratch: Vec<ScheduledEvent>,
    track_keys: Vec<TrackParamKeys>,
}

/// Lookahead can hold a prior step's pull-delayed hits alongside the next
/// step's, so the worst case is just under 2 tracks' worth of entries.
const SCHEDULED_CAPACITY: usize = 2 * NUM_TRACKS;

impl DmEngine {
    pub fn new() -> Self {
        let track_keys: Vec<TrackParamKeys> = (0..NUM_TRACKS).map(TrackParamKeys::build).collect();

        let mut params = ParameterStore::new();
        Self::declare_params(&mut params, &track_keys);

        let sample_rate = 48000.0;
        let mut voices = Vec::with_capacity(MAX_VOICES);
        for i in 0..MAX_VOICES {
            voices.push(DrumVoice::new(sample_rate as f32, 0xD12A_7EED ^ (i as u64).wrapping_mul(0x9E37_79B9)));
        }

        let tracks = (0..NUM_TRACKS).map(Track::default_for_index).collect();

        Self {
            params,
            voices,
            voice_track: vec![None; MAX_VOICES],
            tracks,
            sample_rate,
            block_size: 512,
            prepared: false,
            absolute_sample: 0,
            next_boundary_sample: 0,
            pending_step_index: 0,
            bar_counter: 0,
            scheduled: Vec::with_capacity(SCHEDULED_CAPACITY),
            schedule_initialized: false,
            event_queue: EventQueue::new(512),
            event_scratch: Vec::with_capacity(EVENT_CAPACITY),
            track_keys,
        }
    }

    fn declare_params(params: &mut ParameterStore, track_keys: &[TrackParamKeys]) {
        params.declare("tempo", ParamRange::new(40.0, 300.0, 120.0));
        params.declare("swing", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("masterVolume", ParamRange::new(0.0, 1.5, 0.8));
        params.declare("patternLength", ParamRange::new(1.0, MAX_STEPS as f32, 16.0));
        params.declare("pocketOffset", ParamRange::new(-0.5, 0.5, 0.0));
        params.declare("pushOffset", ParamRange::new(-0.5, 0.5, -0.04));
        params.declare("pullOffset", ParamRange::new(-0.5, 0.5, 0.06));
        params.declare("dillaAmount", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("dillaHatBias", ParamRange::new(-1.0, 1.0, 0.0));
        params.declare("dillaSnareLate", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("dillaKickTight", ParamRange::new(0.0, 1.0, 0.0));
        params.declare("dillaMaxDrift", ParamRange::new(0.0, 1.0, 0.1));
        params.declare("stereoWidth", ParamRange::new(0.0, 2.0, 1.0));

        params.declare("kickPitch", ParamRange::new(0.25, 4.0, 1.0));
        params.declare("kickDecay", ParamRange::new(0.1, 4.0, 1.0));
        params.declare("kickClick", ParamRange::new(0.0, 2.0, 1.0));
        params.declare("snareTone", ParamRange::new(0.0, 2.0, 1.0));
        params.declare("snareSnap", ParamRange::new(0.0, 2.0, 1.0));

        for t in 0..NUM_TRACKS {
            let default_track = Track::default_for_index(t);
            let keys = &track_keys[t];
            params.declare(keys.volume, ParamRange::new(0.0, 1.5, 0.8));
            params.declare(keys.pan, ParamRange::new(-1.0, 1.0, 0.0));
            params.declare(
                keys.voice,
                ParamRange::new(0.0, (ALL_KINDS.len() - 1) as f32, default_track.kind.to_index() as f32),
            );
            params.declare(
                keys.role,
                ParamRange::new(0.0, 2.0, default_track.role.to_index() as f32),
            );
            for s in 0..MAX_STEPS {
                params.declare(keys.steps[s], ParamRange::new(0.0, 1.0, 0.0));
            }
        }
    }

    fn sync_tracks_from_params(&mut self) {
        for t in 0..NUM_TRACKS {
            let keys = self.track_keys[t];
            let kind = VoiceKind::from_index(self.params.get(keys.voice).round() as i32);
            let role = TimingRole::from_index(self.params.get(keys.role).round() as i32);
            let volume = self.params.get(keys.volume);
            let pan = self.params.get(keys.pan);
            let mut steps = [0.0f32; MAX_STEPS];
            for s in 0..MAX_STEPS {
                steps[s] = self.params.get(keys.steps[s]);
            }

            let track = &mut self.tracks[t];
            track.kind = kind;
            track.role = role;
            track.volume = volume;
            track.pan = pan;
            track.steps = steps;
        }
    }

    fn voice_modifiers(&self) -> VoiceModifiers {
        VoiceModifiers {
            kick_pitch: self.params.get("kickPitch"),
            kick_decay: self.params.get("kickDecay"),
            kick_click: self.params.get("kickClick"),
            snare_tone: self.params.get("snareTone"),
            snare_snap: self.params.get("snareSnap"),
        }
    }

    /// Compute groove-adjusted fire times for every track with a hit on
    /// `step_index` and push them onto the lookahead queue. Called one
    /// step ahead of the nominal boundary it schedules, so a "push" role
    /// (negative offset) still resolves to a sample in the future.
    fn schedule_step(&mut self, step_index: usize, nominal_sample: u64, samples_per_step: f64, pattern_length: usize) {
        if step_index >= pattern_length {
            return;
        }
        let swing = self.params.get("swing");
        let pocket = self.params.get("pocketOffset");
        let push = self.params.get("pushOffset");
        let pull = self.params.get("pullOffset");
        let dilla_amount = self.params.get("dillaAmount");
        let dilla_hat_bias = self.params.get("dillaHatBias");
        let dilla_snare_late = self.params.get("dillaSnareLate");
        let dilla_kick_tight = self.params.get("dillaKickTight");
        let dilla_max_drift = self.params.get("dillaMaxDrift");

        for t in 0..NUM_TRACKS {
            let velocity = self.tracks[t].steps[step_index];
            if velocity <= 0.0 {
                continue;
            }
            let role = self.tracks[t].role;
            let family = self.tracks[t].kind.family();
            let fraction = groove_offset_fraction(
                step_index,
                swing,
                role,
                pocket,
                push,
                pull,
                PATTERN_SEED,
                self.bar_counter,
                t,
                family,
                dilla_amount,
                dilla_hat_bias,
                dilla_snare_late,
                dilla_kick_tight,
                dilla_max_drift,
            );
            let offset_samples = (fraction as f64 * samples_per_step) as i64;
            let fire_at = (nominal_sample as i64 + offset_samples).max(0) as u64;
            self.scheduled.push((fire_at, t, velocity));
        }
    }

    /// Assign a free or stolen voice slot to a track's hit.
    fn trigger_voice(&mut self, track_index: usize, velocity: f32) {
        let kind = self.tracks[track_index].kind;
        let index = if let Some(i) = self.voices.iter().position(|v| !v.is_active()) {
            i
        } else {
            let same_kind_count = self.voices.iter().filter(|v| v.kind() == Some(kind)).count();
            if same_kind_count >= PER_KIND_POLYPHONY {
                self.voices
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.kind() == Some(kind))
                    .max_by_key(|(_, v)| v.age_samples)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            } else {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age_samples)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            }
        };
        let modifiers = self.voice_modifiers();
        self.voices[index].trigger(kind, velocity, &modifiers);
        self.voice_track[index] = Some(track_index);
    }

    fn trigger_live(&mut self, midi_note: u8, velocity: f32) {
        if let Some(kind) = VoiceKind::from_midi_note(midi_note) {
            let index = if let Some(i) = self.voices.iter().position(|v| !v.is_active()) {
                i
            } else {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age_samples)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            };
            let modifiers = self.voice_modifiers();
            self.voices[index].trigger(kind, velocity, &modifiers);
            self.voice_track[index] = None;
        }
    }

    fn reset_playhead(&mut self) {
        self.absolute_sample = 0;
        self.next_boundary_sample = 0;
        self.pending_step_index = 0;
        self.bar_counter = 0;
        self.scheduled.clear();
        self.schedule_initialized = false;
    }

    fn render_range(&mut self, outputs: &mut [&mut [f32]], start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.sync_tracks_from_params();

        let tempo = self.params.get("tempo").max(1.0);
        let pattern_length = self.params.get("patternLength").round().clamp(1.0, MAX_STEPS as f32) as usize;
        let samples_per_step = self.sample_rate * 60.0 / tempo as f64 / 4.0;
        let master_volume = self.params.get("masterVolume");
        let stereo_width = self.params.get("stereoWidth");

        if !self.schedule_initialized {
            self.schedule_step(0, self.absolute_sample, samples_per_step, pattern_length);
            self.pending_step_index = 1 % pattern_length.max(1);
            self.next_boundary_sample = self.absolute_sample + samples_per_step.round() as u64;
            self.schedule_initialized = true;
        }

        let num_channels = outputs.len();
        for sample_index in start..end {
            let mut i = 0;
            while i < self.scheduled.len() {
                if self.scheduled[i].0 <= self.absolute_sample {
                    let (_, track_index, velocity) = self.scheduled.remove(i);
                    self.trigger_voice(track_index, velocity);
                } else {
                    i += 1;
                }
            }

            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for (vi, voice) in self.voices.iter_mut().enumerate() {
                if !voice.is_active() {
                    continue;
                }
                voice.tick_age();
                let sample = voice.process();
                let (volume, pan) = match self.voice_track[vi] {
                    Some(ti) => (self.tracks[ti].volume, self.tracks[ti].pan),
                    None => (1.0, 0.0),
                };
                let pan = pan.clamp(-1.0, 1.0);
                let left_gain = (1.0 - pan.max(0.0)) * volume;
                let right_gain = (1.0 + pan.min(0.0)) * volume;
                left += sample * left_gain;
                right += sample * right_gain;
            }

            let mid = (left + right) * 0.5;
            let side = (left - right) * 0.5 * stereo_width;
            left = crate::dsp::soft_clip((mid + side) * master_volume);
            right = crate::dsp::soft_clip((mid - side) * master_volume);

            if num_channels >= 2 {
                outputs[0][sample_index] = left;
                outputs[1][sample_index] = right;
                for channel in outputs.iter_mut().skip(2) {
                    channel[sample_index] = 0.0;
                }
            } else if num_channels == 1 {
                outputs[0][sample_index] = (left + right) * 0.5;
            }

            self.absolute_sample += 1;
            if self.absolute_sample >= self.next_boundary_sample {
                self.schedule_step(self.pending_step_index, self.next_boundary_sample, samples_per_step, pattern_length);
                self.pending_step_index = (self.pending_step_index + 1) % pattern_length.max(1);
                if self.pending_step_index == 0 {
                    self.bar_counter += 1;
                }
                self.next_boundary_sample += samples_per_step.round().max(1.0) as u64;
            }
        }
    }

    fn apply_event(&mut self, event: &ScheduledEvent) {
        match event.kind {
            EventKind::NoteOn => {
                if let EventPayload::Note { midi_note, velocity, .. } = event.payload {
                    if velocity > 0.0 {
                        self.trigger_live(midi_note, velocity);
                    }
                }
            }
            EventKind::NoteOff => {}
            EventKind::Cc => {}
            EventKind::PitchBend => {}
            EventKind::Aftertouch => {}
            EventKind::AllNotesOff => {
                for voice in &mut self.voices {
                    voice.force_idle();
                }
            }
            EventKind::TempoChange => {
                if let EventPayload::Tempo { bpm, .. } = event.payload {
                    self.params.set("tempo", bpm);
                }
            }
        }
    }
}

impl Default for DmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentEngine for DmEngine {
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
        self.reset_playhead();
        self.event_queue.set_block_size(block_size);
        self.prepared = true;
        log::debug!("dm engine prepared: sr={sample_rate}, block={block_size}");
        Ok(())
    }

    fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.force_idle();
        }
        self.voice_track.iter_mut().for_each(|v| *v = None);
        self.reset_playhead();
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

        let pattern: Vec<serde_json::Value> = self
            .tracks
            .iter()
            .map(|track| {
                serde_json::json!({
                    "voice": track.kind.to_index(),
                    "role": track.role.to_index(),
                    "volume": track.volume,
                    "pan": track.pan,
                    "steps": track.steps.to_vec(),
                })
            })
            .collect();

        let mut extra = serde_json::Map::new();
        extra.insert("pattern".to_string(), serde_json::Value::Array(pattern));

        Ok(preset::encode(ENGINE_NAME, ENGINE_VERSION, parameters, extra))
    }

    fn load_preset(&mut self, json: &str) -> Result<(), SonanceError> {
        let decoded = preset::decode(json, ENGINE_NAME, ENGINE_VERSION)?;

        for (id, value) in &decoded.parameters {
            self.params.set(id, *value);
        }

        if let Some(serde_json::Value::Array(tracks)) = decoded.extra.get("pattern") {
            for (t, entry) in tracks.iter().take(NUM_TRACKS).enumerate() {
                if let Some(voice) = entry.get("voice").and_then(|v| v.as_i64()) {
                    self.params.set(&format!("trackVoice{t}"), voice as f32);
                }
                if let Some(role) = entry.get("role").and_then(|v| v.as_i64()) {
                    self.params.set(&format!("trackRole{t}"), role as f32);
                }
                if let Some(volume) = entry.get("volume").and_then(|v| v.as_f64()) {
                    self.params.set(&format!("trackVolume{t}"), volume as f32);
                }
                if let Some(pan) = entry.get("pan").and_then(|v| v.as_f64()) {
                    self.params.set(&format!("trackPan{t}"), pan as f32);
                }
                if let Some(serde_json::Value::Array(steps)) = entry.get("steps") {
                    for (s, step) in steps.iter().take(MAX_STEPS).enumerate() {
                        if let Some(v) = step.as_f64() {
                            self.params.set(&format!("track{t}Step{s}"), v as f32);
                        }
                    }
                }
            }
        }

        self.params.publish();
        self.reset();
        Ok(())
    }

    fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
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

    fn make_engine() -> DmEngine {
        let mut e = DmEngine::new();
        e.prepare(48000.0, 512).unwrap();
        e
    }

    fn run_block(engine: &mut DmEngine, num_samples: usize) -> (Vec<f32>, Vec<f32>) {
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
    fn not_prepared_writes_silence() {
        let mut engine = DmEngine::new();
        let (left, right) = run_block(&mut engine, 256);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn live_note_on_produces_nonzero_output() {
        let mut engine = make_engine();
        engine.handle_event(ScheduledEvent::note_on(0, 36, 0.9, 0));
        let (left, right) = run_block(&mut engine, 2048);
        let peak = left.iter().chain(right.iter()).fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak > 0.001);
    }

    #[test]
    fn sequenced_kick_fires_near_the_grid() {
        let mut engine = make_engine();
        engine.set_parameter("tempo", 120.0);
        engine.set_parameter("patternLength", 16.0);
        engine.set_parameter("track0Step0", 1.0);
        let samples_per_step = (48000.0 * 60.0 / 120.0 / 4.0) as usize;

        let mut peak_window = 0.0f32;
        let mut total_samples = 0usize;
        while total_samples < samples_per_step {
            let (l, r) = run_block(&mut engine, 64);
            peak_window = peak_window.max(l.iter().chain(r.iter()).fold(0.0f32, |a, &b| a.max(b.abs())));
            total_samples += 64;
        }
        assert!(peak_window > 0.001, "kick on step 0 should sound almost immediately");
    }

    #[test]
    fn push_role_fires_before_pull_role_for_identical_steps() {
        let mut engine = make_engine();
        engine.set_parameter("tempo", 120.0);
        engine.set_parameter("patternLength", 16.0);
        engine.set_parameter("pushOffset", -0.04);
        engine.set_parameter("pullOffset", 0.06);
        // Track 4's default kind (ClosedHat) carries TimingRole::Push,
        // track 2's default kind (Snare) carries TimingRole::Pull.
        engine.set_parameter("track4Step4", 1.0);
        engine.set_parameter("track2Step4", 1.0);

        let samples_per_step = 48000.0 * 60.0 / 120.0 / 4.0;
        let step4_nominal = (4.0 * samples_per_step) as usize;
        let window_start = step4_nominal.saturating_sub(500);
        let window_end = step4_nominal + 500;

        let mut left = vec![0.0f32; window_end];
        let mut right = vec![0.0f32; window_end];
        {
            let mut outputs: Vec<&mut [f32]> = vec![&mut left, &mut right];
            let descriptor = BlockDescriptor::new(48000.0, window_end as i32, 2, SampleFormat::Planar);
            engine.process(&mut outputs, &descriptor);
        }

        let pre_grid_energy: f32 = left[window_start..step4_nominal]
            .iter()
            .chain(right[window_start..step4_nominal].iter())
            .map(|s| s.abs())
            .sum();
        assert!(pre_grid_energy > 0.0, "the pushed hi-hat should sound before the nominal grid step");
    }

    #[test]
    fn voice_stealing_caps_active_count_at_max_voices() {
        let mut engine = make_engine();
        for note in 36..(36 + MAX_VOICES as u8 + 2) {
            engine.handle_event(ScheduledEvent::note_on(0, note, 0.8, 0));
            run_block(&mut engine, 32);
        }
        assert!(engine.active_voice_count() <= MAX_VOICES);
    }

    #[test]
    fn preset_round_trip_restores_pattern() {
        let mut engine = make_engine();
        engine.set_parameter("track0Step0", 1.0);
        engine.set_parameter("track0Step4", 1.0);
        engine.set_parameter("tempo", 96.0);
        let json = engine.save_preset().unwrap();

        let mut fresh = make_engine();
        fresh.load_preset(&json).unwrap();
        assert_eq!(fresh.get_parameter("track0Step0"), 1.0);
        assert_eq!(fresh.get_parameter("track0Step4"), 1.0);
        assert_eq!(fresh.get_parameter("tempo"), 96.0);
    }

    #[test]
    fn all_notes_off_silences_every_voice() {
        let mut engine = make_engine();
        engine.handle_event(ScheduledEvent::note_on(0, 36, 0.9, 0));
        engine.handle_event(ScheduledEvent::note_on(0, 38, 0.9, 0));
        run_block(&mut engine, 64);
        engine.handle_event(ScheduledEvent::all_notes_off(0));
        assert_eq!(engine.active_voice_count(), 0);
    }
}
