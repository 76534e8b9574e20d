//! One FM voice: six operators evaluated in topological order against a
//! shared modulation matrix, plus a lightweight stereo-detune pass for the
//! carriers.

use super::algorithms::{self, ModMatrix, NUM_OPERATORS};
use super::operator::{Operator, OperatorMode};
use crate::dsp::{midi_note_to_hz, OnePole};
use crate::voice::{STEAL_CROSSFADE_MS, VoiceSlotState};

#[derive(Debug, Clone, Copy)]
pub struct OperatorParams {
    pub mode: OperatorMode,
    pub ratio: f32,
    pub detune_cents: f32,
    pub fixed_hz: f32,
    pub level: f32,
    pub feedback: f32,
    pub eg_rates: [f32; 4],
    pub eg_levels: [f32; 4],
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            mode: OperatorMode::Ratio,
            ratio: 1.0,
            detune_cents: 0.0,
            fixed_hz: 440.0,
            level: 0.0,
            feedback: 0.0,
            eg_rates: [50.0, 40.0, 30.0, 40.0],
            eg_levels: [1.0, 0.8, 0.6, 0.0],
        }
    }
}

pub struct FmVoiceParams {
    pub matrix: ModMatrix,
    pub eval_order: [usize; NUM_OPERATORS],
    pub operators: [OperatorParams; NUM_OPERATORS],
    pub pitch_bend_range: f32,
    pub stereo_width: f32,
    pub stereo_operator_detune_cents: f32,
    pub stereo_odd_even_separation: f32,
}

pub struct FmVoice {
    pub state: VoiceSlotState,
    operators: [Operator; NUM_OPERATORS],
    stereo_phase_left: [f64; NUM_OPERATORS],
    stereo_phase_right: [f64; NUM_OPERATORS],
    steal_fade: OnePole,
    sample_rate: f64,
}

impl FmVoice {
    pub fn new(sample_rate: f64) -> Self {
        let mut steal_fade = OnePole::new(sample_rate as f32);
        steal_fade.set_cutoff(1000.0 / STEAL_CROSSFADE_MS.max(1.0));
        steal_fade.reset(1.0);
        Self {
            state: VoiceSlotState::default(),
            operators: std::array::from_fn(|_| Operator::new(sample_rate)),
            stereo_phase_left: [0.0; NUM_OPERATORS],
            stereo_phase_right: [0.0; NUM_OPERATORS],
            steal_fade,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for op in &mut self.operators {
            op.set_sample_rate(sample_rate);
        }
        self.steal_fade = OnePole::new(sample_rate as f32);
        self.steal_fade.set_cutoff(1000.0 / STEAL_CROSSFADE_MS.max(1.0));
        self.steal_fade.reset(1.0);
    }

    /// Aggregate envelope level across carriers, used both for voice
    /// stealing and to decide when a released voice has
    /// become silent enough to deactivate.
    pub fn amplitude_linear(&self, matrix: &ModMatrix) -> f32 {
        (0..NUM_OPERATORS)
            .filter(|&i| algorithms::is_carrier(matrix, i))
            .map(|i| self.operators[i].envelope.level().abs())
            .fold(0.0f32, f32::max)
    }

    pub fn trigger(&mut self, midi_note: u8, velocity: f32) {
        self.state.trigger(midi_note, velocity);
        self.steal_fade.reset(0.0);
        for op in &mut self.operators {
            op.reset_phase();
            op.envelope.note_on(velocity);
        }
    }

    pub fn begin_release(&mut self) {
        self.state.begin_release();
        for op in &mut self.operators {
            op.envelope.note_off();
        }
    }

    pub fn force_idle(&mut self) {
        self.state.deactivate();
        for op in &mut self.operators {
            op.reset();
        }
        self.stereo_phase_left = [0.0; NUM_OPERATORS];
        self.stereo_phase_right = [0.0; NUM_OPERATORS];
    }

    fn is_envelope_active(&self) -> bool {
        self.operators.iter().any(|op| op.envelope.is_active())
    }

    pub fn process_sample(&mut self, p: &FmVoiceParams, pitch_wheel: f32, master_tune_semitones: f32) -> (f32, f32) {
        self.state.tick(1);
        if !self.state.active {
            return (0.0, 0.0);
        }

        let bend_semitones = pitch_wheel * p.pitch_bend_range;
        let fundamental_hz =
            (midi_note_to_hz(self.state.midi_note as f32) as f64) * 2f64.powf(((bend_semitones + master_tune_semitones) as f64) / 12.0);

        for (op, op_params) in self.operators.iter_mut().zip(p.operators.iter()) {
            op.mode = op_params.mode;
            op.ratio = op_params.ratio;
            op.detune_cents = op_params.detune_cents;
            op.fixed_hz = op_params.fixed_hz;
            op.level = op_params.level;
            op.feedback = op_params.feedback;
            op.envelope.rates = op_params.eg_rates;
            op.envelope.levels = op_params.eg_levels;
        }

        let mut raw_outputs = [0.0f32; NUM_OPERATORS];
        for &i in &p.eval_order {
            let mut modulation = 0.0f64;
            for j in 0..NUM_OPERATORS {
                let weight = p.matrix[i][j];
                if weight != 0.0 {
                    modulation += (weight as f64) * std::f64::consts::TAU * (raw_outputs[j] as f64);
                }
            }
            let feedback_amount = self.operators[i].feedback as f64;
            if feedback_amount != 0.0 {
                modulation += feedback_amount * std::f64::consts::TAU * (self.operators[i].last_output() as f64);
            }
            raw_outputs[i] = self.operators[i].process(fundamental_hz, modulation);
        }

        let fade = self.steal_fade.process(1.0);
        let use_detune = p.stereo_operator_detune_cents.abs() > 0.001;
        let detune_ratio_l = 2f64.powf((-p.stereo_operator_detune_cents as f64 / 2.0) / 1200.0);
        let detune_ratio_r = 2f64.powf((p.stereo_operator_detune_cents as f64 / 2.0) / 1200.0);

        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for i in 0..NUM_OPERATORS {
            if !algorithms::is_carrier(&p.matrix, i) {
                continue;
            }
            let carrier_output = raw_outputs[i];

            // "even-indexed" under 1-indexed operator numbering is odd in
            // this 0-indexed array (op2/op4/op6 -> indices 1/3/5).
            let routed_even = i % 2 == 1;
            let side = if routed_even { 1.0 } else { -1.0 };
            let pan = (side * p.stereo_width.clamp(0.0, 1.0) * p.stereo_odd_even_separation.clamp(0.0, 1.0)).clamp(-1.0, 1.0);
            let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
            let (pan_left, pan_right) = (angle.cos(), angle.sin());

            let (sample_l, sample_r) = if use_detune {
                let base_freq = self.operators[i].frequency(fundamental_hz);
                let wrap = std::f64::consts::TAU;
                self.stereo_phase_left[i] += wrap * base_freq * detune_ratio_l / self.sample_rate;
                self.stereo_phase_right[i] += wrap * base_freq * detune_ratio_r / self.sample_rate;
                if self.stereo_phase_left[i] > wrap {
                    self.stereo_phase_left[i] -= wrap;
                }
                if self.stereo_phase_right[i] > wrap {
                    self.stereo_phase_right[i] -= wrap;
                }
                let env_level = self.operators[i].envelope.level();
                let level = self.operators[i].level;
                (
                    (self.stereo_phase_left[i].sin() as f32) * env_level * level,
                    (self.stereo_phase_right[i].sin() as f32) * env_level * level,
                )
            } else {
                (carrier_output, carrier_output)
            };

            left += sample_l * pan_left;
            right += sample_r * pan_right;
        }

        left *= fade;
        right *= fade;

        if self.state.releasing && !self.is_envelope_active() {
            self.state.deactivate();
        }

        (left, right)
    }
}
