//! A single FM operator: a double-precision phase accumulator, its own
//! 8-segment DX7-style envelope, self-feedback, and fixed/ratio frequency
//! modes.

/// `rate -> time` mapping matching DX7 convention, here as a smooth exponential rather than the
/// original's lookup table.
fn segment_time_seconds(rate: f32) -> f32 {
    let normalized = (rate.clamp(0.0, 99.0)) / 99.0;
    (60.0 * 0.001f32.powf(normalized)).max(0.002)
}

/// Four rate/level pairs: segments 0-2 run in sequence on `note_on`
/// (holding at segment 2's level once reached); segment 3 is entered
/// directly on `note_off` regardless of where playback currently is.
#[derive(Debug, Clone, Copy)]
pub struct DxEnvelope {
    sample_rate: f32,
    pub rates: [f32; 4],
    pub levels: [f32; 4],
    stage: usize,
    level: f32,
    velocity_scale: f32,
}

impl DxEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            rates: [50.0, 40.0, 30.0, 40.0],
            levels: [1.0, 0.8, 0.6, 0.0],
            stage: 4,
            level: 0.0,
            velocity_scale: 1.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    pub fn note_on(&mut self, velocity: f32) {
        self.velocity_scale = 0.3 + 0.7 * velocity.clamp(0.0, 1.0);
        self.stage = 0;
    }

    pub fn note_off(&mut self) {
        if self.stage != 4 {
            self.stage = 3;
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != 4
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.stage = 4;
        self.level = 0.0;
    }

    pub fn process(&mut self) -> f32 {
        if self.stage < 3 {
            let target = self.levels[self.stage] * self.velocity_scale;
            let time = segment_time_seconds(self.rates[self.stage]);
            let increment = (target - self.level) / (time * self.sample_rate);
            self.level += increment;
            let reached = (increment >= 0.0 && self.level >= target) || (increment <= 0.0 && self.level <= target);
            if reached {
                self.level = target;
                if self.stage < 2 {
                    self.stage += 1;
                }
            }
        } else if self.stage == 3 {
            let target = self.levels[3] * self.velocity_scale;
            let time = segment_time_seconds(self.rates[3]);
            let increment = (target - self.level) / (time * self.sample_rate);
            self.level += increment;
            if (self.level - target).abs() < 0.0005 {
                self.level = 0.0;
                self.stage = 4;
            }
        } else {
            self.level = 0.0;
        }
        if !self.level.is_finite() {
            self.level = 0.0;
            self.stage = 4;
        }
        self.level
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorMode {
    Ratio,
    FixedHz,
}

pub struct Operator {
    phase: f64,
    sample_rate: f64,
    pub mode: OperatorMode,
    pub ratio: f32,
    pub detune_cents: f32,
    pub fixed_hz: f32,
    pub level: f32,
    pub feedback: f32,
    pub envelope: DxEnvelope,
    last_output: f32,
}

impl Operator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
            mode: OperatorMode::Ratio,
            ratio: 1.0,
            detune_cents: 0.0,
            fixed_hz: 440.0,
            level: 0.0,
            feedback: 0.0,
            envelope: DxEnvelope::new(sample_rate as f32),
            last_output: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.envelope.set_sample_rate(sample_rate as f32);
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.last_output = 0.0;
        self.envelope.reset();
    }

    /// Reset only the phase accumulator, leaving envelope state alone —
    /// used on `note_on` so a retrigger starts from a repeatable phase
    /// without disturbing an already-running envelope (legato-style reuse
    /// is not part of this engine, but the distinction keeps trigger logic
    /// from fighting `note_on`'s envelope restart).
    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
        self.last_output = 0.0;
    }

    fn instantaneous_frequency(&self, fundamental_hz: f64) -> f64 {
        match self.mode {
            OperatorMode::Ratio => fundamental_hz * self.ratio as f64 * 2f64.powf(self.detune_cents as f64 / 1200.0),
            OperatorMode::FixedHz => self.fixed_hz as f64,
        }
    }

    pub fn frequency(&self, fundamental_hz: f64) -> f64 {
        self.instantaneous_frequency(fundamental_hz)
    }

    /// Advance the phase accumulator and render one sample, given the
    /// combined phase-modulation input (radians) from this operator's
    /// modulators and its own feedback term.
    pub fn process(&mut self, fundamental_hz: f64, modulation_radians: f64) -> f32 {
        let freq = self.instantaneous_frequency(fundamental_hz);
        let increment = std::f64::consts::TAU * freq / self.sample_rate;
        self.phase += increment;
        if self.phase > std::f64::consts::TAU {
            self.phase -= std::f64::consts::TAU;
        }

        let env = self.envelope.process();
        let raw = (self.phase + modulation_radians).sin();
        let output = (raw as f32) * env * self.level;
        self.last_output = if output.is_finite() { output } else { 0.0 };
        self.last_output
    }
}
