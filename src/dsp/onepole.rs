//! One-pole smoothing/damping filter, used for loop-damping in the
//! waveguide string, cutoff key-tracking smoothing, and glide.

pub struct OnePole {
    sample_rate: f32,
    coeff: f32,
    state: f32,
}

impl OnePole {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1.0),
            coeff: 1.0,
            state: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    /// Set the -3dB cutoff in Hz.
    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        let nyquist = self.sample_rate * 0.49;
        let c = cutoff_hz.clamp(1.0, nyquist.max(1.0));
        let x = (-std::f32::consts::TAU * c / self.sample_rate).exp();
        self.coeff = 1.0 - x;
    }

    /// Set the smoothing coefficient directly, in (0, 1]; 1.0 tracks the
    /// input instantly.
    pub fn set_coeff(&mut self, coeff: f32) {
        self.coeff = coeff.clamp(0.0001, 1.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.state += self.coeff * (input - self.state);
        if self.state.is_finite() {
            self.state
        } else {
            self.state = 0.0;
            0.0
        }
    }

    pub fn value(&self) -> f32 {
        self.state
    }

    pub fn reset(&mut self, value: f32) {
        self.state = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_step_input() {
        let mut lp = OnePole::new(48000.0);
        lp.set_cutoff(100.0);
        let mut y = 0.0;
        for _ in 0..48000 {
            y = lp.process(1.0);
        }
        assert!((y - 1.0).abs() < 0.01);
    }
}
