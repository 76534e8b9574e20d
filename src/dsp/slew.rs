//! First-order target-frequency smoother used for VA glide/portamento
//!: a target is approached over `glide_time` seconds.

pub struct SlewLimiter {
    sample_rate: f32,
    time_seconds: f32,
    coeff: f32,
    current: f32,
    target: f32,
}

impl SlewLimiter {
    pub fn new(sample_rate: f32) -> Self {
        let mut s = Self {
            sample_rate: sample_rate.max(1.0),
            time_seconds: 0.0,
            coeff: 1.0,
            current: 0.0,
            target: 0.0,
        };
        s.update_coeff();
        s
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time_seconds = seconds.max(0.0);
        self.update_coeff();
    }

    fn update_coeff(&mut self) {
        if self.time_seconds < 1e-5 {
            self.coeff = 1.0;
        } else {
            let samples = self.time_seconds * self.sample_rate;
            self.coeff = 1.0 - (-1.0 / samples).exp();
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn snap_to(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    pub fn process(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_time_snaps_instantly() {
        let mut s = SlewLimiter::new(48000.0);
        s.set_time(0.0);
        s.set_target(5.0);
        assert!((s.process() - 5.0).abs() < 0.01);
    }

    #[test]
    fn nonzero_time_glides_gradually() {
        let mut s = SlewLimiter::new(48000.0);
        s.set_time(0.5);
        s.set_target(1.0);
        let first = s.process();
        assert!(first < 1.0 && first > 0.0);
    }
}
