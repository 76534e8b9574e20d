//! Topology-preserving state-variable filter.
//!
//! Implemented as a zero-delay-feedback SVF so lowpass/highpass/bandpass/
//! notch share one pair of integrator states and switch type without a
//! click.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

pub struct StateVariableFilter {
    sample_rate: f32,
    cutoff_hz: f32,
    resonance: f32,
    filter_type: FilterType,
    ic1eq: f32,
    ic2eq: f32,
}

impl StateVariableFilter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            cutoff_hz: 1000.0,
            resonance: 0.0,
            filter_type: FilterType::Lowpass,
            ic1eq: 0.0,
            ic2eq: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        let nyquist = self.sample_rate * 0.49;
        self.cutoff_hz = cutoff_hz.clamp(20.0, nyquist.max(20.0));
    }

    /// `resonance` in [0, ~0.99], mapped internally to Q.
    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = resonance.clamp(0.0, 0.99);
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    /// Process one sample, returning the output for `self.filter_type`.
    /// Self-oscillation at extreme resonance is bounded by a soft clip in
    /// the resonance feedback path.
    pub fn process(&mut self, input: f32) -> f32 {
        let g = (std::f32::consts::PI * self.cutoff_hz / self.sample_rate).tan();
        // Map resonance [0, 0.99] -> damping k in (0.02, 2.0], lower k = more resonant.
        let q = 0.5 + self.resonance * 19.5;
        let k = (1.0 / q).max(0.02);

        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;

        let v3 = input - self.ic2eq;
        let v1 = a1 * self.ic1eq + a2 * v3;
        let v2 = self.ic2eq + a2 * self.ic1eq + a3 * v3;

        self.ic1eq = crate::dsp::soft_clip(2.0 * v1 - self.ic1eq);
        self.ic2eq = crate::dsp::soft_clip(2.0 * v2 - self.ic2eq);

        let lowpass = v2;
        let bandpass = v1;
        let highpass = input - k * v1 - v2;
        let notch = input - k * v1;

        let out = match self.filter_type {
            FilterType::Lowpass => lowpass,
            FilterType::Highpass => highpass,
            FilterType::Bandpass => bandpass,
            FilterType::Notch => notch,
        };
        if out.is_finite() {
            out
        } else {
            self.reset();
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_to_finite_output_at_nyquist_edge() {
        let mut svf = StateVariableFilter::new(48000.0);
        svf.set_cutoff(48000.0 * 0.49);
        svf.set_resonance(0.0);
        for i in 0..1000 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = svf.process(x);
            assert!(y.is_finite());
        }
    }

    #[test]
    fn settles_to_finite_output_at_20hz() {
        let mut svf = StateVariableFilter::new(48000.0);
        svf.set_cutoff(20.0);
        svf.set_resonance(0.99);
        for i in 0..1000 {
            let x = (i as f32 * 0.01).sin();
            let y = svf.process(x);
            assert!(y.is_finite());
        }
    }

    #[test]
    fn max_resonance_with_unit_input_never_produces_nan() {
        let mut svf = StateVariableFilter::new(48000.0);
        svf.set_cutoff(1000.0);
        svf.set_resonance(0.99);
        for _ in 0..10000 {
            let y = svf.process(1.0);
            assert!(y.is_finite());
            assert!(y.abs() < 100.0);
        }
    }

    #[test]
    fn lowpass_attenuates_high_frequency_more_than_low() {
        let mut low_in = StateVariableFilter::new(48000.0);
        low_in.set_cutoff(500.0);
        low_in.set_resonance(0.1);

        let mut peak_low = 0.0f32;
        for i in 0..4800 {
            let x = (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48000.0).sin();
            peak_low = peak_low.max(low_in.process(x).abs());
        }

        let mut high_in = StateVariableFilter::new(48000.0);
        high_in.set_cutoff(500.0);
        high_in.set_resonance(0.1);
        let mut peak_high = 0.0f32;
        for i in 0..4800 {
            let x = (2.0 * std::f32::consts::PI * 8000.0 * i as f32 / 48000.0).sin();
            peak_high = peak_high.max(high_in.process(x).abs());
        }

        assert!(peak_high < peak_low);
    }
}
