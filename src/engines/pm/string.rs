//! The waveguide string itself: a
//! fractional delay line closed through a loop-damping one-pole, a
//! stiffness allpass/lowpass blend, a three-section dispersion allpass
//! cascade, a soft-saturation nonlinearity, and a pick-position comb
//! applied to the excitation before it enters the loop.

use crate::dsp::{soft_clip, FractionalDelayLine, OnePole};
use super::allpass::Allpass;

/// The loop filters add a few samples of their own group delay; folding a
/// fixed estimate into the tuning keeps the fundamental close to the
/// requested frequency across the parameter range rather than re-deriving
/// it analytically per filter setting.
const FILTER_DELAY_COMPENSATION: f32 = 3.0;

pub struct WaveguideString {
    delay: FractionalDelayLine,
    pick_comb: FractionalDelayLine,
    damping: OnePole,
    stiffness_lowpass: OnePole,
    stiffness_allpass: Allpass,
    dispersion: [Allpass; 3],
    sample_rate: f64,
    frequency_hz: f64,
    period_samples: f32,
    feedback_sample: f32,
    last_output: f32,
}

impl WaveguideString {
    pub fn new(sample_rate: f64, min_frequency_hz: f64) -> Self {
        let max_delay = ((sample_rate / min_frequency_hz.max(20.0)) as usize) + 8;
        Self {
            delay: FractionalDelayLine::new(max_delay),
            pick_comb: FractionalDelayLine::new(max_delay),
            damping: OnePole::new(sample_rate as f32),
            stiffness_lowpass: OnePole::new(sample_rate as f32),
            stiffness_allpass: Allpass::new(0.0),
            dispersion: [Allpass::new(0.0), Allpass::new(0.0), Allpass::new(0.0)],
            sample_rate,
            frequency_hz: 220.0,
            period_samples: (sample_rate / 220.0) as f32,
            feedback_sample: 0.0,
            last_output: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.damping.set_sample_rate(sample_rate as f32);
        self.stiffness_lowpass.set_sample_rate(sample_rate as f32);
        self.set_frequency(self.frequency_hz);
    }

    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.frequency_hz = frequency_hz.max(1.0);
        self.period_samples = (self.sample_rate / self.frequency_hz) as f32;
        self.delay.set_delay((self.period_samples - FILTER_DELAY_COMPENSATION).max(2.0));
    }

    pub fn clear(&mut self) {
        self.delay.clear();
        self.pick_comb.clear();
        self.damping.reset(0.0);
        self.stiffness_lowpass.reset(0.0);
        self.stiffness_allpass.reset();
        for ap in &mut self.dispersion {
            ap.reset();
        }
        self.feedback_sample = 0.0;
        self.last_output = 0.0;
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    /// Comb-filter the raw excitation against a tap at the pick point
    /// before it enters the loop, attenuating the harmonics whose nodes
    /// fall there.
    fn pick_filter(&mut self, excitation: f32, pick_position: f32) -> f32 {
        let pick_position = pick_position.clamp(0.0, 1.0);
        self.pick_comb.set_delay((pick_position * self.period_samples * 0.5).max(2.0));
        let tap = self.pick_comb.process(excitation);
        excitation - tap * pick_position
    }

    /// One sample of the closed loop: inject `excitation` (already
    /// pick-filtered), read the delay line, run the tapped output through
    /// the loop filter chain, and store the result as next sample's
    /// feedback.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        excitation: f32,
        pick_position: f32,
        damping: f32,
        stiffness: f32,
        brightness: f32,
        dispersion: f32,
        nonlinearity: f32,
    ) -> f32 {
        let filtered_excitation = self.pick_filter(excitation, pick_position);
        let input_to_delay = filtered_excitation + self.feedback_sample;
        let output = self.delay.process(input_to_delay);

        self.damping.set_cutoff((2000.0 + brightness.clamp(0.0, 1.0) * 16000.0).min(self.sample_rate as f32 * 0.45));
        self.stiffness_lowpass.set_cutoff((1500.0 + brightness.clamp(0.0, 1.0) * 10000.0).min(self.sample_rate as f32 * 0.45));

        let dispersion_coeff = (dispersion.clamp(0.0, 1.0) * 0.7).clamp(-0.97, 0.97);
        self.dispersion[0].set_coeff(dispersion_coeff);
        self.dispersion[1].set_coeff(dispersion_coeff * 0.75);
        self.dispersion[2].set_coeff(dispersion_coeff * 0.5);

        let mut filtered = output;
        for ap in &mut self.dispersion {
            filtered = ap.process(filtered);
        }

        let stiffness_mix = stiffness.clamp(0.0, 1.0);
        let lp = self.stiffness_lowpass.process(filtered);
        let ap = self.stiffness_allpass.process(filtered);
        filtered = lp * stiffness_mix + ap * (1.0 - stiffness_mix);

        filtered = self.damping.process(filtered);
        filtered *= damping.clamp(0.0, 0.9999);

        let drive = 1.0 + nonlinearity.clamp(0.0, 1.0) * 4.0;
        filtered = soft_clip(filtered * drive) / drive.max(1.0);

        self.feedback_sample = if filtered.is_finite() { filtered } else { 0.0 };
        self.last_output = if output.is_finite() { output } else { 0.0 };
        self.last_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plucked_string_decays_and_stays_finite() {
        let mut string = WaveguideString::new(48000.0, 20.0);
        string.set_frequency(110.0);
        let mut peak_early = 0.0f32;
        let mut peak_late = 0.0f32;
        for i in 0..(48000 * 2) {
            let excitation = if i == 0 { 0.8 } else { 0.0 };
            let y = string.process(excitation, 0.2, 0.995, 0.3, 0.5, 0.2, 0.1);
            assert!(y.is_finite());
            if i < 2400 {
                peak_early = peak_early.max(y.abs());
            }
            if i > 48000 {
                peak_late = peak_late.max(y.abs());
            }
        }
        assert!(peak_early > 0.0);
        assert!(peak_late < peak_early);
    }

    #[test]
    fn extreme_frequencies_stay_stable() {
        for frequency in [30.0, 8000.0] {
            let mut string = WaveguideString::new(48000.0, 20.0);
            string.set_frequency(frequency);
            for i in 0..48000 {
                let excitation = if i == 0 { 1.0 } else { 0.0 };
                let y = string.process(excitation, 0.5, 0.99, 0.5, 0.5, 0.3, 0.2);
                assert!(y.is_finite());
            }
        }
    }
}
