//! Fractional-length delay line with Lagrange interpolation,
//! the core building block of the waveguide string.

pub struct FractionalDelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: f32,
}

impl FractionalDelayLine {
    /// `max_delay_samples` should cover `sample_rate / min_frequency` plus
    /// interpolation margin.
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(8)],
            write_pos: 0,
            delay_samples: 1.0,
        }
    }

    pub fn set_delay(&mut self, delay_samples: f32) {
        let max = (self.buffer.len() - 4) as f32;
        self.delay_samples = delay_samples.clamp(2.0, max.max(2.0));
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }

    /// Write `input` and return the delayed, 4-point-Lagrange-interpolated
    /// output for sub-sample pitch accuracy.
    pub fn process(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.write_pos] = if input.is_finite() { input } else { 0.0 };

        let read_pos = self.write_pos as f32 - self.delay_samples;
        let read_pos = if read_pos < 0.0 {
            read_pos + len as f32
        } else {
            read_pos
        };

        let base = read_pos.floor();
        let frac = read_pos - base;
        let base_idx = base as isize;

        let sample = |offset: isize| -> f32 {
            let idx = ((base_idx + offset).rem_euclid(len as isize)) as usize;
            self.buffer[idx]
        };

        // 4-point Lagrange interpolation around taps at -1, 0, 1, 2.
        let x_m1 = sample(-1);
        let x_0 = sample(0);
        let x_1 = sample(1);
        let x_2 = sample(2);

        let c0 = x_0;
        let c1 = x_1 - (1.0 / 3.0) * x_m1 - 0.5 * x_0 - (1.0 / 6.0) * x_2;
        let c2 = 0.5 * (x_m1 + x_1) - x_0;
        let c3 = (1.0 / 6.0) * (x_2 - x_m1) + 0.5 * (x_0 - x_1);

        let output = ((c3 * frac + c2) * frac + c1) * frac + c0;

        self.write_pos = (self.write_pos + 1) % len;

        if output.is_finite() {
            output
        } else {
            self.clear();
            0.0
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_an_impulse_by_roughly_the_set_length() {
        let mut dl = FractionalDelayLine::new(64);
        dl.set_delay(10.0);
        for i in 0..30 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            let out = dl.process(input);
            if i < 8 {
                assert!(out.abs() < 0.3, "early leak at {i}: {out}");
            }
        }
    }

    #[test]
    fn fractional_delay_stays_finite() {
        let mut dl = FractionalDelayLine::new(64);
        dl.set_delay(10.37);
        for i in 0..1000 {
            let x = (i as f32 * 0.1).sin();
            let out = dl.process(x);
            assert!(out.is_finite());
        }
    }

    #[test]
    fn max_delay_is_bounded_by_capacity() {
        let mut dl = FractionalDelayLine::new(16);
        dl.set_delay(10_000.0);
        assert!(dl.delay_samples <= 16.0);
    }
}
