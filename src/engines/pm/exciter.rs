//! The articulation state machine and its per-articulation excitation
//! signal generator: `Idle -> Attack -> Decay ->
//! Sustain(bow only) -> Release -> Idle`, crossfading ~10 ms across an
//! articulation change to avoid clicks.

use crate::dsp::{soft_clip, Noise, OnePole};

const ATTACK_MS: f32 = 4.0;
const DECAY_MS: f32 = 18.0;
const RELEASE_MS: f32 = 12.0;
const CROSSFADE_MS: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Articulation {
    Pluck,
    Bow,
    Scrape,
    Harmonic,
    Damp,
}

impl Articulation {
    pub fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            1 => Articulation::Bow,
            2 => Articulation::Scrape,
            3 => Articulation::Harmonic,
            4 => Articulation::Damp,
            _ => Articulation::Pluck,
        }
    }

    fn sustains(self) -> bool {
        matches!(self, Articulation::Bow | Articulation::Scrape)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// One articulation's independent signal generator: filtered-noise burst
/// for `Pluck`/`Scrape`/`Harmonic`/`Damp`, a friction-driven ramp for
/// `Bow`. Kept small enough that the exciter below can hold two of these
/// side by side during a crossfade.
struct Generator {
    noise: Noise,
    noise_lp: OnePole,
    bow_phase: f32,
}

impl Generator {
    fn new(sample_rate: f32, seed: u64) -> Self {
        let mut noise_lp = OnePole::new(sample_rate);
        noise_lp.set_cutoff(4000.0);
        Self {
            noise: Noise::new(seed),
            noise_lp,
            bow_phase: 0.0,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.noise_lp.set_sample_rate(sample_rate);
    }

    fn sample(
        &mut self,
        articulation: Articulation,
        stage: Stage,
        stage_progress: f32,
        velocity: f32,
        bow_pressure: f32,
        brightness: f32,
        sample_rate: f32,
        fundamental_hz: f32,
    ) -> f32 {
        if stage == Stage::Idle {
            return 0.0;
        }

        self.noise_lp.set_cutoff((1500.0 + brightness.clamp(0.0, 1.0) * 9000.0).max(200.0));

        match articulation {
            Articulation::Pluck | Articulation::Harmonic => {
                let envelope = match stage {
                    Stage::Attack => stage_progress,
                    Stage::Decay => 1.0 - stage_progress,
                    _ => 0.0,
                };
                let raw = self.noise_lp.process(self.noise.next());
                let sharpness = if articulation == Articulation::Harmonic { 0.6 } else { 1.0 };
                raw * envelope * velocity * sharpness
            }
            Articulation::Scrape => {
                let envelope = match stage {
                    Stage::Attack => stage_progress,
                    Stage::Decay | Stage::Sustain => 1.0,
                    Stage::Release => 1.0 - stage_progress,
                    Stage::Idle => 0.0,
                };
                self.noise_lp.process(self.noise.next()) * envelope * velocity * 0.6
            }
            Articulation::Damp => {
                let envelope = match stage {
                    Stage::Attack => stage_progress,
                    Stage::Decay => 1.0 - stage_progress,
                    _ => 0.0,
                };
                self.noise.next() * envelope * velocity * 0.3
            }
            Articulation::Bow => {
                let envelope = match stage {
                    Stage::Attack => stage_progress,
                    Stage::Decay | Stage::Sustain => 1.0,
                    Stage::Release => 1.0 - stage_progress,
                    Stage::Idle => 0.0,
                };
                self.bow_phase += fundamental_hz / sample_rate.max(1.0);
                if self.bow_phase >= 1.0 {
                    self.bow_phase -= 1.0;
                }
                let saw = 2.0 * self.bow_phase - 1.0;
                let friction_noise = self.noise.next() * 0.15;
                soft_clip((saw + friction_noise) * bow_pressure.clamp(0.0, 1.5)) * envelope * velocity
            }
        }
    }
}

/// Drives one string's excitation signal: its own `Idle/Attack/Decay/
/// Sustain/Release` clock plus a crossfade against the previous
/// articulation's generator whenever the articulation changes mid-note.
pub struct Exciter {
    current: Generator,
    previous: Generator,
    articulation: Articulation,
    previous_articulation: Articulation,
    stage: Stage,
    stage_samples: u32,
    crossfade: OnePole,
    sample_rate: f32,
    held: bool,
}

impl Exciter {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        let mut crossfade = OnePole::new(sample_rate);
        crossfade.set_cutoff(1000.0 / CROSSFADE_MS);
        crossfade.reset(1.0);
        Self {
            current: Generator::new(sample_rate, seed),
            previous: Generator::new(sample_rate, seed ^ 0x5DEE_CE66),
            articulation: Articulation::Pluck,
            previous_articulation: Articulation::Pluck,
            stage: Stage::Idle,
            stage_samples: 0,
            crossfade,
            sample_rate,
            held: false,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.current.set_sample_rate(sample_rate);
        self.previous.set_sample_rate(sample_rate);
        self.crossfade = OnePole::new(sample_rate);
        self.crossfade.set_cutoff(1000.0 / CROSSFADE_MS);
        self.crossfade.reset(1.0);
    }

    pub fn trigger(&mut self, articulation: Articulation) {
        if self.stage != Stage::Idle {
            self.previous_articulation = self.articulation;
            std::mem::swap(&mut self.previous, &mut self.current);
            self.crossfade.reset(0.0);
        } else {
            self.crossfade.reset(1.0);
        }
        self.articulation = articulation;
        self.stage = Stage::Attack;
        self.stage_samples = 0;
        self.held = true;
    }

    pub fn release(&mut self) {
        self.held = false;
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
            self.stage_samples = 0;
        }
    }

    pub fn force_idle(&mut self) {
        self.stage = Stage::Idle;
        self.stage_samples = 0;
        self.held = false;
        self.crossfade.reset(1.0);
    }

    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    fn stage_len_samples(&self, stage: Stage) -> u32 {
        let ms = match stage {
            Stage::Attack => ATTACK_MS,
            Stage::Decay => DECAY_MS,
            Stage::Release => RELEASE_MS,
            Stage::Sustain | Stage::Idle => return u32::MAX,
        };
        ((ms * 0.001 * self.sample_rate) as u32).max(1)
    }

    fn advance(&mut self) {
        self.stage_samples += 1;
        let len = self.stage_len_samples(self.stage);
        if self.stage_samples < len {
            return;
        }
        self.stage_samples = 0;
        self.stage = match self.stage {
            Stage::Attack => Stage::Decay,
            Stage::Decay => {
                if self.articulation.sustains() && self.held {
                    Stage::Sustain
                } else {
                    Stage::Idle
                }
            }
            Stage::Sustain => Stage::Sustain,
            Stage::Release => Stage::Idle,
            Stage::Idle => Stage::Idle,
        };
    }

    pub fn process(&mut self, velocity: f32, bow_pressure: f32, brightness: f32, fundamental_hz: f32) -> f32 {
        if self.stage == Stage::Idle {
            return 0.0;
        }
        let len = self.stage_len_samples(self.stage).max(1) as f32;
        let progress = (self.stage_samples as f32 / len).clamp(0.0, 1.0);

        let current_sample = self.current.sample(
            self.articulation,
            self.stage,
            progress,
            velocity,
            bow_pressure,
            brightness,
            self.sample_rate,
            fundamental_hz,
        );

        let fade = self.crossfade.process(1.0);
        let output = if fade < 0.999 {
            let previous_sample = self.previous.sample(
                self.previous_articulation,
                Stage::Release,
                1.0,
                velocity,
                bow_pressure,
                brightness,
                self.sample_rate,
                fundamental_hz,
            );
            previous_sample * (1.0 - fade) + current_sample * fade
        } else {
            current_sample
        };

        self.advance();
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluck_burst_decays_to_idle() {
        let mut exciter = Exciter::new(48000.0, 1);
        exciter.trigger(Articulation::Pluck);
        let mut last_nonzero = 0usize;
        for i in 0..48000 {
            let y = exciter.process(0.8, 0.0, 0.5, 110.0);
            assert!(y.is_finite());
            if y.abs() > 1e-6 {
                last_nonzero = i;
            }
        }
        assert!(last_nonzero < 10000, "pluck exciter should stop well before 48000 samples, stopped at {last_nonzero}");
    }

    #[test]
    fn bow_sustains_while_held() {
        let mut exciter = Exciter::new(48000.0, 2);
        exciter.trigger(Articulation::Bow);
        let mut any_nonzero_late = false;
        for i in 0..20000 {
            let y = exciter.process(0.8, 0.8, 0.5, 220.0);
            if i > 15000 && y.abs() > 1e-4 {
                any_nonzero_late = true;
            }
        }
        assert!(any_nonzero_late, "bow exciter should still be producing signal while held");
    }

    #[test]
    fn release_eventually_reaches_idle() {
        let mut exciter = Exciter::new(48000.0, 3);
        exciter.trigger(Articulation::Bow);
        for _ in 0..5000 {
            exciter.process(0.8, 0.8, 0.5, 220.0);
        }
        exciter.release();
        for _ in 0..5000 {
            exciter.process(0.8, 0.8, 0.5, 220.0);
        }
        assert!(!exciter.is_active());
    }
}
