//! ADSR envelope.
//!
//! Stage machine: `Idle -> Attack -> Decay -> Sustain -> Release -> Idle`.
//! `note_off` forces Release from any non-idle stage using the current
//! level as the start, so there's never a level jump at release.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

pub struct AdsrEnvelope {
    sample_rate: f32,
    stage: EnvelopeStage,
    level: f32,
    attack_time: f32,
    decay_time: f32,
    sustain_level: f32,
    release_time: f32,
    release_start_level: f32,
    attack_increment: f32,
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            sample_rate,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            attack_time: 0.01,
            decay_time: 0.1,
            sustain_level: 0.7,
            release_time: 0.2,
            release_start_level: 0.0,
            attack_increment: 0.0,
        };
        env.update_increments();
        env
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
        self.update_increments();
    }

    pub fn set_attack(&mut self, seconds: f32) {
        self.attack_time = seconds.clamp(0.0001, 10.0);
        self.update_increments();
    }

    pub fn set_decay(&mut self, seconds: f32) {
        self.decay_time = seconds.clamp(0.0001, 10.0);
    }

    pub fn set_sustain(&mut self, level: f32) {
        self.sustain_level = level.clamp(0.0, 1.0);
    }

    pub fn set_release(&mut self, seconds: f32) {
        self.release_time = seconds.clamp(0.0001, 10.0);
    }

    fn update_increments(&mut self) {
        self.attack_increment = 1.0 / (self.attack_time * self.sample_rate).max(1.0);
    }

    /// `coeff` such that repeated multiplication by it over `time_seconds`
    /// decays amplitude by 60dB, giving an exponential-like decay/release
    /// curve.
    fn exp_coeff(&self, time_seconds: f32) -> f32 {
        let samples = (time_seconds * self.sample_rate).max(1.0);
        (-6.907_755 / samples).exp() // ln(0.001) ~ -6.907755, i.e. -60 dB
    }

    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    /// Force Release from any non-Idle state using the current level as the
    /// start.
    pub fn note_off(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.release_start_level = self.level;
            self.stage = EnvelopeStage::Release;
        }
    }

    pub fn process(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => self.level = 0.0,
            EnvelopeStage::Attack => {
                self.level += self.attack_increment;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let coeff = self.exp_coeff(self.decay_time);
                self.level = self.sustain_level + (self.level - self.sustain_level) * coeff;
                if (self.level - self.sustain_level).abs() < 0.001 {
                    self.level = self.sustain_level;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.level = self.sustain_level,
            EnvelopeStage::Release => {
                let coeff = self.exp_coeff(self.release_time);
                self.level *= coeff;
                if self.level < 0.0005 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        if !self.level.is_finite() {
            self.level = 0.0;
            self.stage = EnvelopeStage::Idle;
        }
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Reset running state to Idle/0, preserving attack/decay/sustain/
    /// release parameters`).
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_visits_every_stage() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_attack(0.01);
        env.set_decay(0.01);
        env.set_sustain(0.5);
        env.set_release(0.01);
        env.note_on();

        let mut seen = vec![env.stage()];
        for i in 0..20000 {
            env.process();
            if seen.last() != Some(&env.stage()) {
                seen.push(env.stage());
            }
            if env.stage() == EnvelopeStage::Sustain && i > 3000 {
                env.note_off();
            }
            if env.stage() == EnvelopeStage::Idle && seen.len() > 1 {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                EnvelopeStage::Attack,
                EnvelopeStage::Decay,
                EnvelopeStage::Sustain,
                EnvelopeStage::Release,
                EnvelopeStage::Idle,
            ]
        );
    }

    #[test]
    fn note_off_during_attack_releases_from_current_level() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_attack(1.0);
        env.set_release(0.01);
        env.note_on();
        for _ in 0..100 {
            env.process();
        }
        let level_at_release = env.level();
        env.note_off();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        assert_eq!(env.release_start_level, level_at_release);
    }

    #[test]
    fn release_eventually_reaches_idle() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_release(0.05);
        env.note_on();
        for _ in 0..10 {
            env.process();
        }
        env.note_off();
        for _ in 0..(48000.0 * 0.2) as usize {
            env.process();
        }
        assert_eq!(env.stage(), EnvelopeStage::Idle);
        assert_eq!(env.level(), 0.0);
    }
}
