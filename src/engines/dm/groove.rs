//! The groove stack applied to every scheduled step, in strict order:
//! base grid time, then swing, then the track's timing
//! role (Pocket/Push/Pull), then a seeded "Dilla" drift term. Each layer
//! contributes a signed fraction of one step's duration; the caller
//! multiplies the sum by `samples_per_step` once.
//!
//! The Dilla term is a counter-based hash keyed by `(bar, step, track)`
//! rather than a running RNG, so drift is
//! reproducible for a given pattern position regardless of playback
//! history.

use super::kit::DrumFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingRole {
    Pocket,
    Push,
    Pull,
}

impl TimingRole {
    pub fn from_index(index: i32) -> Self {
        match index.rem_euclid(3) {
            0 => TimingRole::Pocket,
            1 => TimingRole::Push,
            _ => TimingRole::Pull,
        }
    }

    pub fn to_index(self) -> i32 {
        match self {
            TimingRole::Pocket => 0,
            TimingRole::Push => 1,
            TimingRole::Pull => 2,
        }
    }

    /// Default role per voice family.
    pub fn default_for_family(family: DrumFamily) -> Self {
        match family {
            DrumFamily::Kick | DrumFamily::Tom => TimingRole::Pocket,
            DrumFamily::Snare => TimingRole::Pull,
            DrumFamily::HiHat => TimingRole::Push,
            DrumFamily::Other => TimingRole::Pocket,
        }
    }
}

/// Fixed-point counter-based mix (splitmix64's finalizer), used only to
/// turn `(pattern_seed, bar, step, track)` into a reproducible pseudo-random
/// value; not a general-purpose RNG.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

fn uniform_bipolar(pattern_seed: u64, bar: u64, step: usize, track: usize) -> f32 {
    let mixed = pattern_seed
        ^ bar.wrapping_mul(0x9E3779B97F4A7C15)
        ^ (step as u64).wrapping_mul(0xBF58476D1CE4E5B9)
        ^ (track as u64).wrapping_mul(0x94D049BB133111EB);
    let h = splitmix64(mixed);
    (h >> 11) as f32 / (1u64 << 53) as f32 * 2.0 - 1.0
}

#[allow(clippy::too_many_arguments)]
pub fn dilla_drift_fraction(
    pattern_seed: u64,
    bar: u64,
    step: usize,
    track: usize,
    family: DrumFamily,
    amount: f32,
    hat_bias: f32,
    snare_late: f32,
    kick_tight: f32,
    max_drift: f32,
) -> f32 {
    let amount = amount.clamp(0.0, 1.0);
    let max_drift = max_drift.clamp(0.0, 1.0);
    let mut drift = uniform_bipolar(pattern_seed, bar, step, track) * amount;

    match family {
        DrumFamily::HiHat => drift += hat_bias.clamp(-1.0, 1.0) * amount * 0.5,
        DrumFamily::Snare => drift += snare_late.clamp(0.0, 1.0) * amount * 0.5,
        DrumFamily::Kick => drift *= 1.0 - kick_tight.clamp(0.0, 1.0),
        DrumFamily::Tom | DrumFamily::Other => {}
    }

    drift.clamp(-max_drift, max_drift)
}

/// Sum the full groove stack as a signed
/// fraction of one step's duration. The base grid itself is the caller's
/// nominal step time and isn't represented here.
#[allow(clippy::too_many_arguments)]
pub fn groove_offset_fraction(
    step: usize,
    swing: f32,
    role: TimingRole,
    pocket_offset: f32,
    push_offset: f32,
    pull_offset: f32,
    pattern_seed: u64,
    bar: u64,
    track: usize,
    family: DrumFamily,
    dilla_amount: f32,
    dilla_hat_bias: f32,
    dilla_snare_late: f32,
    dilla_kick_tight: f32,
    dilla_max_drift: f32,
) -> f32 {
    let swing_fraction = if step % 2 == 1 { swing.clamp(0.0, 1.0) * 0.5 } else { 0.0 };

    let role_fraction = match role {
        TimingRole::Pocket => pocket_offset,
        TimingRole::Push => push_offset,
        TimingRole::Pull => pull_offset,
    };

    let drift_fraction = dilla_drift_fraction(
        pattern_seed,
        bar,
        step,
        track,
        family,
        dilla_amount,
        dilla_hat_bias,
        dilla_snare_late,
        dilla_kick_tight,
        dilla_max_drift,
    );

    swing_fraction + role_fraction + drift_fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_anticipates_the_grid() {
        let fraction = groove_offset_fraction(
            0, 0.0, TimingRole::Push, 0.0, -0.04, 0.06, 1, 0, 4, DrumFamily::HiHat, 0.0, 0.0, 0.0, 0.0, 0.0,
        );
        assert!(fraction < 0.0);
    }

    #[test]
    fn pull_lags_the_grid() {
        let fraction = groove_offset_fraction(
            0, 0.0, TimingRole::Pull, 0.0, -0.04, 0.06, 1, 0, 2, DrumFamily::Snare, 0.0, 0.0, 0.0, 0.0, 0.0,
        );
        assert!(fraction > 0.0);
    }

    #[test]
    fn same_position_reproduces_identical_drift() {
        let a = dilla_drift_fraction(42, 3, 7, 1, DrumFamily::Other, 1.0, 0.0, 0.0, 0.0, 1.0);
        let b = dilla_drift_fraction(42, 3, 7, 1, DrumFamily::Other, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn kick_tight_reduces_drift_magnitude() {
        let loose = dilla_drift_fraction(9, 1, 5, 0, DrumFamily::Kick, 1.0, 0.0, 0.0, 0.0, 1.0);
        let tight = dilla_drift_fraction(9, 1, 5, 0, DrumFamily::Kick, 1.0, 0.0, 0.0, 0.9, 1.0);
        assert!(tight.abs() <= loose.abs());
    }

    #[test]
    fn drift_never_exceeds_max() {
        for track in 0..16 {
            let d = dilla_drift_fraction(1, 0, 3, track, DrumFamily::Other, 1.0, 0.0, 0.0, 0.0, 0.2);
            assert!(d.abs() <= 0.2 + 1.0e-6);
        }
    }
}
