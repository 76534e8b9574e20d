//! The VA engine's 16-slot modulation matrix and 8 macros.
//!
//! Sources/destinations are closed enumerations rather than runtime
//! pointers-to-parameter: `apply` is a
//! switch writing into the named field of [`super::voice::ModAccumulator`],
//! so routing a new destination never touches the heap.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModSource {
    Lfo1,
    Lfo2,
    FilterEnv,
    AmpEnv,
    Velocity,
    Aftertouch,
    PitchWheel,
    ModWheel,
    Macro1,
    Macro2,
    Macro3,
    Macro4,
    Macro5,
    Macro6,
    Macro7,
    Macro8,
}

impl ModSource {
    const ALL: [ModSource; 16] = [
        ModSource::Lfo1,
        ModSource::Lfo2,
        ModSource::FilterEnv,
        ModSource::AmpEnv,
        ModSource::Velocity,
        ModSource::Aftertouch,
        ModSource::PitchWheel,
        ModSource::ModWheel,
        ModSource::Macro1,
        ModSource::Macro2,
        ModSource::Macro3,
        ModSource::Macro4,
        ModSource::Macro5,
        ModSource::Macro6,
        ModSource::Macro7,
        ModSource::Macro8,
    ];

    /// Preset wire format uses a plain integer index; an index outside the
    /// known set loads as `None`.
    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn to_index(slot: Option<Self>) -> i32 {
        match slot {
            Some(s) => Self::ALL.iter().position(|c| *c == s).map(|i| i as i32).unwrap_or(-1),
            None => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModDestination {
    Osc1Pitch,
    Osc1Warp,
    Osc1PulseWidth,
    Osc1Level,
    Osc2Pitch,
    Osc2Warp,
    Osc2PulseWidth,
    Osc2Level,
    SubLevel,
    NoiseLevel,
    FilterCutoff,
    FilterResonance,
    FilterEnvAmount,
    AmpAttack,
    AmpDecay,
    AmpSustain,
    AmpRelease,
    Lfo1Rate,
    Lfo1Depth,
    Lfo2Rate,
    Lfo2Depth,
}

impl ModDestination {
    const ALL: [ModDestination; 21] = [
        ModDestination::Osc1Pitch,
        ModDestination::Osc1Warp,
        ModDestination::Osc1PulseWidth,
        ModDestination::Osc1Level,
        ModDestination::Osc2Pitch,
        ModDestination::Osc2Warp,
        ModDestination::Osc2PulseWidth,
        ModDestination::Osc2Level,
        ModDestination::SubLevel,
        ModDestination::NoiseLevel,
        ModDestination::FilterCutoff,
        ModDestination::FilterResonance,
        ModDestination::FilterEnvAmount,
        ModDestination::AmpAttack,
        ModDestination::AmpDecay,
        ModDestination::AmpSustain,
        ModDestination::AmpRelease,
        ModDestination::Lfo1Rate,
        ModDestination::Lfo1Depth,
        ModDestination::Lfo2Rate,
        ModDestination::Lfo2Depth,
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn to_index(slot: Option<Self>) -> i32 {
        match slot {
            Some(d) => Self::ALL.iter().position(|c| *c == d).map(|i| i as i32).unwrap_or(-1),
            None => -1,
        }
    }

    /// The additive range a unit-amount, fully-deflected source maps onto
    ///").
    pub fn range(self) -> f32 {
        match self {
            ModDestination::Osc1Pitch | ModDestination::Osc2Pitch => 24.0, // semitones
            ModDestination::Osc1Warp | ModDestination::Osc2Warp => 1.0,
            ModDestination::Osc1PulseWidth | ModDestination::Osc2PulseWidth => 0.49,
            ModDestination::Osc1Level | ModDestination::Osc2Level => 1.0,
            ModDestination::SubLevel | ModDestination::NoiseLevel => 1.0,
            ModDestination::FilterCutoff => 48.0, // semitones of cutoff shift
            ModDestination::FilterResonance => 0.99,
            ModDestination::FilterEnvAmount => 1.0,
            ModDestination::AmpAttack | ModDestination::AmpDecay | ModDestination::AmpRelease => 2.0,
            ModDestination::AmpSustain => 1.0,
            ModDestination::Lfo1Rate | ModDestination::Lfo2Rate => 10.0,
            ModDestination::Lfo1Depth | ModDestination::Lfo2Depth => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModCurve {
    #[default]
    Linear,
    PositiveExp,
    NegativeExp,
    Sine,
}

impl ModCurve {
    const ALL: [ModCurve; 4] = [ModCurve::Linear, ModCurve::PositiveExp, ModCurve::NegativeExp, ModCurve::Sine];

    pub fn from_index(index: i32) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_default()
    }

    pub fn to_index(self) -> i32 {
        Self::ALL.iter().position(|c| *c == self).map(|i| i as i32).unwrap_or(0)
    }

    /// Shape a bipolar/unipolar source value in roughly [-1, 1] before it is
    /// scaled by `amount` and the destination range.
    pub fn apply(self, value: f32) -> f32 {
        match self {
            ModCurve::Linear => value,
            ModCurve::PositiveExp => value.signum() * value.abs().powf(2.0),
            ModCurve::NegativeExp => value.signum() * value.abs().sqrt(),
            ModCurve::Sine => (value * std::f32::consts::FRAC_PI_2).sin(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModSlot {
    pub source: Option<ModSource>,
    pub destination: Option<ModDestination>,
    pub amount: f32,
    pub bipolar: bool,
    pub curve: ModCurve,
}

impl ModSlot {
    /// Final signed contribution this slot adds to its destination, given
    /// the source's current raw value (already bipolar in [-1, 1]).
    pub fn evaluate(&self, source_value: f32) -> Option<(ModDestination, f32)> {
        let dest = self.destination?;
        let v = if self.bipolar { source_value } else { source_value.max(0.0) };
        let shaped = self.curve.apply(v.clamp(-1.0, 1.0));
        Some((dest, shaped * self.amount * dest.range()))
    }
}

/// One of the 8 macro controls; a macro additively nudges up to four base
/// parameters, distinct from the mod matrix's
/// per-sample routing. The macro's `value` in [0,1] maps to `[min, max]`
/// before being scaled by `amount` and added to the base parameter.
#[derive(Debug, Clone, Copy)]
pub struct MacroDestination {
    pub destination: Option<ModDestination>,
    pub amount: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for MacroDestination {
    fn default() -> Self {
        Self {
            destination: None,
            amount: 0.0,
            min: 0.0,
            max: 1.0,
        }
    }
}

impl MacroDestination {
    pub fn contribution(&self, macro_value: f32) -> Option<(ModDestination, f32)> {
        let dest = self.destination?;
        let mapped = self.min + (self.max - self.min) * macro_value.clamp(0.0, 1.0);
        Some((dest, mapped * self.amount))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Macro {
    pub value: f32,
    pub destinations: [MacroDestination; 4],
}
