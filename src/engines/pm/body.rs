//! Modal body resonator bank: a fixed set of biquad modes per instrument
//! shape, excited by the shared bridge accumulator. The bank's own resonant frequencies are a property of the
//! instrument body, not of whatever pitch is currently being played.

use crate::dsp::BiquadResonator;

/// Soft wood (classical guitar top), standard wood (steel-string/piano
/// case), hard wood (violin-family tables), and metal (resonator-guitar
/// cone, steel body) damp at different rates — metal rings longer, high
/// modes on wood die fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    SoftWood,
    StandardWood,
    HardWood,
    Metal,
}

impl Material {
    pub fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            1 => Material::StandardWood,
            2 => Material::HardWood,
            3 => Material::Metal,
            _ => Material::SoftWood,
        }
    }

    pub fn to_param(self) -> f32 {
        match self {
            Material::SoftWood => 0.0,
            Material::StandardWood => 1.0,
            Material::HardWood => 2.0,
            Material::Metal => 3.0,
        }
    }

    fn damping_factor(self) -> f32 {
        match self {
            Material::SoftWood => 2.4,
            Material::StandardWood => 1.6,
            Material::HardWood => 1.1,
            Material::Metal => 0.35,
        }
    }

    /// Mode bandwidth in Hz at `frequency_hz`: `Q = frequency / bandwidth`
    ///, scaled so higher modes and softer materials damp
    /// faster.
    fn bandwidth_hz(self, frequency_hz: f32) -> f32 {
        let base = frequency_hz * 0.04;
        let freq_tilt = 1.0 + frequency_hz / 1800.0;
        (base * self.damping_factor() * freq_tilt).max(1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeSpec {
    ratio: f32,
    amplitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPreset {
    Guitar,
    Piano,
    OrchestralString,
}

impl BodyPreset {
    pub fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            1 => BodyPreset::Piano,
            2 => BodyPreset::OrchestralString,
            _ => BodyPreset::Guitar,
        }
    }

    pub fn to_param(self) -> f32 {
        match self {
            BodyPreset::Guitar => 0.0,
            BodyPreset::Piano => 1.0,
            BodyPreset::OrchestralString => 2.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BodyPreset::Guitar => "guitar",
            BodyPreset::Piano => "piano",
            BodyPreset::OrchestralString => "orchestralString",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "guitar" => Some(BodyPreset::Guitar),
            "piano" => Some(BodyPreset::Piano),
            "orchestralString" => Some(BodyPreset::OrchestralString),
            _ => None,
        }
    }

    fn base_frequency_hz(self) -> f32 {
        match self {
            BodyPreset::Guitar => 100.0,
            BodyPreset::Piano => 60.0,
            BodyPreset::OrchestralString => 220.0,
        }
    }

    fn modes(self) -> &'static [ModeSpec] {
        const GUITAR: [ModeSpec; 6] = [
            ModeSpec { ratio: 1.0, amplitude: 1.0 },
            ModeSpec { ratio: 1.8, amplitude: 0.75 },
            ModeSpec { ratio: 2.6, amplitude: 0.5 },
            ModeSpec { ratio: 3.9, amplitude: 0.35 },
            ModeSpec { ratio: 5.4, amplitude: 0.2 },
            ModeSpec { ratio: 7.1, amplitude: 0.12 },
        ];
        const PIANO: [ModeSpec; 7] = [
            ModeSpec { ratio: 1.0, amplitude: 1.0 },
            ModeSpec { ratio: 1.4, amplitude: 0.85 },
            ModeSpec { ratio: 2.1, amplitude: 0.6 },
            ModeSpec { ratio: 3.0, amplitude: 0.45 },
            ModeSpec { ratio: 4.2, amplitude: 0.3 },
            ModeSpec { ratio: 6.0, amplitude: 0.18 },
            ModeSpec { ratio: 8.3, amplitude: 0.1 },
        ];
        const ORCHESTRAL: [ModeSpec; 5] = [
            ModeSpec { ratio: 1.0, amplitude: 1.0 },
            ModeSpec { ratio: 1.6, amplitude: 0.7 },
            ModeSpec { ratio: 2.3, amplitude: 0.5 },
            ModeSpec { ratio: 3.5, amplitude: 0.3 },
            ModeSpec { ratio: 5.0, amplitude: 0.15 },
        ];
        match self {
            BodyPreset::Guitar => &GUITAR,
            BodyPreset::Piano => &PIANO,
            BodyPreset::OrchestralString => &ORCHESTRAL,
        }
    }
}

/// A bank of parallel modal filters fed from the shared bridge
/// accumulator. Shared by every voice of a [`super::PmEngine`] instance,
/// the way a real instrument has one soundboard under many strings.
pub struct BodyResonatorBank {
    modes: Vec<BiquadResonator>,
    sample_rate: f32,
    preset: BodyPreset,
    material: Material,
}

impl BodyResonatorBank {
    pub fn new(sample_rate: f32, preset: BodyPreset, material: Material) -> Self {
        let mut bank = Self {
            modes: Vec::new(),
            sample_rate,
            preset,
            material,
        };
        bank.rebuild();
        bank
    }

    fn rebuild(&mut self) {
        let base = self.preset.base_frequency_hz();
        self.modes = self
            .preset
            .modes()
            .iter()
            .map(|mode| {
                let frequency = base * mode.ratio;
                let q = (frequency / self.material.bandwidth_hz(frequency)).clamp(0.5, 200.0);
                BiquadResonator::new(self.sample_rate, frequency, q, mode.amplitude)
            })
            .collect();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.rebuild();
    }

    pub fn set_preset(&mut self, preset: BodyPreset) {
        if preset != self.preset {
            self.preset = preset;
            self.rebuild();
        }
    }

    pub fn set_material(&mut self, material: Material) {
        if material != self.material {
            self.material = material;
            self.rebuild();
        }
    }

    pub fn reset(&mut self) {
        for mode in &mut self.modes {
            mode.reset();
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let sum: f32 = self.modes.iter_mut().map(|mode| mode.process(input)).sum();
        sum / (self.modes.len().max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_stays_finite_under_impulse() {
        for preset in [BodyPreset::Guitar, BodyPreset::Piano, BodyPreset::OrchestralString] {
            for material in [Material::SoftWood, Material::StandardWood, Material::HardWood, Material::Metal] {
                let mut bank = BodyResonatorBank::new(48000.0, preset, material);
                for i in 0..4800 {
                    let x = if i == 0 { 1.0 } else { 0.0 };
                    assert!(bank.process(x).is_finite());
                }
            }
        }
    }

    #[test]
    fn metal_rings_longer_than_soft_wood() {
        let mut metal = BodyResonatorBank::new(48000.0, BodyPreset::Guitar, Material::Metal);
        let mut wood = BodyResonatorBank::new(48000.0, BodyPreset::Guitar, Material::SoftWood);
        for i in 0..48000 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            metal.process(x);
            wood.process(x);
        }
        let metal_tail = metal.process(0.0).abs();
        let wood_tail = wood.process(0.0).abs();
        assert!(metal_tail >= wood_tail);
    }

    #[test]
    fn preset_name_round_trips() {
        for preset in [BodyPreset::Guitar, BodyPreset::Piano, BodyPreset::OrchestralString] {
            assert_eq!(BodyPreset::from_name(preset.name()), Some(preset));
        }
    }
}
