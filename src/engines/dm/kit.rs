//! The drum voice bank: 17 concrete synthesis profiles, expressed as one flexible
//! synthesis shape (pitched sine + click + filtered noise) parameterized
//! per kind, rather than 17 hand-written oscillator graphs.

use crate::dsp::FilterType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceKind {
    Kick,
    AltKick,
    Snare,
    AltSnare,
    ClosedHat,
    OpenHat,
    Clap,
    TomLo,
    TomMid,
    TomHi,
    Crash,
    Ride,
    Cowbell,
    Rim,
    Shaker,
    Tambourine,
    Conga,
}

pub const NUM_VOICE_KINDS: usize = 17;
pub const ALL_KINDS: [VoiceKind; NUM_VOICE_KINDS] = [
    VoiceKind::Kick,
    VoiceKind::AltKick,
    VoiceKind::Snare,
    VoiceKind::AltSnare,
    VoiceKind::ClosedHat,
    VoiceKind::OpenHat,
    VoiceKind::Clap,
    VoiceKind::TomLo,
    VoiceKind::TomMid,
    VoiceKind::TomHi,
    VoiceKind::Crash,
    VoiceKind::Ride,
    VoiceKind::Cowbell,
    VoiceKind::Rim,
    VoiceKind::Shaker,
    VoiceKind::Tambourine,
    VoiceKind::Conga,
];

/// Groups voices that share timing-role defaults and Dilla-drift
/// bias terms (`dillaHatBias`, `dillaSnareLate`, `dillaKickTight`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumFamily {
    Kick,
    Snare,
    HiHat,
    Tom,
    Other,
}

impl VoiceKind {
    pub fn from_index(index: i32) -> Self {
        ALL_KINDS[(index.rem_euclid(NUM_VOICE_KINDS as i32)) as usize]
    }

    pub fn to_index(self) -> i32 {
        ALL_KINDS.iter().position(|&k| k == self).unwrap_or(0) as i32
    }

    /// General-MIDI-style mapping starting at note 36.
    pub fn from_midi_note(note: u8) -> Option<Self> {
        let offset = note.checked_sub(36)?;
        ALL_KINDS.get(offset as usize).copied()
    }

    pub fn family(self) -> DrumFamily {
        match self {
            VoiceKind::Kick | VoiceKind::AltKick => DrumFamily::Kick,
            VoiceKind::Snare | VoiceKind::AltSnare | VoiceKind::Clap | VoiceKind::Rim => DrumFamily::Snare,
            VoiceKind::ClosedHat | VoiceKind::OpenHat | VoiceKind::Shaker | VoiceKind::Tambourine => DrumFamily::HiHat,
            VoiceKind::TomLo | VoiceKind::TomMid | VoiceKind::TomHi | VoiceKind::Conga => DrumFamily::Tom,
            VoiceKind::Crash | VoiceKind::Ride | VoiceKind::Cowbell => DrumFamily::Other,
        }
    }
}

/// The fixed synthesis recipe for one voice kind: a pitched sine
/// component with an exponential pitch sweep and its own decay, a
/// filtered-noise component, an optional short click transient, and (for
/// cymbal-like kinds) a handful of inharmonic partials standing in for
/// the sine.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSpec {
    pub base_freq_hz: f32,
    pub pitch_sweep_ratio: f32,
    pub pitch_sweep_ms: f32,
    pub amp_decay_ms: f32,
    pub tonal_amount: f32,
    pub noise_amount: f32,
    pub click_amount: f32,
    pub filter_type: FilterType,
    pub filter_cutoff_hz: f32,
    pub filter_resonance: f32,
    pub metallic_ratios: Option<[f32; 4]>,
}

pub fn voice_spec(kind: VoiceKind) -> VoiceSpec {
    match kind {
        VoiceKind::Kick => VoiceSpec {
            base_freq_hz: 55.0,
            pitch_sweep_ratio: 3.5,
            pitch_sweep_ms: 40.0,
            amp_decay_ms: 280.0,
            tonal_amount: 1.0,
            noise_amount: 0.05,
            click_amount: 0.3,
            filter_type: FilterType::Lowpass,
            filter_cutoff_hz: 2500.0,
            filter_resonance: 0.1,
            metallic_ratios: None,
        },
        VoiceKind::AltKick => VoiceSpec {
            base_freq_hz: 62.0,
            pitch_sweep_ratio: 2.2,
            pitch_sweep_ms: 25.0,
            amp_decay_ms: 180.0,
            tonal_amount: 0.9,
            noise_amount: 0.15,
            click_amount: 0.5,
            filter_type: FilterType::Lowpass,
            filter_cutoff_hz: 3200.0,
            filter_resonance: 0.15,
            metallic_ratios: None,
        },
        VoiceKind::Snare => VoiceSpec {
            base_freq_hz: 180.0,
            pitch_sweep_ratio: 1.3,
            pitch_sweep_ms: 15.0,
            amp_decay_ms: 180.0,
            tonal_amount: 0.45,
            noise_amount: 0.85,
            click_amount: 0.1,
            filter_type: FilterType::Bandpass,
            filter_cutoff_hz: 2200.0,
            filter_resonance: 0.3,
            metallic_ratios: None,
        },
        VoiceKind::AltSnare => VoiceSpec {
            base_freq_hz: 220.0,
            pitch_sweep_ratio: 1.2,
            pitch_sweep_ms: 10.0,
            amp_decay_ms: 130.0,
            tonal_amount: 0.3,
            noise_amount: 1.0,
            click_amount: 0.15,
            filter_type: FilterType::Highpass,
            filter_cutoff_hz: 900.0,
            filter_resonance: 0.2,
            metallic_ratios: None,
        },
        VoiceKind::ClosedHat => VoiceSpec {
            base_freq_hz: 350.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 60.0,
            tonal_amount: 0.15,
            noise_amount: 1.0,
            click_amount: 0.0,
            filter_type: FilterType::Highpass,
            filter_cutoff_hz: 7500.0,
            filter_resonance: 0.25,
            metallic_ratios: Some([1.0, 1.79, 2.61, 3.37]),
        },
        VoiceKind::OpenHat => VoiceSpec {
            base_freq_hz: 350.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 420.0,
            tonal_amount: 0.2,
            noise_amount: 1.0,
            click_amount: 0.0,
            filter_type: FilterType::Highpass,
            filter_cutoff_hz: 6500.0,
            filter_resonance: 0.2,
            metallic_ratios: Some([1.0, 1.79, 2.61, 3.37]),
        },
        VoiceKind::Clap => VoiceSpec {
            base_freq_hz: 900.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 2.0,
            amp_decay_ms: 260.0,
            tonal_amount: 0.1,
            noise_amount: 1.0,
            click_amount: 0.0,
            filter_type: FilterType::Bandpass,
            filter_cutoff_hz: 1600.0,
            filter_resonance: 0.35,
            metallic_ratios: None,
        },
        VoiceKind::TomLo => VoiceSpec {
            base_freq_hz: 90.0,
            pitch_sweep_ratio: 1.6,
            pitch_sweep_ms: 30.0,
            amp_decay_ms: 320.0,
            tonal_amount: 1.0,
            noise_amount: 0.08,
            click_amount: 0.15,
            filter_type: FilterType::Lowpass,
            filter_cutoff_hz: 3000.0,
            filter_resonance: 0.15,
            metallic_ratios: None,
        },
        VoiceKind::TomMid => VoiceSpec {
            base_freq_hz: 140.0,
            pitch_sweep_ratio: 1.5,
            pitch_sweep_ms: 25.0,
            amp_decay_ms: 280.0,
            tonal_amount: 1.0,
            noise_amount: 0.08,
            click_amount: 0.15,
            filter_type: FilterType::Lowpass,
            filter_cutoff_hz: 3400.0,
            filter_resonance: 0.15,
            metallic_ratios: None,
        },
        VoiceKind::TomHi => VoiceSpec {
            base_freq_hz: 200.0,
            pitch_sweep_ratio: 1.4,
            pitch_sweep_ms: 20.0,
            amp_decay_ms: 240.0,
            tonal_amount: 1.0,
            noise_amount: 0.08,
            click_amount: 0.15,
            filter_type: FilterType::Lowpass,
            filter_cutoff_hz: 3800.0,
            filter_resonance: 0.15,
            metallic_ratios: None,
        },
        VoiceKind::Crash => VoiceSpec {
            base_freq_hz: 300.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 2200.0,
            tonal_amount: 0.25,
            noise_amount: 1.0,
            click_amount: 0.0,
            filter_type: FilterType::Highpass,
            filter_cutoff_hz: 5000.0,
            filter_resonance: 0.15,
            metallic_ratios: Some([1.0, 2.13, 3.01, 4.27]),
        },
        VoiceKind::Ride => VoiceSpec {
            base_freq_hz: 420.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 1400.0,
            tonal_amount: 0.55,
            noise_amount: 0.5,
            click_amount: 0.0,
            filter_type: FilterType::Highpass,
            filter_cutoff_hz: 4000.0,
            filter_resonance: 0.2,
            metallic_ratios: Some([1.0, 1.5, 2.0, 3.01]),
        },
        VoiceKind::Cowbell => VoiceSpec {
            base_freq_hz: 560.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 350.0,
            tonal_amount: 1.0,
            noise_amount: 0.0,
            click_amount: 0.2,
            filter_type: FilterType::Bandpass,
            filter_cutoff_hz: 1800.0,
            filter_resonance: 0.3,
            metallic_ratios: Some([1.0, 1.48, 0.0, 0.0]),
        },
        VoiceKind::Rim => VoiceSpec {
            base_freq_hz: 1200.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 40.0,
            tonal_amount: 0.4,
            noise_amount: 0.3,
            click_amount: 0.6,
            filter_type: FilterType::Highpass,
            filter_cutoff_hz: 2500.0,
            filter_resonance: 0.2,
            metallic_ratios: None,
        },
        VoiceKind::Shaker => VoiceSpec {
            base_freq_hz: 600.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 90.0,
            tonal_amount: 0.0,
            noise_amount: 1.0,
            click_amount: 0.0,
            filter_type: FilterType::Bandpass,
            filter_cutoff_hz: 6000.0,
            filter_resonance: 0.25,
            metallic_ratios: None,
        },
        VoiceKind::Tambourine => VoiceSpec {
            base_freq_hz: 700.0,
            pitch_sweep_ratio: 1.0,
            pitch_sweep_ms: 1.0,
            amp_decay_ms: 260.0,
            tonal_amount: 0.25,
            noise_amount: 0.9,
            click_amount: 0.0,
            filter_type: FilterType::Bandpass,
            filter_cutoff_hz: 5500.0,
            filter_resonance: 0.3,
            metallic_ratios: Some([1.0, 1.33, 1.79, 2.4]),
        },
        VoiceKind::Conga => VoiceSpec {
            base_freq_hz: 250.0,
            pitch_sweep_ratio: 1.3,
            pitch_sweep_ms: 18.0,
            amp_decay_ms: 200.0,
            tonal_amount: 1.0,
            noise_amount: 0.05,
            click_amount: 0.1,
            filter_type: FilterType::Lowpass,
            filter_cutoff_hz: 4200.0,
            filter_resonance: 0.1,
            metallic_ratios: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_index() {
        for kind in ALL_KINDS {
            assert_eq!(VoiceKind::from_index(kind.to_index()), kind);
        }
    }

    #[test]
    fn midi_mapping_starts_at_note_36() {
        assert_eq!(VoiceKind::from_midi_note(36), Some(VoiceKind::Kick));
        assert_eq!(VoiceKind::from_midi_note(37), Some(VoiceKind::AltKick));
        assert_eq!(VoiceKind::from_midi_note(35), None);
    }
}
