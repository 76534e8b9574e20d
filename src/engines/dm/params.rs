//! The handful of voice-bank-wide modifiers named individually in the
//! flat parameter namespace rather than duplicated per
//! track. They bias whichever track's assigned voice kind falls in the
//! matching [`super::kit::DrumFamily`].

#[derive(Debug, Clone, Copy)]
pub struct VoiceModifiers {
    pub kick_pitch: f32,
    pub kick_decay: f32,
    pub kick_click: f32,
    pub snare_tone: f32,
    pub snare_snap: f32,
}

impl Default for VoiceModifiers {
    fn default() -> Self {
        Self {
            kick_pitch: 1.0,
            kick_decay: 1.0,
            kick_click: 1.0,
            snare_tone: 1.0,
            snare_snap: 1.0,
        }
    }
}
