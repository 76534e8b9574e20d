//! Headless polyphonic instrument DSP core.
//!
//! This crate implements the hard real-time parts of a multi-engine software
//! instrument: voice scheduling and polyphony management, four synthesis
//! cores (virtual-analog, FM, physical-model string, drum machine), and the
//! uniform block-rate contract ([`engine::InstrumentEngine`]) every one of
//! them satisfies.
//!
//! Everything a plugin shell, GUI, audio driver or MIDI transport would add
//! lives outside this crate; hosts talk to engines only through the trait
//! in [`engine`].

pub mod block;
pub mod dsp;
pub mod engine;
pub mod engines;
pub mod error;
pub mod event;
pub mod param;
pub mod preset;
pub mod voice;

pub use block::{BlockDescriptor, SampleFormat};
pub use engine::{EngineKind, InstrumentEngine};
pub use error::SonanceError;
pub use event::{EventPayload, EventQueue, ScheduledEvent};
pub use param::ParameterStore;
