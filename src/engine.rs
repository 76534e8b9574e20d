//! The uniform block-rate contract every synthesis core satisfies, plus
//! `EngineKind`, the tagged enum that gives compile-time dispatch across
//! the four concrete engines.

use crate::block::BlockDescriptor;
use crate::error::SonanceError;
use crate::event::ScheduledEvent;

/// Every synthesis core — VA, FM, PM, DM — implements this trait and
/// nothing else talks to them. The contract forbids blocking, allocation,
/// or error propagation from `process()`, `handle_event()`, and
/// `set_parameter()`; errors in those paths are absorbed locally.
pub trait InstrumentEngine {
    /// Resize internal buffers for the given sample rate/block size.
    /// Idempotent; zeroes voice state but preserves parameters. The only
    /// point besides `load_preset` where allocation is permitted.
    fn prepare(&mut self, sample_rate: f64, block_size: i32) -> Result<(), SonanceError>;

    /// Zero voice state, delay lines, and envelope phases. Parameters are
    /// preserved. Infallible, idempotent.
    fn reset(&mut self);

    /// Enqueue an event for the block that contains its `sample_offset`.
    /// Infallible; unknown event kinds are dropped.
    fn handle_event(&mut self, event: ScheduledEvent);

    /// Render `num_samples` frames into `outputs`, one slice per channel
    /// (planar layout regardless of `descriptor.format` — a host wanting
    /// interleaved output de-interleaves at the boundary, which is outside
    /// this crate's scope). Writes exactly `num_samples` frames per
    /// channel, all finite, in [-1.0, 1.0] after soft clip.
    fn process(&mut self, outputs: &mut [&mut [f32]], descriptor: &BlockDescriptor);

    /// Clamp and store; unknown id is a no-op.
    fn set_parameter(&mut self, id: &str, value: f32);

    /// Current value, or 0.0 for an unknown id.
    fn get_parameter(&self, id: &str) -> f32;

    /// UTF-8 JSON snapshot of parameters and engine-specific tables.
    fn save_preset(&self) -> Result<String, SonanceError>;

    /// Atomic replacement of the parameter set; voices are halted and
    /// reset. On malformed JSON or version mismatch, state is unchanged
    /// and an error is returned.
    fn load_preset(&mut self, json: &str) -> Result<(), SonanceError>;

    /// Count of voices currently producing sound.
    fn active_voice_count(&self) -> usize;

    /// Engine-specific polyphony ceiling (VA=16, FM=16, PM=6, DM=16).
    fn max_polyphony(&self) -> usize;

    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;
}

/// A tagged union over the four concrete engines, giving per-block
/// (not per-sample) dispatch through a single `match` rather than a vtable
/// call inside the innermost sample loop.
pub enum EngineKind {
    Va(crate::engines::va::VaEngine),
    Fm(crate::engines::fm::FmEngine),
    Pm(crate::engines::pm::PmEngine),
    Dm(crate::engines::dm::DmEngine),
}

impl InstrumentEngine for EngineKind {
    fn prepare(&mut self, sample_rate: f64, block_size: i32) -> Result<(), SonanceError> {
        match self {
            EngineKind::Va(e) => e.prepare(sample_rate, block_size),
            EngineKind::Fm(e) => e.prepare(sample_rate, block_size),
            EngineKind::Pm(e) => e.prepare(sample_rate, block_size),
            EngineKind::Dm(e) => e.prepare(sample_rate, block_size),
        }
    }

    fn reset(&mut self) {
        match self {
            EngineKind::Va(e) => e.reset(),
            EngineKind::Fm(e) => e.reset(),
            EngineKind::Pm(e) => e.reset(),
            EngineKind::Dm(e) => e.reset(),
        }
    }

    fn handle_event(&mut self, event: ScheduledEvent) {
        match self {
            EngineKind::Va(e) => e.handle_event(event),
            EngineKind::Fm(e) => e.handle_event(event),
            EngineKind::Pm(e) => e.handle_event(event),
            EngineKind::Dm(e) => e.handle_event(event),
        }
    }

    fn process(&mut self, outputs: &mut [&mut [f32]], descriptor: &BlockDescriptor) {
        match self {
            EngineKind::Va(e) => e.process(outputs, descriptor),
            EngineKind::Fm(e) => e.process(outputs, descriptor),
            EngineKind::Pm(e) => e.process(outputs, descriptor),
            EngineKind::Dm(e) => e.process(outputs, descriptor),
        }
    }

    fn set_parameter(&mut self, id: &str, value: f32) {
        match self {
            EngineKind::Va(e) => e.set_parameter(id, value),
            EngineKind::Fm(e) => e.set_parameter(id, value),
            EngineKind::Pm(e) => e.set_parameter(id, value),
            EngineKind::Dm(e) => e.set_parameter(id, value),
        }
    }

    fn get_parameter(&self, id: &str) -> f32 {
        match self {
            EngineKind::Va(e) => e.get_parameter(id),
            EngineKind::Fm(e) => e.get_parameter(id),
            EngineKind::Pm(e) => e.get_parameter(id),
            EngineKind::Dm(e) => e.get_parameter(id),
        }
    }

    fn save_preset(&self) -> Result<String, SonanceError> {
        match self {
            EngineKind::Va(e) => e.save_preset(),
            EngineKind::Fm(e) => e.save_preset(),
            EngineKind::Pm(e) => e.save_preset(),
            EngineKind::Dm(e) => e.save_preset(),
        }
    }

    fn load_preset(&mut self, json: &str) -> Result<(), SonanceError> {
        match self {
            EngineKind::Va(e) => e.load_preset(json),
            EngineKind::Fm(e) => e.load_preset(json),
            EngineKind::Pm(e) => e.load_preset(json),
            EngineKind::Dm(e) => e.load_preset(json),
        }
    }

    fn active_voice_count(&self) -> usize {
        match self {
            EngineKind::Va(e) => e.active_voice_count(),
            EngineKind::Fm(e) => e.active_voice_count(),
            EngineKind::Pm(e) => e.active_voice_count(),
            EngineKind::Dm(e) => e.active_voice_count(),
        }
    }

    fn max_polyphony(&self) -> usize {
        match self {
            EngineKind::Va(e) => e.max_polyphony(),
            EngineKind::Fm(e) => e.max_polyphony(),
            EngineKind::Pm(e) => e.max_polyphony(),
            EngineKind::Dm(e) => e.max_polyphony(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EngineKind::Va(e) => e.name(),
            EngineKind::Fm(e) => e.name(),
            EngineKind::Pm(e) => e.name(),
            EngineKind::Dm(e) => e.name(),
        }
    }

    fn version(&self) -> &'static str {
        match self {
            EngineKind::Va(e) => e.version(),
            EngineKind::Fm(e) => e.version(),
            EngineKind::Pm(e) => e.version(),
            EngineKind::Dm(e) => e.version(),
        }
    }
}
