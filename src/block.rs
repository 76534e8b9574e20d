//! Buffer shape negotiated once at `prepare()` and held for the engine's
//! lifetime until it is re-prepared.

/// Sample memory layout a host hands to / receives from `process()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Each channel's samples are contiguous: `[L0, L1, ..., R0, R1, ...]`.
    Planar,
    /// Samples alternate per frame: `[L0, R0, L1, R1, ...]`.
    Interleaved,
}

/// Fixed at `prepare()`, invariant until the engine is re-prepared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockDescriptor {
    pub sample_rate: f64,
    pub block_size: i32,
    pub num_channels: i32,
    pub format: SampleFormat,
}

impl BlockDescriptor {
    pub fn new(sample_rate: f64, block_size: i32, num_channels: i32, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            block_size,
            num_channels,
            format,
        }
    }

    pub fn stereo(sample_rate: f64, block_size: i32) -> Self {
        Self::new(sample_rate, block_size, 2, SampleFormat::Planar)
    }
}

/// Typed bundle for `prepare()`'s two scalar inputs, so a host has one place
/// to assemble them rather than passing bare `f64`/`i32` around. Does not
/// replace `prepare()` as the configuration entry point — there is no
/// external config file format in scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub block_size: i32,
    /// Override the engine's default voice count; `None` uses the
    /// engine-specific default (VA=16, FM=16, PM=6, DM=16).
    pub max_voices: Option<usize>,
}

impl EngineConfig {
    pub fn new(sample_rate: f64, block_size: i32) -> Self {
        Self {
            sample_rate,
            block_size,
            max_voices: None,
        }
    }
}
