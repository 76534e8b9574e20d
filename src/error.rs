//! Control-path error types.
//!
//! Per spec, audio-path failures (out-of-range parameters, unknown event
//! types, numerical denormals) are absorbed locally inside `process()` and
//! never surface as `Err` values — they are merely logged at `trace`/`debug`
//! so a host with logging enabled can see they happened. Only the
//! control-path operations (`prepare`, `loadPreset`, `savePreset`) return
//! `Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SonanceError {
    #[error("sample rate {0} out of range [8000, 192000]")]
    SampleRateOutOfRange(f64),

    #[error("block size {0} out of range [1, 8192]")]
    BlockSizeOutOfRange(i32),

    #[error("malformed preset JSON: {0}")]
    MalformedPreset(String),

    #[error("preset engine mismatch: expected `{expected}`, found `{found}`")]
    EngineMismatch { expected: String, found: String },

    #[error("preset version mismatch: engine is `{engine_version}`, preset is `{preset_version}`")]
    VersionMismatch {
        engine_version: String,
        preset_version: String,
    },

    #[error("buffer too small: need at least {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
}
