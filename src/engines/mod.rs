//! The four concrete synthesis cores, each implementing
//! [`crate::engine::InstrumentEngine`] and owned by one [`crate::EngineKind`]
//! variant.

pub mod dm;
pub mod fm;
pub mod pm;
pub mod va;
