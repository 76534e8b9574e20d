//! `ParameterStore`: a flat string-keyed map of lock-free atomic scalars.
//!
//! Each entry is an `AtomicU32` carrying an `f32`'s bits with relaxed
//! ordering; a separate generation counter uses release/acquire so a
//! preset load's batch of writes is observed as a unit by the audio
//! thread rather than torn mid-publication.

use indexmap::IndexMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Declared bounds for a parameter; every write is clamped to this range
/// before it is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    fn clamp(&self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }
}

struct ParamSlot {
    bits: AtomicU32,
    range: ParamRange,
}

/// A flat `string id -> f32` map with atomic control→audio handoff.
///
/// Reads (`get`) are real-time safe: a single relaxed atomic load, no
/// allocation, no lock. Writes (`set`) clamp to the declared range and
/// store with a relaxed store; `publish()` is called once after a batch of
/// writes (e.g. preset load) to bump the generation counter with Release
/// ordering, and `generation()` / `wait_for_generation` lets the audio
/// thread detect a new batch became visible with Acquire ordering.
pub struct ParameterStore {
    slots: IndexMap<&'static str, ParamSlot>,
    generation: AtomicU64,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self {
            slots: IndexMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Register a parameter identifier with its declared range, storing the
    /// range's default. Intended to be called during engine construction,
    /// never from the audio path.
    pub fn declare(&mut self, id: &'static str, range: ParamRange) {
        self.slots.insert(
            id,
            ParamSlot {
                bits: AtomicU32::new(range.default.to_bits()),
                range,
            },
        );
    }

    /// Unknown id -> no-op.
    pub fn set(&self, id: &str, value: f32) {
        if let Some(slot) = self.slots.get(id) {
            let clamped = slot.range.clamp(value);
            slot.bits.store(clamped.to_bits(), Ordering::Relaxed);
        } else {
            log::debug!("setParameter: unknown id `{id}`, ignored");
        }
    }

    /// Unknown id -> 0.0.
    pub fn get(&self, id: &str) -> f32 {
        self.slots
            .get(id)
            .map(|slot| f32::from_bits(slot.bits.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    pub fn range(&self, id: &str) -> Option<ParamRange> {
        self.slots.get(id).map(|s| s.range)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.slots
            .iter()
            .map(|(id, slot)| (*id, f32::from_bits(slot.bits.load(Ordering::Relaxed))))
    }

    /// Mark a batch of writes as published; the audio thread observes this
    /// with Acquire ordering via [`Self::generation`].
    pub fn publish(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_parameter_set_is_noop_and_get_is_zero() {
        let store = ParameterStore::new();
        store.set("doesNotExist", 5.0);
        assert_eq!(store.get("doesNotExist"), 0.0);
    }

    #[test]
    fn writes_clamp_to_declared_range() {
        let mut store = ParameterStore::new();
        store.declare("cutoff", ParamRange::new(20.0, 20000.0, 1000.0));
        store.set("cutoff", 999_999.0);
        assert_eq!(store.get("cutoff"), 20000.0);
        store.set("cutoff", -5.0);
        assert_eq!(store.get("cutoff"), 20.0);
    }

    #[test]
    fn clamp_is_idempotent() {
        let mut store = ParameterStore::new();
        store.declare("x", ParamRange::new(0.0, 1.0, 0.0));
        store.set("x", 5.0);
        let once = store.get("x");
        store.set("x", 5.0);
        assert_eq!(store.get("x"), once);
    }

    #[test]
    fn nan_writes_fall_back_to_default() {
        let mut store = ParameterStore::new();
        store.declare("x", ParamRange::new(0.0, 1.0, 0.5));
        store.set("x", f32::NAN);
        assert_eq!(store.get("x"), 0.5);
    }

    #[test]
    fn publish_bumps_generation() {
        let store = ParameterStore::new();
        let g0 = store.generation();
        store.publish();
        assert_eq!(store.generation(), g0 + 1);
    }
}
