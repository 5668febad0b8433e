//! The semantic value stack.

use std::collections::TryReserveError;

/// Storage for one frame of semantic values per live rule invocation.
///
/// Frames are pushed contiguously, so a frame is identified by its base index.
/// Popping only moves the logical top; slots above it stay allocated for reuse
/// by later invocations. Growth copies into a larger backing store, so indices
/// held by outstanding frames remain valid.
#[derive(Debug)]
pub(crate) struct ValueStack<V> {
    /// Slot storage. Always at least `top` long.
    slots: Vec<V>,
    /// The first free slot.
    top: usize,
}

impl<V: Default> ValueStack<V> {
    /// Creates an empty value stack with room for `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve(capacity)?;
        Ok(Self { slots, top: 0 })
    }

    /// Pushes a frame of `size` slots and returns its base index.
    pub fn push(&mut self, size: usize) -> Result<usize, TryReserveError> {
        let base = self.top;
        self.ensure(base + size)?;
        self.top = base + size;
        Ok(base)
    }

    /// Makes sure slots up to `len` are allocated, without moving the top.
    pub fn ensure(&mut self, len: usize) -> Result<(), TryReserveError> {
        if len > self.slots.len() {
            self.slots.try_reserve(len - self.slots.len())?;
            self.slots.resize_with(len, V::default);
        }
        Ok(())
    }

    /// Pops the frame starting at `base`, along with any frames above it.
    #[inline]
    pub fn pop(&mut self, base: usize) {
        debug_assert!(base <= self.top, "popped a frame that was never pushed");
        self.top = base;
    }

    /// The first free slot index.
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Returns the value in `slot`.
    #[inline]
    pub fn get(&self, slot: usize) -> Option<&V> {
        self.slots.get(slot)
    }

    /// Returns the value in `slot` mutably.
    #[inline]
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut V> {
        self.slots.get_mut(slot)
    }

    /// Stores `value` in `slot`. Returns false if the slot was never allocated.
    #[inline]
    pub fn set(&mut self, slot: usize, value: V) -> bool {
        if let Some(target) = self.slots.get_mut(slot) {
            *target = value;
            true
        } else {
            false
        }
    }

    /// Moves the value out of `slot`, leaving the default value behind.
    #[inline]
    pub fn take(&mut self, slot: usize) -> V {
        self.slots.get_mut(slot).map(core::mem::take).unwrap_or_default()
    }

    /// Resets `size` slots starting at `base` to the default value.
    pub fn reset(&mut self, base: usize, size: usize) {
        let end = (base + size).min(self.slots.len());
        for slot in &mut self.slots[base.min(end)..end] {
            *slot = V::default();
        }
    }
}
