//! Fixed-capacity slot allocator
//!
//! Slots are handed out lowest index first so that allocation order is
//! deterministic; the free set is a min-heap, so this stays O(log n).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{SlotError, SlotResult};

/// Fixed array of optional occupants.
///
/// Capacity never changes after construction: it matches a device buffer or
/// texture array that was sized up front.
#[derive(Debug, Clone)]
pub struct SlotPool<T> {
    slots: Vec<Option<T>>,
    free: BinaryHeap<Reverse<u32>>,
    usage: u32,
}

impl<T> SlotPool<T> {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).map(Reverse).collect(),
            usage: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of occupied slots
    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn is_full(&self) -> bool {
        self.usage == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.usage == 0
    }

    /// Place `occupant` in the lowest empty slot.
    pub fn allocate(&mut self, occupant: T) -> SlotResult<u32> {
        let Some(Reverse(slot)) = self.free.pop() else {
            return Err(SlotError::CapacityExceeded {
                capacity: self.capacity(),
            });
        };
        debug_assert!(self.slots[slot as usize].is_none());
        self.slots[slot as usize] = Some(occupant);
        self.usage += 1;
        Ok(slot)
    }

    /// Empty a slot and return its former occupant.
    pub fn free(&mut self, slot: u32) -> SlotResult<T> {
        let capacity = self.capacity();
        let entry = self.slots.get_mut(slot as usize).ok_or_else(|| {
            SlotError::InvalidState(format!("slot {} is outside a pool of {}", slot, capacity))
        })?;
        let occupant = entry
            .take()
            .ok_or_else(|| SlotError::InvalidState(format!("slot {} is already free", slot)))?;
        self.free.push(Reverse(slot));
        self.usage -= 1;
        Ok(occupant)
    }

    pub fn occupant_at(&self, slot: u32) -> Option<&T> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    /// Occupied slots in ascending slot order
    pub fn occupied(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, occupant)| occupant.as_ref().map(|o| (slot as u32, o)))
    }
}
