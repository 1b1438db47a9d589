//! Fixed-capacity slab for scenes held on behalf of the host
//!
//! Handles pack a slot index in the low 32 bits and the slot generation in
//! the high 32 bits, so a handle kept after `remove` never reaches the
//! scene that later reuses its slot. Each slot has its own lock; only the
//! free list is shared.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct SceneSlab<T> {
    slots: Vec<Mutex<Slot<T>>>,
    free: Mutex<Vec<usize>>,
    live: AtomicUsize,
}

fn handle(index: usize, generation: u32) -> u64 {
    (u64::from(generation) << 32) | index as u64
}

fn split(handle: u64) -> (usize, u32) {
    ((handle & 0xFFFF_FFFF) as usize, (handle >> 32) as u32)
}

impl<T> SceneSlab<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| {
                    Mutex::new(Slot {
                        generation: 0,
                        value: None,
                    })
                })
                .collect(),
            free: Mutex::new((0..capacity).rev().collect()),
            live: AtomicUsize::new(0),
        }
    }

    /// Store `item`; `None` when every slot is taken
    pub fn insert(&self, item: T) -> Option<u64> {
        let index = self.free.lock().ok()?.pop()?;
        let mut slot = self.slots[index].lock().ok()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(item);
        self.live.fetch_add(1, Ordering::AcqRel);
        Some(handle(index, slot.generation))
    }

    pub fn with_mut<F, R>(&self, handle: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let (index, generation) = split(handle);
        let mut slot = self.slots.get(index)?.lock().ok()?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut().map(f)
    }

    pub fn with<F, R>(&self, handle: u64, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let (index, generation) = split(handle);
        let slot = self.slots.get(index)?.lock().ok()?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref().map(f)
    }

    pub fn remove(&self, handle: u64) -> Option<T> {
        let (index, generation) = split(handle);
        let item = {
            let mut slot = self.slots.get(index)?.lock().ok()?;
            if slot.generation != generation {
                return None;
            }
            slot.value.take()?
        };
        self.live.fetch_sub(1, Ordering::AcqRel);
        if let Ok(mut free) = self.free.lock() {
            free.push(index);
        }
        Some(item)
    }

    /// Number of live entries
    pub fn count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}
