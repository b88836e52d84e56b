// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Bounded table that maps opaque handles to objects.
//!
//! A handle packs a slot index and the slot's generation into one 32-bit value:
//!
//! ```text
//!  31  30 29            15 14             0
//! +---+---+---------------+----------------+
//! | 0 | 0 |  generation   |     index      |
//! +---+---+---------------+----------------+
//! ```
//!
//! Generations run from 1 to [MAX_GENERATION] and wrap back to 1 when a slot is freed at [MAX_GENERATION], so a handle
//! is never 0 and never has bit 30 set. That keeps handles usable as owner tags in lock words, where bit 30 is the
//! contested flag. A stale handle only resolves again after its slot went through a full generation cycle.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::limits::MAX_HANDLES;
use ::std::fmt;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of bits holding the slot index.
pub const INDEX_BITS: u32 = 15;
/// Number of bits holding the slot generation.
pub const GENERATION_BITS: u32 = 15;
/// Largest generation a slot reaches before wrapping back to 1.
pub const MAX_GENERATION: u16 = (1 << GENERATION_BITS) - 1;

const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Opaque, generation-tagged reference to an object stored in a [HandleTable].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

struct Entry<T> {
    generation: u16,
    object: Option<T>,
    next_free: Option<u16>,
}

/// Fixed-capacity handle table with O(1) reservation, release and lookup.
pub struct HandleTable<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u16>,
    count: usize,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Handle {
    /// A value that never resolves.
    pub const INVALID: Handle = Handle(0);

    fn pack(index: u16, generation: u16) -> Self {
        Self(((generation as u32 & GENERATION_MASK) << INDEX_BITS) | (index as u32 & INDEX_MASK))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    pub fn generation(self) -> u16 {
        ((self.0 >> INDEX_BITS) & GENERATION_MASK) as u16
    }

    /// Whether the value has the shape of an issued handle. Well-formed handles may still be stale.
    pub fn is_well_formed(self) -> bool {
        self.0 >> (INDEX_BITS + GENERATION_BITS) == 0 && self.generation() != 0
    }
}

impl<T> HandleTable<T> {
    /// Creates a table holding up to `capacity` objects. Capacity is clamped to [MAX_HANDLES].
    pub fn new(capacity: usize) -> Self {
        let capacity: usize = capacity.min(MAX_HANDLES);
        let entries: Vec<Entry<T>> = (0..capacity)
            .map(|i| Entry {
                generation: 1,
                object: None,
                next_free: if i + 1 < capacity { Some((i + 1) as u16) } else { None },
            })
            .collect();
        Self {
            entries,
            free_head: if capacity > 0 { Some(0) } else { None },
            count: 0,
        }
    }

    /// Stores `object` in a free slot and returns its handle, or `None` if the table is full.
    pub fn reserve_handle(&mut self, object: T) -> Option<Handle> {
        let index: u16 = self.free_head?;
        let entry: &mut Entry<T> = &mut self.entries[index as usize];
        self.free_head = entry.next_free.take();
        entry.object = Some(object);
        self.count += 1;
        Some(Handle::pack(index, entry.generation))
    }

    /// Releases `handle`. Returns false if it does not name a currently reserved slot.
    pub fn free_handle(&mut self, handle: Handle) -> bool {
        let index: u16 = match self.validate(handle) {
            Some(index) => index,
            None => return false,
        };
        let entry: &mut Entry<T> = &mut self.entries[index as usize];
        entry.object = None;
        entry.generation = if entry.generation >= MAX_GENERATION {
            1
        } else {
            entry.generation + 1
        };
        entry.next_free = self.free_head;
        self.free_head = Some(index);
        self.count -= 1;
        true
    }

    /// Looks up the object named by `handle`. Malformed, stale and unreserved handles resolve to `None`.
    pub fn get_object_by_handle(&self, handle: Handle) -> Option<&T> {
        let index: u16 = self.validate(handle)?;
        self.entries[index as usize].object.as_ref()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn validate(&self, handle: Handle) -> Option<u16> {
        if !handle.is_well_formed() {
            return None;
        }
        let entry: &Entry<T> = self.entries.get(handle.index())?;
        if entry.object.is_some() && entry.generation == handle.generation() {
            Some(handle.index() as u16)
        } else {
            None
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x}: index={}, gen={})", self.0, self.index(), self.generation())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
