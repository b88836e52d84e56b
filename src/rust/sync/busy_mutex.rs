// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    cell::UnsafeCell,
    hint,
    ops::{
        Deref,
        DerefMut,
    },
    sync::atomic::{
        AtomicU32,
        Ordering,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// One ticket in the "requested" half of the lock word.
const REQUEST_INCREMENT: u32 = 1 << 16;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Ticket spin lock. The lock word packs the next ticket to hand out in its high 16 bits and the ticket currently
/// being served in its low 16 bits. Waiting never involves the fiber scheduler, which makes it safe to use for the
/// scheduler's own bookkeeping.
pub struct BusyMutex<T: ?Sized> {
    tickets: AtomicU32,
    data: UnsafeCell<T>,
}

/// Scoped access to the data protected by a [BusyMutex].
pub struct BusyMutexGuard<'a, T: ?Sized> {
    mutex: &'a BusyMutex<T>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> BusyMutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            tickets: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> BusyMutex<T> {
    /// Takes a ticket and spins until it is served.
    pub fn lock(&self) -> BusyMutexGuard<'_, T> {
        let ticket: u16 = (self.tickets.fetch_add(REQUEST_INCREMENT, Ordering::Acquire) >> 16) as u16;
        while self.tickets.load(Ordering::Acquire) as u16 != ticket {
            hint::spin_loop();
        }
        BusyMutexGuard { mutex: self }
    }

    /// Acquires the lock only if nobody holds or waits for it.
    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, T>> {
        let current: u32 = self.tickets.load(Ordering::Relaxed);
        if (current >> 16) as u16 != current as u16 {
            return None;
        }
        match self.tickets.compare_exchange(
            current,
            current.wrapping_add(REQUEST_INCREMENT),
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => Some(BusyMutexGuard { mutex: self }),
            Err(_) => None,
        }
    }

    /// Whether some ticket is currently being served.
    pub fn is_locked(&self) -> bool {
        let current: u32 = self.tickets.load(Ordering::Relaxed);
        (current >> 16) as u16 != current as u16
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn unlock(&self) {
        // Only the low half advances; a carry must not leak into the requested half.
        let _ = self
            .tickets
            .fetch_update(Ordering::Release, Ordering::Relaxed, |current| {
                Some((current & 0xffff_0000) | (current as u16).wrapping_add(1) as u32)
            });
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

unsafe impl<T: ?Sized + Send> Send for BusyMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for BusyMutex<T> {}

impl<T: Default> Default for BusyMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<'a, T: ?Sized> Deref for BusyMutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard holds the served ticket, so no other reference to the data exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for BusyMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard holds the served ticket, so no other reference to the data exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for BusyMutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
