// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::handle_table::Handle,
    runtime::{
        fail::{
            self,
            ResultCode,
        },
        scheduler::{
            fiber_terminated,
            Scheduler,
            CONTESTED,
        },
    },
};
use ::std::sync::{
    atomic::{
        AtomicU32,
        Ordering,
    },
    Arc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Mutual exclusion between fibers. The lock word holds the tag of the owning fiber, plus the contested bit once some
/// fiber waits for it. Uncontended enter and leave never reach the scheduler.
pub struct InternalCriticalSection {
    scheduler: Arc<Scheduler>,
    word: Arc<AtomicU32>,
}

/// Holds an [InternalCriticalSection] until dropped.
pub struct CriticalSectionGuard<'a> {
    section: &'a InternalCriticalSection,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl InternalCriticalSection {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            word: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Blocks until the calling fiber owns the critical section. Entering it twice is fatal.
    pub fn enter(&self) {
        let tag: u32 = self.current_tag();
        loop {
            let current: u32 = match self.word.compare_exchange(0, tag, Ordering::Acquire, Ordering::Acquire) {
                Ok(_) => return,
                Err(current) => current,
            };
            crate::ukern_assert!(current & !CONTESTED != tag, ResultCode::InvalidLockAddressValue);
            if current & CONTESTED == 0
                && self
                    .word
                    .compare_exchange(current, current | CONTESTED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                continue;
            }
            let owner: Handle = Handle::from_raw(current & !CONTESTED);
            if let Err(e) = self.scheduler.arbitrate_lock(owner, &self.word, tag) {
                error!("enter(): {}", e);
                fail::fatal("arbitrate_lock()", file!(), line!(), e.code);
            }
            if self.word.load(Ordering::Acquire) & !CONTESTED == tag {
                return;
            }
        }
    }

    /// Enters the critical section only if it is free.
    pub fn try_enter(&self) -> bool {
        let tag: u32 = self.current_tag();
        self.word
            .compare_exchange(0, tag, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Leaves the critical section, handing it to the first waiter if there is one. Leaving a critical section that
    /// the calling fiber does not own is fatal.
    pub fn leave(&self) {
        let tag: u32 = self.current_tag();
        if self
            .word
            .compare_exchange(tag, 0, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        crate::ukern_assert!(
            self.word.load(Ordering::Acquire) & !CONTESTED == tag,
            ResultCode::InvalidLockAddressValue
        );
        if let Err(e) = self.scheduler.arbitrate_unlock(&self.word) {
            error!("leave(): {}", e);
            fail::fatal("arbitrate_unlock()", file!(), line!(), e.code);
        }
    }

    /// Enters the critical section and leaves it when the guard is dropped.
    pub fn lock(&self) -> CriticalSectionGuard<'_> {
        self.enter();
        CriticalSectionGuard { section: self }
    }

    pub fn is_locked_by_current_thread(&self) -> bool {
        match self.scheduler.current_thread() {
            Ok(handle) => self.word.load(Ordering::Acquire) & !CONTESTED == handle.raw(),
            Err(_) => false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Acquire) != 0
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Lock word, shared with condition variables waiting on this critical section.
    pub fn word(&self) -> &Arc<AtomicU32> {
        &self.word
    }

    /// Tag of the calling fiber. Only fibers can use a critical section.
    pub fn current_tag(&self) -> u32 {
        match self.scheduler.current_thread() {
            Ok(handle) => handle.raw(),
            Err(e) => {
                error!("current_tag(): {}", e);
                fail::fatal("current_thread()", file!(), line!(), e.code)
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<'a> Drop for CriticalSectionGuard<'a> {
    fn drop(&mut self) {
        // A fiber torn down while switched out no longer exists for the scheduler.
        if !fiber_terminated() {
            self.section.leave();
        }
    }
}
