// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::{
            self,
            Fail,
            ResultCode,
        },
        scheduler::Scheduler,
    },
    sync::critical_section::InternalCriticalSection,
};
use ::std::{
    sync::{
        atomic::{
            AtomicU32,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Condition variable paired with an [InternalCriticalSection]. Wake-ups are hints: a woken fiber re-checks its
/// predicate after re-acquiring the critical section.
pub struct InternalConditionVariable {
    scheduler: Arc<Scheduler>,
    /// Non-zero while some fiber waits.
    key: Arc<AtomicU32>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl InternalConditionVariable {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            key: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Atomically leaves `section` and waits for a signal. `section` is held again when this returns.
    pub fn wait(&self, section: &InternalCriticalSection) {
        if let Err(e) = self.timed_wait(section, None) {
            error!("wait(): {}", e);
            fail::fatal("timed_wait()", file!(), line!(), e.code);
        }
    }

    /// Like [Self::wait], giving up after `timeout`. `section` is held again when this returns `Ok` or times out. Any
    /// other error leaves `section` not held, e.g. [ResultCode::InvalidHandle] when a woken waiter finds the section
    /// owned by a fiber that has exited.
    pub fn timed_wait(&self, section: &InternalCriticalSection, timeout: Option<Duration>) -> Result<(), Fail> {
        crate::ukern_assert!(section.is_locked_by_current_thread(), ResultCode::RequiresLock);
        let tag: u32 = section.current_tag();
        match self.scheduler.wait_key(&self.key, section.word(), tag, timeout) {
            Ok(()) => Ok(()),
            Err(e) if e.code == ResultCode::Timeout => {
                section.enter();
                Err(e)
            },
            Err(e) => {
                error!("timed_wait(): {}", e);
                Err(e)
            },
        }
    }

    /// Wakes one waiter.
    pub fn signal(&self) {
        if self.key.load(Ordering::Acquire) != 0 {
            self.scheduler.signal_key(&self.key, 1);
        }
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) {
        if self.key.load(Ordering::Acquire) != 0 {
            self.scheduler.signal_key(&self.key, -1);
        }
    }

    pub fn has_waiters(&self) -> bool {
        self.key.load(Ordering::Acquire) != 0
    }
}
