// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::{
        Fail,
        ResultCode,
    },
    scheduler::{
        ArbitrationType,
        Scheduler,
        SignalType,
    },
    timer::Tick,
};
use ::std::{
    sync::{
        atomic::{
            AtomicI32,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    /// Each signal releases a single waiter and the event clears itself.
    Auto,
    /// A signal releases every waiter and the event stays signaled until cleared.
    Manual,
}

/// Event built on address arbitration. Waiters park on the wake id, which every signal bumps after latching the
/// signal, so a waiter that read the wake id before a signal never misses it. Woken auto-reset waiters compete for
/// the latched signal and park again if another waiter consumed it.
pub struct Event {
    scheduler: Arc<Scheduler>,
    mode: ResetMode,
    signaled: AtomicI32,
    wake_id: AtomicI32,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Event {
    pub fn new(scheduler: Arc<Scheduler>, mode: ResetMode) -> Self {
        Self {
            scheduler,
            mode,
            signaled: AtomicI32::new(0),
            wake_id: AtomicI32::new(0),
        }
    }

    pub fn mode(&self) -> ResetMode {
        self.mode
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst) != 0
    }

    /// Wakes every waiter of a manual-reset event. An auto-reset event stays signaled until a single waiter consumes
    /// the signal.
    pub fn signal(&self) {
        self.signaled.store(1, Ordering::SeqCst);
        self.wake_id.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ResetMode::Auto => self.wake(1),
            ResetMode::Manual => self.wake(-1),
        };
    }

    pub fn clear(&self) {
        self.signaled.store(0, Ordering::SeqCst);
    }

    /// Consumes the signal of an auto-reset event, or observes the signal of a manual-reset one, without blocking.
    pub fn try_wait(&self) -> bool {
        match self.mode {
            ResetMode::Auto => self
                .signaled
                .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
            ResetMode::Manual => self.is_signaled(),
        }
    }

    /// Blocks the calling fiber until the event is signaled.
    pub fn wait(&self) -> Result<(), Fail> {
        self.wait_until(Tick::INFINITE)
    }

    /// Blocks the calling fiber until the event is signaled or `timeout` elapses.
    pub fn timed_wait(&self, timeout: Duration) -> Result<(), Fail> {
        self.wait_until(Tick::deadline_after(self.scheduler.now(), Some(timeout)))
    }

    fn wake(&self, count: i32) -> usize {
        match self
            .scheduler
            .signal_to_address(&self.wake_id, SignalType::Signal, 0, count)
        {
            Ok(woken) => woken,
            Err(e) => {
                warn!("wake(): {}", e);
                0
            },
        }
    }

    fn wait_until(&self, deadline: Tick) -> Result<(), Fail> {
        loop {
            if self.try_wait() {
                return Ok(());
            }
            let wake_id: i32 = self.wake_id.load(Ordering::SeqCst);
            if self.try_wait() {
                return Ok(());
            }
            match self
                .scheduler
                .wait_for_address_until(&self.wake_id, ArbitrationType::WaitIfEqual, wake_id, deadline)
            {
                // Signaled since the wake id was read. A manual-reset wake-up counts even if the event was cleared
                // since; an auto-reset one must still win the signal.
                Ok(()) if self.mode == ResetMode::Manual => return Ok(()),
                Ok(()) => {},
                Err(e) if e.code == ResultCode::InvalidWaitAddressValue => {
                    if self.mode == ResetMode::Manual {
                        return Ok(());
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}
