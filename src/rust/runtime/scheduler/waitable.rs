// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::ResultCode,
    scheduler::{
        arbiter::{
            word_address,
            CONTESTED,
        },
        fiber::{
            FiberState,
            ListId,
            WaitResult,
        },
        state::SchedulerState,
    },
    timer::Tick,
};
use ::std::{
    mem,
    sync::{
        atomic::{
            AtomicU32,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// What a waiting fiber waits for. Decides how the wait is torn down.
#[derive(Clone, Debug, Default)]
pub enum WaitableObject {
    #[default]
    None,
    /// Timed sleep. Not linked into any list.
    Sleep,
    /// Waits for `lock` to be handed over by the fiber at arena index `owner`.
    Lock {
        address: usize,
        lock: Arc<AtomicU32>,
        owner: usize,
    },
    /// Waits on a condition variable key; re-acquires `lock` with `tag` once signaled.
    Key {
        key: Arc<AtomicU32>,
        lock: Arc<AtomicU32>,
        tag: u32,
    },
    /// Waits for a signal to an arbitrary address.
    Address { address: usize },
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl WaitableObject {
    /// Lock word the fiber waits for, if any.
    pub fn lock(&self) -> Option<Arc<AtomicU32>> {
        match self {
            WaitableObject::Lock { lock, .. } => Some(lock.clone()),
            _ => None,
        }
    }
}

impl SchedulerState {
    /// Puts the running fiber at `index` into the waiting state. The caller links it into the list matching
    /// `waitable`.
    pub fn begin_wait(&mut self, index: usize, waitable: WaitableObject, deadline: Tick) {
        let core: usize = self.fibers[index].core;
        let fiber = &mut self.fibers[index];
        fiber.state = FiberState::Waiting;
        fiber.waitable = waitable;
        fiber.deadline = deadline;
        fiber.wait_result = Ok(());
        if !deadline.is_infinite() {
            self.timed[core].insert((deadline, index));
        }
    }

    /// Completes the wait of a fiber that was already taken off its wait list.
    pub fn end_wait(&mut self, index: usize, result: WaitResult) {
        crate::ukern_assert!(!self.fibers[index].link.is_linked(), ResultCode::InvalidHandle);
        self.clear_deadline(index);
        self.fibers[index].waitable = WaitableObject::None;
        self.fibers[index].wait_result = result;
        self.make_ready(index);
    }

    /// Aborts the wait of a fiber with `code`, unlinking it from wherever it waits.
    pub fn cancel_wait(&mut self, index: usize, code: ResultCode) {
        if self.fibers[index].state != FiberState::Waiting {
            return;
        }
        self.detach_wait(index);
        self.fibers[index].wait_result = Err(code);
        self.make_ready(index);
    }

    /// Undoes the bookkeeping of a wait without making the fiber ready. Locks left without waiters lose their
    /// contested bit and keys left without waiters are reset. The fiber's own waiter list is left untouched.
    pub fn detach_wait(&mut self, index: usize) {
        let waitable: WaitableObject = mem::take(&mut self.fibers[index].waitable);
        match waitable {
            WaitableObject::None | WaitableObject::Sleep => {},
            WaitableObject::Lock { address, lock, owner } => {
                self.unlink(index);
                if !self.has_lock_waiter(owner, address) {
                    lock.fetch_and(!CONTESTED, Ordering::AcqRel);
                }
            },
            WaitableObject::Key { key, .. } => {
                self.unlink(index);
                if self.list_len(ListId::Key(word_address(&key))) == 0 {
                    key.store(0, Ordering::Release);
                }
            },
            WaitableObject::Address { .. } => self.unlink(index),
        }
        self.clear_deadline(index);
    }

    /// Whether any fiber still waits for `owner` to release the lock at `address`.
    pub fn has_lock_waiter(&self, owner: usize, address: usize) -> bool {
        self.list_members(ListId::LockWaiters(owner))
            .into_iter()
            .any(|waiter: usize| self.waiting_lock_address(waiter) == Some(address))
    }

    fn clear_deadline(&mut self, index: usize) {
        let fiber = &mut self.fibers[index];
        let deadline: Tick = mem::replace(&mut fiber.deadline, Tick::INFINITE);
        if !deadline.is_infinite() {
            let core: usize = fiber.core;
            self.timed[core].remove(&(deadline, index));
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
