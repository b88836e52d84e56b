// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Arbitration of contended locks, condition variable keys and address waits.
//!
//! A lock word holds the tag (handle) of its owner, plus [CONTESTED] once some fiber had to wait for it. Waiters of a
//! lock are linked into the waiter list of the owner, so releasing a lock hands it directly to the first waiter that
//! arrived. Key and address waiters are linked into per-address lists in priority order.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::handle_table::Handle,
    runtime::{
        fail::{
            Fail,
            ResultCode,
        },
        scheduler::{
            fiber::ListId,
            state::SchedulerState,
            waitable::WaitableObject,
        },
        timer::Tick,
    },
};
use ::std::sync::{
    atomic::{
        AtomicI32,
        AtomicU32,
        Ordering,
    },
    Arc,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Set in a lock word when at least one fiber waits for the lock. Never part of a handle.
pub const CONTESTED: u32 = 0x4000_0000;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Condition under which `wait_for_address()` blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArbitrationType {
    WaitIfLessThan = 0,
    DecrementAndWaitIfLessThan = 1,
    WaitIfEqual = 2,
}

/// Update applied by `signal_to_address()` before waking waiters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalType {
    Signal = 0,
    SignalAndIncrementIfEqual = 1,
    SignalAndModifyByWaiterCountIfEqual = 2,
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Identity of a shared word in the wait lists.
pub fn word_address<T>(word: &Arc<T>) -> usize {
    Arc::as_ptr(word) as usize
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SchedulerState {
    /// Queues the running fiber at `index` behind the owner of a contested lock. Returns `Ok(false)` if the lock word
    /// changed since the caller looked at it, in which case the caller retries its fast path.
    pub fn arbitrate_lock(&mut self, index: usize, owner: Handle, lock: &Arc<AtomicU32>) -> Result<bool, Fail> {
        if lock.load(Ordering::Acquire) != owner.raw() | CONTESTED {
            return Ok(false);
        }
        let owner_index: usize = match self.handles.get_object_by_handle(owner) {
            Some(&owner_index) => owner_index,
            None => {
                let cause: String = format!("lock owner does not exist (owner={:?})", owner);
                error!("arbitrate_lock(): {}", cause);
                return Err(Fail::new(ResultCode::InvalidHandle, &cause));
            },
        };
        self.link_back(ListId::LockWaiters(owner_index), index);
        let waitable: WaitableObject = WaitableObject::Lock {
            address: word_address(lock),
            lock: lock.clone(),
            owner: owner_index,
        };
        self.begin_wait(index, waitable, Tick::INFINITE);
        Ok(true)
    }

    /// Releases a contested lock held by the fiber at `index`.
    pub fn arbitrate_unlock(&mut self, index: usize, lock: &Arc<AtomicU32>) -> Result<(), Fail> {
        let tag: u32 = self.fibers[index].tag();
        let word: u32 = lock.load(Ordering::Acquire);
        if word & !CONTESTED != tag {
            let cause: String = format!("lock is not held by the caller (word={:#x}, tag={:#x})", word, tag);
            error!("arbitrate_unlock(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidLockAddressValue, &cause));
        }
        self.hand_off_lock(index, lock);
        Ok(())
    }

    /// Passes `lock`, held by `holder`, to its first waiter. The remaining waiters for the same lock follow it to the
    /// new owner's waiter list. Clears the lock word if nobody waits. Returns the new owner.
    pub fn hand_off_lock(&mut self, holder: usize, lock: &Arc<AtomicU32>) -> Option<usize> {
        let address: usize = word_address(lock);
        let waiters: Vec<usize> = self
            .list_members(ListId::LockWaiters(holder))
            .into_iter()
            .filter(|&waiter| self.waiting_lock_address(waiter) == Some(address))
            .collect();

        let Some((&next, rest)) = waiters.split_first() else {
            lock.store(0, Ordering::Release);
            return None;
        };
        for &waiter in &waiters {
            self.unlink(waiter);
        }
        for &waiter in rest {
            self.link_back(ListId::LockWaiters(next), waiter);
            if let WaitableObject::Lock { owner, .. } = &mut self.fibers[waiter].waitable {
                *owner = next;
            }
        }

        let tag: u32 = self.fibers[next].tag();
        let word: u32 = if rest.is_empty() { tag } else { tag | CONTESTED };
        lock.store(word, Ordering::Release);
        trace!("hand_off_lock(): address={:#x}, word={:#x}", address, word);
        self.end_wait(next, Ok(()));
        Some(next)
    }

    /// Releases `lock` and parks the running fiber on the condition variable `key`.
    pub fn wait_key(
        &mut self,
        index: usize,
        key: &Arc<AtomicU32>,
        lock: &Arc<AtomicU32>,
        tag: u32,
        deadline: Tick,
    ) -> Result<(), Fail> {
        let word: u32 = lock.load(Ordering::Acquire);
        if word & !CONTESTED != tag || self.fibers[index].tag() != tag {
            let cause: String = format!("lock is not held by the caller (word={:#x}, tag={:#x})", word, tag);
            error!("wait_key(): {}", cause);
            return Err(Fail::new(ResultCode::RequiresLock, &cause));
        }
        // The key must be published before the lock is released: a fiber entering the free lock without the
        // scheduler lock may signal right away.
        self.link_by_priority(ListId::Key(word_address(key)), index);
        key.store(1, Ordering::Release);
        let waitable: WaitableObject = WaitableObject::Key {
            key: key.clone(),
            lock: lock.clone(),
            tag,
        };
        self.begin_wait(index, waitable, deadline);
        self.hand_off_lock(index, lock);
        Ok(())
    }

    /// Wakes up to `count` waiters of `key`; `count <= 0` wakes them all. Each woken waiter takes its lock if it is
    /// free and queues behind the owner otherwise. Returns the number of woken waiters.
    pub fn signal_key(&mut self, key: &Arc<AtomicU32>, count: i32) -> usize {
        let id: ListId = ListId::Key(word_address(key));
        let mut woken: usize = 0;
        while count <= 0 || woken < count as usize {
            let Some(waiter) = self.pop_front(id) else {
                break;
            };
            woken += 1;
            match self.fibers[waiter].waitable.clone() {
                WaitableObject::Key { lock, tag, .. } => self.reacquire(waiter, lock, tag),
                _ => crate::ukern_assert!(false, ResultCode::InvalidHandle),
            }
        }
        if self.list_len(id) == 0 {
            key.store(0, Ordering::Release);
        }
        woken
    }

    /// Makes a signaled key waiter contend for its lock again. The deadline of the original wait still applies.
    fn reacquire(&mut self, waiter: usize, lock: Arc<AtomicU32>, tag: u32) {
        loop {
            let word: u32 = lock.load(Ordering::Acquire);
            if word == 0 {
                if lock.compare_exchange(0, tag, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                    self.end_wait(waiter, Ok(()));
                    return;
                }
                continue;
            }
            if lock
                .compare_exchange(word, word | CONTESTED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            let owner: Handle = Handle::from_raw(word & !CONTESTED);
            match self.handles.get_object_by_handle(owner) {
                Some(&owner_index) => {
                    self.link_back(ListId::LockWaiters(owner_index), waiter);
                    self.fibers[waiter].waitable = WaitableObject::Lock {
                        address: word_address(&lock),
                        lock,
                        owner: owner_index,
                    };
                },
                None => {
                    warn!("reacquire(): lock owner does not exist (owner={:?})", owner);
                    self.end_wait(waiter, Err(ResultCode::InvalidHandle));
                },
            }
            return;
        }
    }

    /// Checks `address` against `value` and parks the running fiber on it. Fails with `Timeout` right away when the
    /// deadline already passed.
    pub fn wait_for_address(
        &mut self,
        index: usize,
        address: &AtomicI32,
        arbitration: ArbitrationType,
        value: i32,
        deadline: Tick,
        now: Tick,
    ) -> Result<(), Fail> {
        let matches: bool = match arbitration {
            ArbitrationType::WaitIfEqual => address.load(Ordering::Acquire) == value,
            ArbitrationType::WaitIfLessThan => address.load(Ordering::Acquire) < value,
            ArbitrationType::DecrementAndWaitIfLessThan => address
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current: i32| {
                    (current < value).then(|| current.wrapping_sub(1))
                })
                .is_ok(),
        };
        if !matches {
            let cause: String = format!(
                "address value does not match (arbitration={:?}, value={}, current={})",
                arbitration,
                value,
                address.load(Ordering::Relaxed)
            );
            debug!("wait_for_address(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidWaitAddressValue, &cause));
        }
        if deadline <= now {
            return Err(Fail::new(ResultCode::Timeout, "zero timeout"));
        }
        let key: usize = address as *const AtomicI32 as usize;
        self.link_by_priority(ListId::Address(key), index);
        self.begin_wait(index, WaitableObject::Address { address: key }, deadline);
        Ok(())
    }

    /// Optionally updates `address` and wakes up to `count` of its waiters; `count <= 0` wakes them all. Returns the
    /// number of woken waiters.
    pub fn signal_to_address(
        &mut self,
        address: &AtomicI32,
        signal: SignalType,
        value: i32,
        count: i32,
    ) -> Result<usize, Fail> {
        let key: usize = address as *const AtomicI32 as usize;
        let id: ListId = ListId::Address(key);
        let new_value: Option<i32> = match signal {
            SignalType::Signal => None,
            SignalType::SignalAndIncrementIfEqual => Some(value.wrapping_add(1)),
            SignalType::SignalAndModifyByWaiterCountIfEqual => {
                let num_waiters: usize = self.list_len(id);
                Some(if count <= 0 {
                    if num_waiters > 0 {
                        value.wrapping_sub(2)
                    } else {
                        value.wrapping_add(1)
                    }
                } else if num_waiters == 0 {
                    value.wrapping_add(1)
                } else if num_waiters - 1 < count as usize {
                    value.wrapping_sub(1)
                } else {
                    value
                })
            },
        };
        if let Some(new_value) = new_value {
            if let Err(current) = address.compare_exchange(value, new_value, Ordering::AcqRel, Ordering::Acquire) {
                let cause: String = format!(
                    "address value does not match (signal={:?}, value={}, current={})",
                    signal, value, current
                );
                debug!("signal_to_address(): {}", cause);
                return Err(Fail::new(ResultCode::InvalidWaitAddressValue, &cause));
            }
        }

        let mut woken: usize = 0;
        while count <= 0 || woken < count as usize {
            let Some(waiter) = self.pop_front(id) else {
                break;
            };
            self.end_wait(waiter, Ok(()));
            woken += 1;
        }
        Ok(woken)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl TryFrom<u32> for ArbitrationType {
    type Error = Fail;

    fn try_from(value: u32) -> Result<Self, Fail> {
        match value {
            0 => Ok(ArbitrationType::WaitIfLessThan),
            1 => Ok(ArbitrationType::DecrementAndWaitIfLessThan),
            2 => Ok(ArbitrationType::WaitIfEqual),
            _ => {
                let cause: String = format!("invalid arbitration type (value={})", value);
                error!("try_from(): {}", cause);
                Err(Fail::new(ResultCode::InvalidArbitrationType, &cause))
            },
        }
    }
}

impl TryFrom<u32> for SignalType {
    type Error = Fail;

    fn try_from(value: u32) -> Result<Self, Fail> {
        match value {
            0 => Ok(SignalType::Signal),
            1 => Ok(SignalType::SignalAndIncrementIfEqual),
            2 => Ok(SignalType::SignalAndModifyByWaiterCountIfEqual),
            _ => {
                let cause: String = format!("invalid signal type (value={})", value);
                error!("try_from(): {}", cause);
                Err(Fail::new(ResultCode::InvalidSignalType, &cause))
            },
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
