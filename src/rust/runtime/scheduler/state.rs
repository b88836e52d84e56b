// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Bookkeeping shared by all cores: the fiber arena, the handle table, the ready queues and the wait lists.
//!
//! Everything here runs under the scheduler's [crate::sync::busy_mutex::BusyMutex] and never blocks.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::{
        handle_table::{
            Handle,
            HandleTable,
        },
        index_list::ListHead,
    },
    runtime::{
        fail::{
            Fail,
            ResultCode,
        },
        limits::MAX_HANDLES,
        scheduler::{
            context::ExecutionContext,
            core::CoreMask,
            fiber::{
                ActivityLevel,
                FiberRecord,
                FiberState,
                ListId,
            },
            waitable::WaitableObject,
        },
        timer::Tick,
    },
};
use ::crossbeam_channel::Sender;
use ::slab::Slab;
use ::std::{
    collections::{
        BTreeSet,
        HashMap,
    },
    mem,
};

//======================================================================================================================
// Structures
//======================================================================================================================

pub struct SchedulerState {
    pub fibers: Slab<FiberRecord>,
    pub max_threads: usize,
    pub handles: HandleTable<usize>,
    /// One ready queue per core, in arrival order.
    pub ready: Vec<ListHead>,
    pub suspended: ListHead,
    pub key_waiters: HashMap<usize, ListHead>,
    pub address_waiters: HashMap<usize, ListHead>,
    /// Finite deadlines of waiting fibers, per core.
    pub timed: Vec<BTreeSet<(Tick, usize)>>,
    pub active_cores: CoreMask,
    /// Wakes an idle core.
    pub kick: Vec<Sender<()>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SchedulerState {
    pub fn new(num_cores: usize, max_threads: usize, kick: Vec<Sender<()>>) -> Self {
        Self {
            fibers: Slab::with_capacity(max_threads),
            max_threads,
            handles: HandleTable::new(MAX_HANDLES),
            ready: vec![ListHead::new(); num_cores],
            suspended: ListHead::new(),
            key_waiters: HashMap::new(),
            address_waiters: HashMap::new(),
            timed: vec![BTreeSet::new(); num_cores],
            active_cores: CoreMask::all(num_cores),
            kick,
        }
    }

    /// Resolves a handle into an arena index.
    pub fn resolve(&self, handle: Handle) -> Result<usize, Fail> {
        match self.handles.get_object_by_handle(handle) {
            Some(&index) => Ok(index),
            None => {
                let cause: String = format!("invalid thread handle (handle={:?})", handle);
                warn!("resolve(): {}", cause);
                Err(Fail::new(ResultCode::InvalidHandle, &cause))
            },
        }
    }

    /// Allocates a record and a handle for a new fiber. The fiber starts suspended.
    pub fn insert_fiber(
        &mut self,
        priority: u8,
        core: usize,
        core_mask: CoreMask,
        stack_size: usize,
    ) -> Result<(usize, Handle), Fail> {
        if self.fibers.len() >= self.max_threads {
            let cause: String = format!("too many threads (max_threads={})", self.max_threads);
            error!("insert_fiber(): {}", cause);
            return Err(Fail::new(ResultCode::ThreadStorageExhaustion, &cause));
        }
        let entry = self.fibers.vacant_entry();
        let index: usize = entry.key();
        let handle: Handle = match self.handles.reserve_handle(index) {
            Some(handle) => handle,
            None => {
                let cause: String = format!("handle table is full (capacity={})", self.handles.capacity());
                error!("insert_fiber(): {}", cause);
                return Err(Fail::new(ResultCode::HandleExhaustion, &cause));
            },
        };
        entry.insert(FiberRecord::new(handle, priority, core, core_mask, stack_size));
        self.link_back(ListId::Suspended, index);
        Ok((index, handle))
    }

    /// Tears a fiber down: detaches it from every list, hands the locks it holds to their next waiters and releases
    /// its handle. Returns the fiber's execution context, which the caller destroys outside of the scheduler lock.
    pub fn exit_fiber(&mut self, index: usize) -> ExecutionContext {
        match self.fibers[index].state {
            FiberState::Waiting => self.detach_wait(index),
            _ => self.unlink(index),
        }
        self.fibers[index].state = FiberState::Exiting;

        while let Some(waiter) = self.fibers[index].waiters.front() {
            match self.fibers[waiter].waitable.lock() {
                Some(lock) => {
                    self.hand_off_lock(index, &lock);
                },
                None => {
                    // Only lock waiters are ever linked into a waiter list.
                    crate::ukern_assert!(false, ResultCode::InvalidHandle);
                },
            }
        }

        let handle: Handle = self.fibers[index].handle;
        if !self.handles.free_handle(handle) {
            warn!("exit_fiber(): stale handle (handle={:?})", handle);
        }
        let record: FiberRecord = self.fibers.remove(index);
        trace!("exit_fiber(): handle={:?}", handle);
        record.context
    }

    /// Puts a fiber back where the run loop can find it: its core's ready queue, or the suspended list if a
    /// suspension was requested.
    pub fn make_ready(&mut self, index: usize) {
        if self.fibers[index].activity == ActivityLevel::Suspended {
            self.fibers[index].state = FiberState::Suspended;
            self.link_back(ListId::Suspended, index);
            return;
        }
        self.fibers[index].state = FiberState::Scheduled;
        let core: usize = self.fibers[index].core;
        self.link_back(ListId::Ready(core), index);
        // A pending kick is as good as a new one.
        let _ = self.kick[core].try_send(());
    }

    /// Whether `index` may run on `core` right now. An elapsed deadline cancels the fiber's wait with a timeout.
    pub fn is_schedulable(&mut self, index: usize, core: usize, now: Tick) -> bool {
        let fiber: &FiberRecord = &self.fibers[index];
        if !fiber.core_mask.contains(core) {
            return false;
        }
        match fiber.state {
            FiberState::Scheduled => true,
            FiberState::Waiting if fiber.deadline <= now => {
                self.cancel_wait(index, ResultCode::Timeout);
                self.fibers[index].state == FiberState::Scheduled
            },
            _ => false,
        }
    }

    /// Expires the elapsed waits of `core` and takes the best ready fiber off its queue: lowest priority value
    /// first, arrival order among equals.
    pub fn select_next(&mut self, core: usize, now: Tick) -> Option<usize> {
        let expired: Vec<usize> = self.timed[core]
            .range(..=(now, usize::MAX))
            .map(|&(_, index)| index)
            .collect();
        for index in expired {
            self.is_schedulable(index, core, now);
        }

        let mut best: Option<(u8, usize)> = None;
        for index in self.ready[core].iter::<ListId, _>(&self.fibers) {
            let fiber: &FiberRecord = &self.fibers[index];
            if fiber.state != FiberState::Scheduled || !fiber.core_mask.contains(core) {
                continue;
            }
            match best {
                Some((priority, _)) if priority <= fiber.priority => {},
                _ => best = Some((fiber.priority, index)),
            }
        }

        let (_, index) = best?;
        self.unlink(index);
        Some(index)
    }

    /// Earliest finite deadline among the waiters of `core`.
    pub fn next_deadline(&self, core: usize) -> Option<Tick> {
        self.timed[core].first().map(|&(deadline, _)| deadline)
    }

    /// Unlinks a fiber from whatever list currently holds it.
    pub fn unlink(&mut self, index: usize) {
        if let Some(owner) = self.fibers[index].link.owner() {
            self.with_list(owner, |list: &mut ListHead, fibers: &mut Slab<FiberRecord>| {
                list.remove::<ListId, _>(fibers, index)
            });
        }
    }

    pub fn link_back(&mut self, id: ListId, index: usize) {
        self.with_list(id, |list: &mut ListHead, fibers: &mut Slab<FiberRecord>| {
            list.push_back(fibers, index, id)
        });
    }

    /// Links a fiber in priority order, after every fiber of equal or better priority.
    pub fn link_by_priority(&mut self, id: ListId, index: usize) {
        let priority: u8 = self.fibers[index].priority;
        self.with_list(id, |list: &mut ListHead, fibers: &mut Slab<FiberRecord>| {
            let before: Option<usize> = list
                .iter::<ListId, _>(&*fibers)
                .find(|&other| fibers[other].priority > priority);
            list.insert_before(fibers, index, before, id);
        });
    }

    pub fn pop_front(&mut self, id: ListId) -> Option<usize> {
        self.with_list(id, |list: &mut ListHead, fibers: &mut Slab<FiberRecord>| {
            list.pop_front::<ListId, _>(fibers)
        })
    }

    pub fn list_len(&self, id: ListId) -> usize {
        match id {
            ListId::Ready(core) => self.ready[core].len(),
            ListId::Suspended => self.suspended.len(),
            ListId::LockWaiters(owner) => self.fibers[owner].waiters.len(),
            ListId::Key(key) => self.key_waiters.get(&key).map_or(0, ListHead::len),
            ListId::Address(address) => self.address_waiters.get(&address).map_or(0, ListHead::len),
        }
    }

    /// Indices of the members of a list, front to back.
    pub fn list_members(&self, id: ListId) -> Vec<usize> {
        let list: ListHead = match id {
            ListId::Ready(core) => self.ready[core],
            ListId::Suspended => self.suspended,
            ListId::LockWaiters(owner) => self.fibers[owner].waiters,
            ListId::Key(key) => self.key_waiters.get(&key).copied().unwrap_or_default(),
            ListId::Address(address) => self.address_waiters.get(&address).copied().unwrap_or_default(),
        };
        list.iter::<ListId, _>(&self.fibers).collect()
    }

    /// Moves the head of a list out, runs `f` over it together with the arena and puts it back. Heads of keyed
    /// lists are dropped once empty.
    fn with_list<R, F>(&mut self, id: ListId, f: F) -> R
    where
        F: FnOnce(&mut ListHead, &mut Slab<FiberRecord>) -> R,
    {
        let mut list: ListHead = match id {
            ListId::Ready(core) => mem::take(&mut self.ready[core]),
            ListId::Suspended => mem::take(&mut self.suspended),
            ListId::LockWaiters(owner) => mem::take(&mut self.fibers[owner].waiters),
            ListId::Key(key) => self.key_waiters.remove(&key).unwrap_or_default(),
            ListId::Address(address) => self.address_waiters.remove(&address).unwrap_or_default(),
        };
        let result: R = f(&mut list, &mut self.fibers);
        match id {
            ListId::Ready(core) => self.ready[core] = list,
            ListId::Suspended => self.suspended = list,
            ListId::LockWaiters(owner) => self.fibers[owner].waiters = list,
            ListId::Key(key) => {
                if !list.is_empty() {
                    self.key_waiters.insert(key, list);
                }
            },
            ListId::Address(address) => {
                if !list.is_empty() {
                    self.address_waiters.insert(address, list);
                }
            },
        }
        result
    }

    /// Removes every fiber. Used on shutdown.
    pub fn drain(&mut self) -> Vec<ExecutionContext> {
        let contexts: Vec<ExecutionContext> = self.fibers.drain().map(|fiber: FiberRecord| fiber.context).collect();
        self.handles = HandleTable::new(MAX_HANDLES);
        self.ready.iter_mut().for_each(|list: &mut ListHead| *list = ListHead::new());
        self.suspended = ListHead::new();
        self.key_waiters.clear();
        self.address_waiters.clear();
        self.timed.iter_mut().for_each(BTreeSet::clear);
        contexts
    }

    /// Lock waitable of `waiter` if it waits for a lock.
    pub fn waiting_lock_address(&self, waiter: usize) -> Option<usize> {
        match &self.fibers[waiter].waitable {
            WaitableObject::Lock { address, .. } => Some(*address),
            _ => None,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
