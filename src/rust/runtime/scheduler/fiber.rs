// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::{
        handle_table::Handle,
        index_list::{
            LinkArena,
            ListHead,
            ListLink,
        },
    },
    runtime::{
        fail::ResultCode,
        limits::MAX_THREAD_NAME_LEN,
        scheduler::{
            context::ExecutionContext,
            core::CoreMask,
            waitable::WaitableObject,
        },
        timer::Tick,
    },
};
use ::arrayvec::ArrayString;
use ::slab::Slab;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Entry point of a fiber created from a plain function pointer.
pub type ThreadFunction = fn(usize);

/// Inline storage for fiber names.
pub type ThreadName = ArrayString<MAX_THREAD_NAME_LEN>;

/// Outcome of the last wait of a fiber.
pub type WaitResult = Result<(), ResultCode>;

/// Scheduling state of a fiber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FiberState {
    /// Created or suspended; not eligible to run.
    Suspended,
    /// Linked into its core's ready queue.
    Scheduled,
    /// Executing on a core.
    Running,
    /// Blocked on a waitable object or a sleep.
    Waiting,
    /// Torn down. Terminal.
    Exiting,
}

/// Whether a fiber may be picked by the run loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityLevel {
    Runnable,
    Suspended,
}

/// Names every list a fiber can be linked into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListId {
    /// Ready queue of a core.
    Ready(usize),
    /// Global suspended list.
    Suspended,
    /// Waiters for the locks held by the fiber at this arena index.
    LockWaiters(usize),
    /// Condition variable waiters keyed by the address of the key word.
    Key(usize),
    /// Address arbitration waiters keyed by the waited-on address.
    Address(usize),
}

/// Per-fiber state block.
pub struct FiberRecord {
    pub handle: Handle,
    pub name: ThreadName,
    pub priority: u8,
    pub core_mask: CoreMask,
    /// Core whose ready queue this fiber is queued on.
    pub core: usize,
    /// Core currently executing this fiber.
    pub running_on: Option<usize>,
    pub context: ExecutionContext,
    pub stack_size: usize,
    pub state: FiberState,
    pub activity: ActivityLevel,
    /// Set when another fiber terminates this one while it runs; honored at its next yield point.
    pub exit_requested: bool,
    pub link: ListLink<ListId>,
    pub waitable: WaitableObject,
    pub deadline: Tick,
    pub wait_result: WaitResult,
    /// Fibers waiting for locks this fiber holds, in arrival order.
    pub waiters: ListHead,
}

/// Snapshot of a fiber's attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    pub handle: Handle,
    pub name: String,
    pub priority: u8,
    pub core: usize,
    pub core_mask: CoreMask,
    pub state: FiberState,
    pub activity: ActivityLevel,
    pub stack_size: usize,
    pub num_lock_waiters: usize,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl FiberRecord {
    pub fn new(handle: Handle, priority: u8, core: usize, core_mask: CoreMask, stack_size: usize) -> Self {
        let mut name: ThreadName = ThreadName::new();
        // A formatted handle is far shorter than the name capacity.
        let _ = name.try_push_str(&format!("fiber-{}", handle));
        Self {
            handle,
            name,
            priority,
            core_mask,
            core,
            running_on: None,
            context: ExecutionContext::empty(),
            stack_size,
            state: FiberState::Suspended,
            activity: ActivityLevel::Suspended,
            exit_requested: false,
            link: ListLink::new(),
            waitable: WaitableObject::None,
            deadline: Tick::INFINITE,
            wait_result: Ok(()),
            waiters: ListHead::new(),
        }
    }

    /// Tag stored in lock words owned by this fiber.
    pub fn tag(&self) -> u32 {
        self.handle.raw()
    }

    pub fn info(&self) -> ThreadInfo {
        ThreadInfo {
            handle: self.handle,
            name: self.name.to_string(),
            priority: self.priority,
            core: self.core,
            core_mask: self.core_mask,
            state: self.state,
            activity: self.activity,
            stack_size: self.stack_size,
            num_lock_waiters: self.waiters.len(),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl LinkArena<ListId> for Slab<FiberRecord> {
    fn link(&self, index: usize) -> &ListLink<ListId> {
        &self[index].link
    }

    fn link_mut(&mut self, index: usize) -> &mut ListLink<ListId> {
        &mut self[index].link
    }
}
