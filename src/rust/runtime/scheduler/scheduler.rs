// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cooperative fiber scheduler.
//!
//! Fibers are multiplexed over a fixed set of cores. Each core runs one fiber at a time and only switches when the
//! fiber yields, sleeps, blocks on a synchronization primitive or exits. All bookkeeping lives in a
//! [SchedulerState] behind a [BusyMutex], which is never held across a switch.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::handle_table::Handle,
    runtime::{
        config::SchedulerConfig,
        fail::{
            self,
            Fail,
            ResultCode,
        },
        limits::{
            MAX_THREAD_NAME_LEN,
            MIN_STACK_SIZE,
            PRIORITY_DEFAULT,
            PRIORITY_LOWEST,
            STACK_ALIGNMENT,
        },
        scheduler::{
            arbiter::{
                ArbitrationType,
                SignalType,
            },
            context::{
                ContextBaton,
                ExecutionContext,
                FiberExit,
                FiberTerminated,
            },
            core::{
                pin_to_host_cpu,
                CoreChannels,
                CoreMask,
            },
            fiber::{
                ActivityLevel,
                FiberState,
                ListId,
                ThreadFunction,
                ThreadInfo,
                ThreadName,
                WaitResult,
            },
            state::SchedulerState,
            waitable::WaitableObject,
        },
        timer::{
            Clock,
            Tick,
        },
    },
    sync::busy_mutex::{
        BusyMutex,
        BusyMutexGuard,
    },
};
use ::crossbeam_channel::Sender;
use ::std::{
    any::Any,
    cell::{
        Cell,
        RefCell,
    },
    panic::{
        self,
        AssertUnwindSafe,
    },
    rc::Rc,
    sync::{
        atomic::{
            AtomicBool,
            AtomicI32,
            AtomicU32,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Weak,
    },
    thread::{
        self,
        JoinHandle,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Fiber scheduler.
pub struct Scheduler {
    id: usize,
    config: SchedulerConfig,
    clock: Clock,
    this: Weak<Scheduler>,
    running: AtomicBool,
    pub(super) state: BusyMutex<SchedulerState>,
    pub(super) cores: Vec<CoreChannels>,
    core_threads: BusyMutex<Vec<JoinHandle<()>>>,
}

/// What a fiber knows about itself. Lives in a thread-local of the thread backing the fiber.
struct FiberLocal {
    scheduler_id: usize,
    index: usize,
    handle: Handle,
    baton: ContextBaton,
    /// Core that dispatched the fiber most recently.
    dispatcher: Cell<usize>,
    terminated: Cell<bool>,
}

//======================================================================================================================
// Static Variables
//======================================================================================================================

static NEXT_SCHEDULER_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CURRENT_FIBER: RefCell<Option<Rc<FiberLocal>>> = const { RefCell::new(None) };
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Scheduler {
    /// Creates a scheduler and starts one run loop per core.
    pub fn new(config: SchedulerConfig) -> Result<Arc<Self>, Fail> {
        config.validate()?;
        let (cores, kick): (Vec<CoreChannels>, Vec<Sender<()>>) =
            (0..config.num_cores).map(|_| CoreChannels::create()).unzip();
        let state: SchedulerState = SchedulerState::new(config.num_cores, config.max_threads, kick);
        let scheduler: Arc<Self> = Arc::new_cyclic(|this: &Weak<Self>| Self {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            config: config.clone(),
            clock: Clock::new(),
            this: this.clone(),
            running: AtomicBool::new(true),
            state: BusyMutex::new(state),
            cores,
            core_threads: BusyMutex::new(Vec::with_capacity(config.num_cores)),
        });

        for core in 0..config.num_cores {
            let this: Arc<Self> = scheduler.clone();
            match thread::Builder::new()
                .name(format!("ukern-core-{}", core))
                .spawn(move || this.run_core(core))
            {
                Ok(thread) => scheduler.core_threads.lock().push(thread),
                Err(e) => {
                    let cause: String = format!("failed to start core (core={}, error={:?})", core, e);
                    error!("new(): {}", cause);
                    let _ = scheduler.shutdown();
                    return Err(Fail::new(ResultCode::InvalidCoreId, &cause));
                },
            }
        }
        info!(
            "new(): scheduler {} started (num_cores={}, max_threads={})",
            scheduler.id, config.num_cores, config.max_threads
        );
        Ok(scheduler)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current tick.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cores that run fibers.
    pub fn active_cores(&self) -> CoreMask {
        self.state.lock().active_cores
    }

    /// Number of live fibers.
    pub fn num_threads(&self) -> usize {
        self.state.lock().fibers.len()
    }

    //==================================================================================================================
    // Thread Lifecycle
    //==================================================================================================================

    /// Creates a suspended fiber that runs `entry(arg)`.
    pub fn create_thread(
        &self,
        entry: Option<ThreadFunction>,
        arg: usize,
        stack_size: usize,
        priority: u32,
        core: usize,
    ) -> Result<Handle, Fail> {
        let Some(entry) = entry else {
            let cause: &str = "missing thread entry point";
            error!("create_thread(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidThreadFunctionPointer, cause));
        };
        self.create_thread_with(move || entry(arg), stack_size, priority, core)
    }

    /// Creates a suspended fiber that runs a closure.
    pub fn create_thread_with<F>(&self, entry: F, stack_size: usize, priority: u32, core: usize) -> Result<Handle, Fail>
    where
        F: FnOnce() + Send + 'static,
    {
        if stack_size == 0 || stack_size < MIN_STACK_SIZE || stack_size % STACK_ALIGNMENT != 0 {
            let cause: String = format!("invalid stack size (stack_size={})", stack_size);
            error!("create_thread(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidStackSize, &cause));
        }
        let priority: u8 = validate_priority(priority)?;
        let Some(this) = self.this.upgrade() else {
            let cause: &str = "scheduler is gone";
            error!("create_thread(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidHandle, cause));
        };

        let (index, handle): (usize, Handle) = {
            let mut state = self.state.lock();
            if !state.active_cores.contains(core) {
                let cause: String = format!("core is not active (core={})", core);
                error!("create_thread(): {}", cause);
                return Err(Fail::new(ResultCode::InvalidCoreId, &cause));
            }
            let mask: CoreMask = state.active_cores;
            state.insert_fiber(priority, core, mask, stack_size)?
        };

        let name: String = format!("ukern-fiber-{}", handle);
        let body: Box<dyn FnOnce() + Send> = Box::new(entry);
        match ExecutionContext::create(&name, stack_size, move |baton: ContextBaton| {
            this.fiber_main(baton, index, handle, body)
        }) {
            Ok(context) => {
                self.state.lock().fibers[index].context = context;
                debug!(
                    "create_thread(): handle={:?}, priority={}, core={}, stack_size={}",
                    handle, priority, core, stack_size
                );
                Ok(handle)
            },
            Err(e) => {
                let context: ExecutionContext = self.state.lock().exit_fiber(index);
                context.destroy(false);
                Err(e)
            },
        }
    }

    /// Creates and starts a fiber with the default stack size and priority, on the caller's core (or core 0).
    pub fn spawn<F>(&self, entry: F) -> Result<Handle, Fail>
    where
        F: FnOnce() + Send + 'static,
    {
        let core: usize = self.current_core().unwrap_or(0);
        let handle: Handle =
            self.create_thread_with(entry, self.config.default_stack_size, PRIORITY_DEFAULT as u32, core)?;
        self.start_thread(handle)?;
        Ok(handle)
    }

    /// Makes a newly created fiber eligible to run.
    pub fn start_thread(&self, handle: Handle) -> Result<(), Fail> {
        self.set_activity(handle, ActivityLevel::Runnable)
    }

    pub fn suspend_thread(&self, handle: Handle) -> Result<(), Fail> {
        self.set_activity(handle, ActivityLevel::Suspended)
    }

    pub fn resume_thread(&self, handle: Handle) -> Result<(), Fail> {
        self.set_activity(handle, ActivityLevel::Runnable)
    }

    /// Moves a fiber between the runnable and suspended activity levels. A running or waiting fiber is suspended
    /// when it next leaves that state; a fiber suspending itself yields right away.
    pub fn set_activity(&self, handle: Handle, level: ActivityLevel) -> Result<(), Fail> {
        let mut state = self.state.lock();
        let index: usize = state.resolve(handle)?;
        if state.fibers[index].activity == level {
            let cause: String = format!("thread is already at this activity level (level={:?})", level);
            debug!("set_activity(): {}", cause);
            return Err(Fail::new(ResultCode::SameActivityLevel, &cause));
        }
        state.fibers[index].activity = level;
        let fiber_state: FiberState = state.fibers[index].state;
        match level {
            ActivityLevel::Runnable if fiber_state == FiberState::Suspended => {
                state.unlink(index);
                state.make_ready(index);
            },
            ActivityLevel::Suspended if fiber_state == FiberState::Scheduled => {
                state.unlink(index);
                state.fibers[index].state = FiberState::Suspended;
                state.link_back(ListId::Suspended, index);
            },
            _ => {},
        }
        trace!("set_activity(): handle={:?}, level={:?}", handle, level);
        let suspends_itself: bool = level == ActivityLevel::Suspended && fiber_state == FiberState::Running;
        drop(state);

        if suspends_itself && self.current_thread().ok() == Some(handle) {
            self.yield_thread()?;
        }
        Ok(())
    }

    /// Terminates the calling fiber. Locks it holds are handed to their waiters.
    pub fn exit_thread(&self) -> ! {
        if self.current().is_err() {
            fail::fatal("exit_thread() outside of a fiber", file!(), line!(), ResultCode::InvalidHandle);
        }
        panic::resume_unwind(Box::new(FiberExit))
    }

    /// Terminates a fiber. A fiber running on another core is terminated when it next switches out.
    pub fn terminate_thread(&self, handle: Handle) -> Result<(), Fail> {
        if self.current_thread().ok() == Some(handle) {
            self.exit_thread();
        }
        let mut state = self.state.lock();
        let index: usize = state.resolve(handle)?;
        if state.fibers[index].state == FiberState::Running {
            state.fibers[index].exit_requested = true;
            debug!("terminate_thread(): deferred (handle={:?})", handle);
            return Ok(());
        }
        let context: ExecutionContext = state.exit_fiber(index);
        drop(state);
        context.destroy(false);
        debug!("terminate_thread(): handle={:?}", handle);
        Ok(())
    }

    /// Stops all run loops and tears down the remaining fibers. Must not be called from a fiber.
    pub fn shutdown(&self) -> Result<(), Fail> {
        if self.current().is_ok() {
            let cause: &str = "cannot shut down from a fiber";
            error!("shutdown(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidHandle, cause));
        }
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        for kick in &self.state.lock().kick {
            let _ = kick.try_send(());
        }
        let core_threads: Vec<JoinHandle<()>> = self.core_threads.lock().drain(..).collect();
        for core_thread in core_threads {
            if core_thread.join().is_err() {
                warn!("shutdown(): run loop terminated abnormally");
            }
        }
        let contexts: Vec<ExecutionContext> = self.state.lock().drain();
        let num_fibers: usize = contexts.len();
        for context in contexts {
            context.destroy(true);
        }
        info!("shutdown(): scheduler {} stopped ({} fibers torn down)", self.id, num_fibers);
        Ok(())
    }

    //==================================================================================================================
    // Thread Attributes
    //==================================================================================================================

    pub fn set_thread_priority(&self, handle: Handle, priority: u32) -> Result<(), Fail> {
        let priority: u8 = validate_priority(priority)?;
        let mut state = self.state.lock();
        let index: usize = state.resolve(handle)?;
        if state.fibers[index].priority == priority {
            let cause: String = format!("thread already has this priority (priority={})", priority);
            debug!("set_thread_priority(): {}", cause);
            return Err(Fail::new(ResultCode::SamePriority, &cause));
        }
        state.fibers[index].priority = priority;
        // Key and address waiters are kept in priority order.
        if let Some(id @ (ListId::Key(_) | ListId::Address(_))) = state.fibers[index].link.owner() {
            state.unlink(index);
            state.link_by_priority(id, index);
        }
        Ok(())
    }

    pub fn get_thread_priority(&self, handle: Handle) -> Result<u8, Fail> {
        let state = self.state.lock();
        let index: usize = state.resolve(handle)?;
        Ok(state.fibers[index].priority)
    }

    /// Restricts a fiber to the cores of `mask` and moves it to `preferred`. Without a preferred core the fiber stays
    /// where it is if the mask allows it, and moves to the lowest core of the mask otherwise.
    pub fn set_thread_core_mask(&self, handle: Handle, preferred: Option<usize>, mask: CoreMask) -> Result<(), Fail> {
        if mask.is_empty() {
            let cause: &str = "empty core mask";
            error!("set_thread_core_mask(): {}", cause);
            return Err(Fail::new(ResultCode::ValueOutOfRange, cause));
        }
        let mut state = self.state.lock();
        let preferred_is_valid: bool = preferred.map_or(true, |core: usize| mask.contains(core));
        if !mask.is_subset_of(state.active_cores) || !preferred_is_valid {
            let cause: String = format!("core is not active (mask={:?}, preferred={:?})", mask, preferred);
            error!("set_thread_core_mask(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidCoreId, &cause));
        }
        let index: usize = state.resolve(handle)?;
        let old_core: usize = state.fibers[index].core;
        let new_core: usize = match (preferred, mask.first()) {
            (Some(core), _) => core,
            (None, _) if mask.contains(old_core) => old_core,
            (None, Some(core)) => core,
            (None, None) => old_core,
        };
        if state.fibers[index].core_mask == mask && new_core == old_core {
            let cause: String = format!("thread already has this core mask (mask={:?})", mask);
            debug!("set_thread_core_mask(): {}", cause);
            return Err(Fail::new(ResultCode::SameCoreMask, &cause));
        }

        state.fibers[index].core_mask = mask;
        if new_core != old_core {
            let deadline: Tick = state.fibers[index].deadline;
            if state.fibers[index].state == FiberState::Waiting && !deadline.is_infinite() {
                state.timed[old_core].remove(&(deadline, index));
                state.timed[new_core].insert((deadline, index));
            }
            state.fibers[index].core = new_core;
            if state.fibers[index].state == FiberState::Scheduled {
                state.unlink(index);
                state.make_ready(index);
            }
            debug!("set_thread_core_mask(): handle={:?}, core {} -> {}", handle, old_core, new_core);
        }
        Ok(())
    }

    pub fn set_thread_name(&self, handle: Handle, name: &str) -> Result<(), Fail> {
        let Ok(name) = ThreadName::from(name) else {
            let cause: String = format!("thread name is too long (len={}, max={})", name.len(), MAX_THREAD_NAME_LEN);
            error!("set_thread_name(): {}", cause);
            return Err(Fail::new(ResultCode::ValueOutOfRange, &cause));
        };
        let mut state = self.state.lock();
        let index: usize = state.resolve(handle)?;
        state.fibers[index].name = name;
        Ok(())
    }

    /// Snapshot of a fiber's attributes.
    pub fn get_thread_info(&self, handle: Handle) -> Result<ThreadInfo, Fail> {
        let state = self.state.lock();
        let index: usize = state.resolve(handle)?;
        Ok(state.fibers[index].info())
    }

    //==================================================================================================================
    // Calling Fiber
    //==================================================================================================================

    /// Handle of the calling fiber.
    pub fn current_thread(&self) -> Result<Handle, Fail> {
        Ok(self.current()?.handle)
    }

    /// Core running the calling fiber.
    pub fn current_core(&self) -> Result<usize, Fail> {
        Ok(self.current()?.dispatcher.get())
    }

    /// Gives up the core to the other ready fibers of the same core.
    pub fn yield_thread(&self) -> Result<(), Fail> {
        let current: Rc<FiberLocal> = self.current()?;
        let mut state = self.state.lock();
        state.make_ready(current.index);
        let _ = self.switch_out(state, &current);
        Ok(())
    }

    /// Blocks the calling fiber for at least `duration`. A zero duration yields.
    pub fn sleep(&self, duration: Duration) -> Result<(), Fail> {
        if duration.is_zero() {
            return self.yield_thread();
        }
        let current: Rc<FiberLocal> = self.current()?;
        let mut state = self.state.lock();
        let deadline: Tick = Tick::deadline_after(self.now(), Some(duration));
        state.begin_wait(current.index, WaitableObject::Sleep, deadline);
        match self.switch_out(state, &current) {
            Ok(()) | Err(ResultCode::Timeout) => Ok(()),
            Err(code) => Err(Fail::new(code, "sleep interrupted")),
        }
    }

    //==================================================================================================================
    // Arbitration
    //==================================================================================================================

    /// Waits for the contested lock at `lock`, owned by `owner`, to be handed to the calling fiber. Returns right
    /// away if the lock word changed in the meantime.
    pub fn arbitrate_lock(&self, owner: Handle, lock: &Arc<AtomicU32>, tag: u32) -> Result<(), Fail> {
        let current: Rc<FiberLocal> = self.current_tagged(tag)?;
        let mut state = self.state.lock();
        if !state.arbitrate_lock(current.index, owner, lock)? {
            return Ok(());
        }
        wait_outcome(self.switch_out(state, &current), "arbitrate_lock")
    }

    /// Hands the contested lock at `lock` to its next waiter.
    pub fn arbitrate_unlock(&self, lock: &Arc<AtomicU32>) -> Result<(), Fail> {
        let current: Rc<FiberLocal> = self.current()?;
        self.state.lock().arbitrate_unlock(current.index, lock)
    }

    /// Releases `lock` and waits on the condition variable `key` until signaled or until `timeout` elapses. The lock
    /// is held again on success; it is not held after a timeout.
    pub fn wait_key(
        &self,
        key: &Arc<AtomicU32>,
        lock: &Arc<AtomicU32>,
        tag: u32,
        timeout: Option<Duration>,
    ) -> Result<(), Fail> {
        self.wait_key_until(key, lock, tag, Tick::deadline_after(self.now(), timeout))
    }

    pub fn wait_key_until(
        &self,
        key: &Arc<AtomicU32>,
        lock: &Arc<AtomicU32>,
        tag: u32,
        deadline: Tick,
    ) -> Result<(), Fail> {
        let current: Rc<FiberLocal> = self.current_tagged(tag)?;
        let mut state = self.state.lock();
        state.wait_key(current.index, key, lock, tag, deadline)?;
        wait_outcome(self.switch_out(state, &current), "wait_key")
    }

    /// Wakes up to `count` waiters of `key`; `count <= 0` wakes all of them.
    pub fn signal_key(&self, key: &Arc<AtomicU32>, count: i32) -> usize {
        self.state.lock().signal_key(key, count)
    }

    /// Waits until `address` is signaled, provided that its value satisfies `arbitration` against `value`.
    pub fn wait_for_address(
        &self,
        address: &AtomicI32,
        arbitration: ArbitrationType,
        value: i32,
        timeout: Option<Duration>,
    ) -> Result<(), Fail> {
        self.wait_for_address_until(address, arbitration, value, Tick::deadline_after(self.now(), timeout))
    }

    pub fn wait_for_address_until(
        &self,
        address: &AtomicI32,
        arbitration: ArbitrationType,
        value: i32,
        deadline: Tick,
    ) -> Result<(), Fail> {
        let current: Rc<FiberLocal> = self.current()?;
        let mut state = self.state.lock();
        let now: Tick = self.now();
        state.wait_for_address(current.index, address, arbitration, value, deadline, now)?;
        wait_outcome(self.switch_out(state, &current), "wait_for_address")
    }

    /// Updates `address` as `signal` demands and wakes up to `count` of its waiters; `count <= 0` wakes all of them.
    /// Returns the number of woken waiters.
    pub fn signal_to_address(
        &self,
        address: &AtomicI32,
        signal: SignalType,
        value: i32,
        count: i32,
    ) -> Result<usize, Fail> {
        self.state.lock().signal_to_address(address, signal, value, count)
    }

    //==================================================================================================================
    // Switching
    //==================================================================================================================

    /// Resolves the calling fiber.
    fn current(&self) -> Result<Rc<FiberLocal>, Fail> {
        let current: Option<Rc<FiberLocal>> = CURRENT_FIBER.with(|current| current.borrow().clone());
        match current {
            Some(current) if current.scheduler_id == self.id && !current.terminated.get() => Ok(current),
            Some(_) => Err(Fail::new(
                ResultCode::InvalidHandle,
                "calling fiber belongs to another scheduler",
            )),
            None => Err(Fail::new(ResultCode::InvalidHandle, "not called from a fiber")),
        }
    }

    /// Resolves the calling fiber and checks that `tag` is its own.
    fn current_tagged(&self, tag: u32) -> Result<Rc<FiberLocal>, Fail> {
        let current: Rc<FiberLocal> = self.current()?;
        if current.handle.raw() != tag {
            let cause: String = format!("tag does not belong to the caller (tag={:#x})", tag);
            error!("current_tagged(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidHandle, &cause));
        }
        Ok(current)
    }

    /// Gives the core back to its run loop and blocks until the fiber is dispatched again. The caller already moved
    /// the fiber out of the running state. Returns the outcome of the fiber's wait.
    fn switch_out(&self, mut state: BusyMutexGuard<'_, SchedulerState>, current: &FiberLocal) -> WaitResult {
        let index: usize = current.index;
        if state.fibers[index].exit_requested {
            match state.fibers[index].state {
                FiberState::Waiting => state.detach_wait(index),
                _ => state.unlink(index),
            }
            state.fibers[index].state = FiberState::Running;
            drop(state);
            panic::resume_unwind(Box::new(FiberExit));
        }
        state.fibers[index].running_on = None;
        drop(state);

        let core: usize = current.dispatcher.get();
        let _ = self.cores[core].yield_tx.send(());
        match current.baton.wait() {
            Ok(next_core) => {
                if next_core != core && self.config.pin_cores {
                    pin_to_host_cpu(next_core);
                }
                current.dispatcher.set(next_core);
            },
            Err(FiberTerminated) => {
                current.terminated.set(true);
                panic::resume_unwind(Box::new(FiberTerminated));
            },
        }

        let state = self.state.lock();
        let result: WaitResult = state.fibers[index].wait_result;
        drop(state);
        result
    }

    /// Body of the thread backing a fiber.
    fn fiber_main(&self, baton: ContextBaton, index: usize, handle: Handle, entry: Box<dyn FnOnce() + Send>) {
        let Ok(core) = baton.wait() else {
            return;
        };
        let current: Rc<FiberLocal> = Rc::new(FiberLocal {
            scheduler_id: self.id,
            index,
            handle,
            baton,
            dispatcher: Cell::new(core),
            terminated: Cell::new(false),
        });
        CURRENT_FIBER.with(|slot| *slot.borrow_mut() = Some(current.clone()));
        if self.config.pin_cores {
            pin_to_host_cpu(core);
        }

        match panic::catch_unwind(AssertUnwindSafe(entry)) {
            Err(payload) if payload.is::<FiberTerminated>() => {},
            Err(payload) if !payload.is::<FiberExit>() => {
                error!("fiber_main(): fiber panicked (handle={:?}, cause={})", handle, panic_message(&*payload));
                self.exit_current(&current);
            },
            _ => self.exit_current(&current),
        }
        CURRENT_FIBER.with(|slot| *slot.borrow_mut() = None);
    }

    /// Tears down the calling fiber and gives its core back.
    fn exit_current(&self, current: &FiberLocal) {
        let context: ExecutionContext = self.state.lock().exit_fiber(current.index);
        context.destroy(false);
        trace!("exit_current(): handle={:?}", current.handle);
        let _ = self.cores[current.dispatcher.get()].yield_tx.send(());
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Whether the calling fiber is being torn down after its context was destroyed. Code running while such a fiber
/// unwinds must not touch the scheduler.
pub fn fiber_terminated() -> bool {
    CURRENT_FIBER.with(|current| current.borrow().as_ref().is_some_and(|local| local.terminated.get()))
}

fn validate_priority(priority: u32) -> Result<u8, Fail> {
    if priority > PRIORITY_LOWEST as u32 {
        let cause: String = format!("invalid priority (priority={})", priority);
        error!("validate_priority(): {}", cause);
        return Err(Fail::new(ResultCode::InvalidPriority, &cause));
    }
    Ok(priority as u8)
}

fn wait_outcome(result: WaitResult, operation: &str) -> Result<(), Fail> {
    result.map_err(|code: ResultCode| Fail::new(code, &format!("{}() ended with {:?}", operation, code)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown".to_string()
    }
}
