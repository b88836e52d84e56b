// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::common::{
    collect,
    new_scheduler,
    start,
    wait_until,
    wait_until_idle,
    wait_until_waiting,
    PRIORITY,
    RECV_TIMEOUT,
    STACK_SIZE,
};
use ::anyhow::Result;
use ::crossbeam_channel::{
    unbounded,
    Receiver,
    Sender,
};
use ::std::{
    sync::{
        atomic::{
            AtomicBool,
            AtomicI32,
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::{
        Duration,
        Instant,
    },
};
use ::ukern::{
    ensure_eq,
    ensure_neq,
    ActivityLevel,
    ArbitrationType,
    CoreMask,
    FiberState,
    Handle,
    ResultCode,
    Scheduler,
    SignalType,
    ThreadInfo,
};

//======================================================================================================================
// Helpers
//======================================================================================================================

static ENTRY_SUM: AtomicUsize = AtomicUsize::new(0);

fn add_to_entry_sum(arg: usize) {
    ENTRY_SUM.fetch_add(arg, Ordering::SeqCst);
}

/// Occupies `core` until the returned sender is dropped, so that fibers started in the meantime queue up behind it.
fn block_core(scheduler: &Arc<Scheduler>, core: usize) -> Result<Sender<()>> {
    let (gate_tx, gate_rx): (Sender<()>, Receiver<()>) = unbounded();
    let (ready_tx, ready_rx): (Sender<()>, Receiver<()>) = unbounded();
    start(scheduler, 0, core, move || {
        let _ = ready_tx.send(());
        let _ = gate_rx.recv();
    })?;
    ready_rx.recv_timeout(RECV_TIMEOUT)?;
    Ok(gate_tx)
}

//======================================================================================================================
// Lifecycle
//======================================================================================================================

#[test]
fn create_start_and_exit() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;

    let handle: Handle = scheduler.create_thread(Some(add_to_entry_sum), 42, STACK_SIZE, PRIORITY, 1)?;
    let info: ThreadInfo = scheduler.get_thread_info(handle)?;
    ensure_eq!(info.state, FiberState::Suspended);
    ensure_eq!(info.activity, ActivityLevel::Suspended);
    ensure_eq!(info.priority, PRIORITY as u8);
    ensure_eq!(info.core, 1);
    ensure_eq!(info.stack_size, STACK_SIZE);
    ensure_eq!(scheduler.num_threads(), 1);

    // Nothing runs before the fiber is started.
    std::thread::sleep(Duration::from_millis(10));
    ensure_eq!(ENTRY_SUM.load(Ordering::SeqCst), 0);

    scheduler.start_thread(handle)?;
    ensure_eq!(wait_until_idle(&scheduler), true);
    ensure_eq!(ENTRY_SUM.load(Ordering::SeqCst), 42);

    // The handle of an exited fiber is stale.
    ensure_eq!(
        scheduler.get_thread_info(handle).err().map(|e| e.code),
        Some(ResultCode::InvalidHandle)
    );

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn create_thread_rejects_bad_parameters() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;

    let code = |result: Result<Handle, ukern::Fail>| result.err().map(|e| e.code);
    ensure_eq!(
        code(scheduler.create_thread(None, 0, STACK_SIZE, PRIORITY, 0)),
        Some(ResultCode::InvalidThreadFunctionPointer)
    );
    for stack_size in [0, 4096, STACK_SIZE + 1] {
        ensure_eq!(
            code(scheduler.create_thread(Some(add_to_entry_sum), 0, stack_size, PRIORITY, 0)),
            Some(ResultCode::InvalidStackSize)
        );
    }
    ensure_eq!(
        code(scheduler.create_thread(Some(add_to_entry_sum), 0, STACK_SIZE, 64, 0)),
        Some(ResultCode::InvalidPriority)
    );
    ensure_eq!(
        code(scheduler.create_thread(Some(add_to_entry_sum), 0, STACK_SIZE, PRIORITY, 2)),
        Some(ResultCode::InvalidCoreId)
    );
    ensure_eq!(scheduler.num_threads(), 0);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn thread_storage_is_bounded() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let max_threads: usize = scheduler.config().max_threads;

    let mut handles: Vec<Handle> = Vec::with_capacity(max_threads);
    for _ in 0..max_threads {
        handles.push(scheduler.create_thread_with(|| {}, STACK_SIZE, PRIORITY, 0)?);
    }
    ensure_eq!(
        scheduler
            .create_thread_with(|| {}, STACK_SIZE, PRIORITY, 0)
            .err()
            .map(|e| e.code),
        Some(ResultCode::ThreadStorageExhaustion)
    );

    // Terminating suspended fibers frees their slots.
    for handle in handles {
        scheduler.terminate_thread(handle)?;
    }
    ensure_eq!(scheduler.num_threads(), 0);
    let handle: Handle = scheduler.create_thread_with(|| {}, STACK_SIZE, PRIORITY, 0)?;
    scheduler.start_thread(handle)?;
    ensure_eq!(wait_until_idle(&scheduler), true);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn activity_level_changes() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let (tx, rx): (Sender<()>, Receiver<()>) = unbounded();

    let gate: Sender<()> = block_core(&scheduler, 0)?;
    let handle: Handle = start(&scheduler, PRIORITY, 0, move || {
        let _ = tx.send(());
    })?;
    ensure_eq!(
        scheduler.start_thread(handle).err().map(|e| e.code),
        Some(ResultCode::SameActivityLevel)
    );
    ensure_eq!(scheduler.get_thread_info(handle)?.state, FiberState::Scheduled);

    // A scheduled fiber that gets suspended does not run.
    scheduler.suspend_thread(handle)?;
    ensure_eq!(scheduler.get_thread_info(handle)?.state, FiberState::Suspended);
    drop(gate);
    ensure_eq!(rx.recv_timeout(Duration::from_millis(50)).is_err(), true);

    scheduler.resume_thread(handle)?;
    rx.recv_timeout(RECV_TIMEOUT)?;
    ensure_eq!(wait_until_idle(&scheduler), true);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn exit_thread_skips_the_rest_of_the_fiber() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let (tx, rx): (Sender<&'static str>, Receiver<&'static str>) = unbounded();

    let exit: bool = true;
    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    start(&scheduler, PRIORITY, 0, move || {
        let _ = tx.send("before");
        if exit {
            fiber_scheduler.exit_thread();
        }
        let _ = tx.send("after");
    })?;

    ensure_eq!(wait_until_idle(&scheduler), true);
    let reports: Vec<&'static str> = rx.try_iter().collect();
    ensure_eq!(reports, vec!["before"]);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn panicking_fiber_exits() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let (tx, rx): (Sender<usize>, Receiver<usize>) = unbounded();

    start(&scheduler, PRIORITY, 0, || panic!("fiber panic"))?;
    start(&scheduler, PRIORITY, 0, move || {
        let _ = tx.send(1);
    })?;

    // The core keeps running fibers after a panic.
    ensure_eq!(rx.recv_timeout(RECV_TIMEOUT)?, 1);
    ensure_eq!(wait_until_idle(&scheduler), true);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn terminate_waiting_and_running_fibers() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;

    // Blocked forever on an address.
    let word: Arc<AtomicI32> = Arc::new(AtomicI32::new(0));
    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    let fiber_word: Arc<AtomicI32> = word.clone();
    let waiting: Handle = start(&scheduler, PRIORITY, 0, move || {
        let _ = fiber_scheduler.wait_for_address(&fiber_word, ArbitrationType::WaitIfEqual, 0, None);
    })?;
    ensure_eq!(wait_until_waiting(&scheduler, waiting), true);
    scheduler.terminate_thread(waiting)?;
    ensure_eq!(
        scheduler.get_thread_info(waiting).err().map(|e| e.code),
        Some(ResultCode::InvalidHandle)
    );
    // Its wait went away with it.
    ensure_eq!(scheduler.signal_to_address(&word, SignalType::Signal, 0, -1)?, 0);

    // Yields in a loop, so it is often running when terminated.
    let spins: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    let fiber_spins: Arc<AtomicUsize> = spins.clone();
    let spinning: Handle = start(&scheduler, PRIORITY, 1, move || loop {
        fiber_spins.fetch_add(1, Ordering::SeqCst);
        let _ = fiber_scheduler.yield_thread();
    })?;
    ensure_eq!(wait_until(|| spins.load(Ordering::SeqCst) > 100), true);
    scheduler.terminate_thread(spinning)?;
    ensure_eq!(wait_until_idle(&scheduler), true);

    ensure_eq!(
        scheduler.terminate_thread(spinning).err().map(|e| e.code),
        Some(ResultCode::InvalidHandle)
    );

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn shutdown_tears_down_remaining_fibers() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;

    scheduler.create_thread_with(|| {}, STACK_SIZE, PRIORITY, 0)?;
    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    let sleeper: Handle = start(&scheduler, PRIORITY, 1, move || {
        let _ = fiber_scheduler.sleep(Duration::from_secs(3600));
    })?;
    ensure_eq!(wait_until_waiting(&scheduler, sleeper), true);

    scheduler.shutdown()?;
    ensure_eq!(scheduler.is_running(), false);
    ensure_eq!(scheduler.num_threads(), 0);
    // A second shutdown is a no-op.
    scheduler.shutdown()?;
    Ok(())
}

//======================================================================================================================
// Scheduling
//======================================================================================================================

#[test]
fn higher_priority_runs_first_and_equal_priority_in_fifo_order() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let (tx, rx): (Sender<&'static str>, Receiver<&'static str>) = unbounded();

    let gate: Sender<()> = block_core(&scheduler, 0)?;
    for (name, priority) in [("low", 40), ("high", 10), ("mid-a", 20), ("mid-b", 20), ("mid-c", 20)] {
        let tx: Sender<&'static str> = tx.clone();
        start(&scheduler, priority, 0, move || {
            let _ = tx.send(name);
        })?;
    }
    drop(gate);

    let order: Vec<&'static str> = collect(&rx, 5)?;
    ensure_eq!(order, vec!["high", "mid-a", "mid-b", "mid-c", "low"]);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn yield_alternates_between_equal_priority_fibers() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let (tx, rx): (Sender<(char, usize)>, Receiver<(char, usize)>) = unbounded();

    let gate: Sender<()> = block_core(&scheduler, 0)?;
    for name in ['a', 'b'] {
        let tx: Sender<(char, usize)> = tx.clone();
        let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
        start(&scheduler, PRIORITY, 0, move || {
            for i in 0..3 {
                let _ = tx.send((name, i));
                let _ = fiber_scheduler.yield_thread();
            }
        })?;
    }
    drop(gate);

    let order: Vec<(char, usize)> = collect(&rx, 6)?;
    ensure_eq!(
        order,
        vec![('a', 0), ('b', 0), ('a', 1), ('b', 1), ('a', 2), ('b', 2)]
    );

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn sleep_lasts_at_least_the_requested_duration() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;
    let (tx, rx): (Sender<Duration>, Receiver<Duration>) = unbounded();

    for core in 0..2 {
        let tx: Sender<Duration> = tx.clone();
        let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
        start(&scheduler, PRIORITY, core, move || {
            let start: Instant = Instant::now();
            if fiber_scheduler.sleep(Duration::from_millis(20)).is_ok() {
                let _ = tx.send(start.elapsed());
            }
        })?;
    }

    for elapsed in collect(&rx, 2)? {
        ensure_eq!(elapsed >= Duration::from_millis(20), true);
    }

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn fibers_run_on_their_own_core() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(4)?;
    let (tx, rx): (Sender<(usize, usize)>, Receiver<(usize, usize)>) = unbounded();

    for core in 0..4 {
        let tx: Sender<(usize, usize)> = tx.clone();
        let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
        start(&scheduler, PRIORITY, core, move || {
            if let Ok(current) = fiber_scheduler.current_core() {
                let _ = tx.send((core, current));
            }
        })?;
    }

    for (core, current) in collect(&rx, 4)? {
        ensure_eq!(core, current);
    }

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn calling_fiber_queries_fail_outside_of_fibers() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;

    ensure_eq!(
        scheduler.current_thread().err().map(|e| e.code),
        Some(ResultCode::InvalidHandle)
    );
    ensure_eq!(scheduler.yield_thread().is_err(), true);
    ensure_eq!(scheduler.sleep(Duration::from_millis(1)).is_err(), true);

    scheduler.shutdown()?;
    Ok(())
}

//======================================================================================================================
// Thread Attributes
//======================================================================================================================

#[test]
fn thread_attributes() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(4)?;
    let handle: Handle = scheduler.create_thread_with(|| {}, STACK_SIZE, PRIORITY, 0)?;

    // Priority.
    scheduler.set_thread_priority(handle, 5)?;
    ensure_eq!(scheduler.get_thread_priority(handle)?, 5);
    ensure_eq!(
        scheduler.set_thread_priority(handle, 5).err().map(|e| e.code),
        Some(ResultCode::SamePriority)
    );
    ensure_eq!(
        scheduler.set_thread_priority(handle, 64).err().map(|e| e.code),
        Some(ResultCode::InvalidPriority)
    );

    // Name.
    scheduler.set_thread_name(handle, "worker")?;
    ensure_eq!(scheduler.get_thread_info(handle)?.name, "worker".to_string());
    ensure_eq!(
        scheduler.set_thread_name(handle, &"x".repeat(64)).err().map(|e| e.code),
        Some(ResultCode::ValueOutOfRange)
    );

    // Core mask.
    scheduler.set_thread_core_mask(handle, None, CoreMask::new(0b0110))?;
    let info: ThreadInfo = scheduler.get_thread_info(handle)?;
    ensure_eq!(info.core_mask, CoreMask::new(0b0110));
    ensure_eq!(info.core, 1);
    scheduler.set_thread_core_mask(handle, Some(2), CoreMask::new(0b0110))?;
    ensure_eq!(scheduler.get_thread_info(handle)?.core, 2);
    ensure_eq!(
        scheduler
            .set_thread_core_mask(handle, None, CoreMask::new(0b0110))
            .err()
            .map(|e| e.code),
        Some(ResultCode::SameCoreMask)
    );
    ensure_eq!(
        scheduler
            .set_thread_core_mask(handle, None, CoreMask::EMPTY)
            .err()
            .map(|e| e.code),
        Some(ResultCode::ValueOutOfRange)
    );
    ensure_eq!(
        scheduler
            .set_thread_core_mask(handle, None, CoreMask::single(7))
            .err()
            .map(|e| e.code),
        Some(ResultCode::InvalidCoreId)
    );
    ensure_eq!(
        scheduler
            .set_thread_core_mask(handle, Some(0), CoreMask::new(0b0110))
            .err()
            .map(|e| e.code),
        Some(ResultCode::InvalidCoreId)
    );

    // Stale handles.
    scheduler.terminate_thread(handle)?;
    ensure_eq!(
        scheduler.get_thread_priority(handle).err().map(|e| e.code),
        Some(ResultCode::InvalidHandle)
    );

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn fiber_migrates_to_another_core() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;
    let (tx, rx): (Sender<usize>, Receiver<usize>) = unbounded();

    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    start(&scheduler, PRIORITY, 0, move || {
        let Ok(handle) = fiber_scheduler.current_thread() else {
            return;
        };
        let _ = tx.send(fiber_scheduler.current_core().unwrap_or(usize::MAX));
        if fiber_scheduler
            .set_thread_core_mask(handle, Some(1), CoreMask::single(1))
            .is_ok()
        {
            let _ = fiber_scheduler.yield_thread();
        }
        let _ = tx.send(fiber_scheduler.current_core().unwrap_or(usize::MAX));
    })?;

    ensure_eq!(collect(&rx, 2)?, vec![0, 1]);

    scheduler.shutdown()?;
    Ok(())
}

//======================================================================================================================
// Address Arbitration
//======================================================================================================================

#[test]
fn signal_to_address_wakes_waiters() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(2)?;
    let (tx, rx): (Sender<Option<ResultCode>>, Receiver<Option<ResultCode>>) = unbounded();
    let word: Arc<AtomicI32> = Arc::new(AtomicI32::new(7));

    let mut waiters: Vec<Handle> = Vec::new();
    for core in 0..2 {
        let tx: Sender<Option<ResultCode>> = tx.clone();
        let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
        let fiber_word: Arc<AtomicI32> = word.clone();
        waiters.push(start(&scheduler, PRIORITY, core, move || {
            let result = fiber_scheduler.wait_for_address(&fiber_word, ArbitrationType::WaitIfEqual, 7, None);
            let _ = tx.send(result.err().map(|e| e.code));
        })?);
    }
    for waiter in &waiters {
        ensure_eq!(wait_until_waiting(&scheduler, *waiter), true);
    }

    // Mismatching value: nothing changes.
    ensure_eq!(
        scheduler
            .signal_to_address(&word, SignalType::SignalAndIncrementIfEqual, 8, -1)
            .err()
            .map(|e| e.code),
        Some(ResultCode::InvalidWaitAddressValue)
    );
    ensure_eq!(word.load(Ordering::SeqCst), 7);

    ensure_eq!(scheduler.signal_to_address(&word, SignalType::SignalAndIncrementIfEqual, 7, 1)?, 1);
    ensure_eq!(word.load(Ordering::SeqCst), 8);
    ensure_eq!(rx.recv_timeout(RECV_TIMEOUT)?, None);
    ensure_eq!(rx.recv_timeout(Duration::from_millis(20)).is_err(), true);

    ensure_eq!(scheduler.signal_to_address(&word, SignalType::Signal, 0, -1)?, 1);
    ensure_eq!(rx.recv_timeout(RECV_TIMEOUT)?, None);
    ensure_eq!(wait_until_idle(&scheduler), true);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn address_waits_check_the_value_and_time_out() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let (tx, rx): (Sender<Vec<Option<ResultCode>>>, Receiver<Vec<Option<ResultCode>>>) = unbounded();
    let word: Arc<AtomicI32> = Arc::new(AtomicI32::new(3));

    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    let fiber_word: Arc<AtomicI32> = word.clone();
    start(&scheduler, PRIORITY, 0, move || {
        let code = |result: Result<(), ukern::Fail>| result.err().map(|e| e.code);
        let timeout: Option<Duration> = Some(Duration::from_millis(5));
        let codes: Vec<Option<ResultCode>> = vec![
            code(fiber_scheduler.wait_for_address(&fiber_word, ArbitrationType::WaitIfEqual, 4, timeout)),
            code(fiber_scheduler.wait_for_address(&fiber_word, ArbitrationType::WaitIfLessThan, 3, timeout)),
            code(fiber_scheduler.wait_for_address(&fiber_word, ArbitrationType::WaitIfEqual, 3, timeout)),
            code(fiber_scheduler.wait_for_address(&fiber_word, ArbitrationType::DecrementAndWaitIfLessThan, 4, timeout)),
        ];
        let _ = tx.send(codes);
    })?;

    let codes: Vec<Option<ResultCode>> = rx.recv_timeout(RECV_TIMEOUT)?;
    ensure_eq!(
        codes,
        vec![
            Some(ResultCode::InvalidWaitAddressValue),
            Some(ResultCode::InvalidWaitAddressValue),
            Some(ResultCode::Timeout),
            Some(ResultCode::Timeout),
        ]
    );
    // The decrementing wait took effect before blocking.
    ensure_eq!(word.load(Ordering::SeqCst), 2);
    ensure_eq!(wait_until_idle(&scheduler), true);

    scheduler.shutdown()?;
    Ok(())
}

#[test]
fn suspended_waiter_stays_parked_after_wake() -> Result<()> {
    let scheduler: Arc<Scheduler> = new_scheduler(1)?;
    let word: Arc<AtomicI32> = Arc::new(AtomicI32::new(0));
    let woke: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    let fiber_scheduler: Arc<Scheduler> = scheduler.clone();
    let fiber_word: Arc<AtomicI32> = word.clone();
    let fiber_woke: Arc<AtomicBool> = woke.clone();
    let waiter: Handle = start(&scheduler, PRIORITY, 0, move || {
        if fiber_scheduler
            .wait_for_address(&fiber_word, ArbitrationType::WaitIfEqual, 0, None)
            .is_ok()
        {
            fiber_woke.store(true, Ordering::SeqCst);
        }
    })?;
    ensure_eq!(wait_until_waiting(&scheduler, waiter), true);

    scheduler.suspend_thread(waiter)?;
    ensure_eq!(scheduler.signal_to_address(&word, SignalType::Signal, 0, 1)?, 1);
    std::thread::sleep(Duration::from_millis(20));
    ensure_eq!(woke.load(Ordering::SeqCst), false);
    ensure_neq!(scheduler.get_thread_info(waiter)?.state, FiberState::Waiting);

    scheduler.resume_thread(waiter)?;
    ensure_eq!(wait_until_idle(&scheduler), true);
    ensure_eq!(woke.load(Ordering::SeqCst), true);

    scheduler.shutdown()?;
    Ok(())
}

//======================================================================================================================
// Global Scheduler
//======================================================================================================================

#[test]
fn global_scheduler_is_initialized_once() -> Result<()> {
    let config: ukern::SchedulerConfig = ukern::SchedulerConfig {
        num_cores: 1,
        max_threads: 8,
        ..Default::default()
    };
    let first: Arc<Scheduler> = ukern::initialize(config.clone())?;
    let second: Arc<Scheduler> = ukern::initialize(config)?;
    ensure_eq!(first.id(), second.id());
    ensure_eq!(ukern::scheduler()?.id(), first.id());

    let (tx, rx): (Sender<usize>, Receiver<usize>) = unbounded();
    first.spawn(move || {
        let _ = tx.send(7);
    })?;
    ensure_eq!(rx.recv_timeout(RECV_TIMEOUT)?, 7);

    first.shutdown()?;
    Ok(())
}
