// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![allow(dead_code)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::crossbeam_channel::Receiver;
use ::std::{
    sync::Arc,
    thread,
    time::{
        Duration,
        Instant,
    },
};
use ::ukern::{
    runtime::logging,
    FiberState,
    Handle,
    Scheduler,
    SchedulerConfig,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Stack size of test fibers.
pub const STACK_SIZE: usize = 64 * 1024;

/// How long the test harness waits for fibers to report back.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Priority of fibers that do not care about ordering.
pub const PRIORITY: u32 = 32;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Starts a scheduler running `num_cores` cores.
pub fn new_scheduler(num_cores: usize) -> Result<Arc<Scheduler>> {
    logging::initialize();
    let config: SchedulerConfig = SchedulerConfig {
        num_cores,
        max_threads: 64,
        default_stack_size: STACK_SIZE,
        idle_timeout: Duration::from_millis(1),
        pin_cores: false,
    };
    Ok(Scheduler::new(config)?)
}

/// Creates and starts a fiber.
pub fn start<F>(scheduler: &Arc<Scheduler>, priority: u32, core: usize, entry: F) -> Result<Handle>
where
    F: FnOnce() + Send + 'static,
{
    let handle: Handle = scheduler.create_thread_with(entry, STACK_SIZE, priority, core)?;
    scheduler.start_thread(handle)?;
    Ok(handle)
}

/// Polls `condition` until it holds or [RECV_TIMEOUT] elapses.
pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let start: Instant = Instant::now();
    while start.elapsed() < RECV_TIMEOUT {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Waits until `handle` blocks on something.
pub fn wait_until_waiting(scheduler: &Arc<Scheduler>, handle: Handle) -> bool {
    wait_until(|| match scheduler.get_thread_info(handle) {
        Ok(info) => info.state == FiberState::Waiting,
        Err(_) => false,
    })
}

/// Waits until every fiber of `scheduler` is gone.
pub fn wait_until_idle(scheduler: &Arc<Scheduler>) -> bool {
    wait_until(|| scheduler.num_threads() == 0)
}

/// Collects `count` reports sent by fibers.
pub fn collect<T>(rx: &Receiver<T>, count: usize) -> Result<Vec<T>> {
    let mut reports: Vec<T> = Vec::with_capacity(count);
    for _ in 0..count {
        reports.push(rx.recv_timeout(RECV_TIMEOUT)?);
    }
    Ok(reports)
}
