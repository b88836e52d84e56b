// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod fail;
pub mod limits;
pub mod logging;
pub mod scheduler;
pub mod timer;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    config::SchedulerConfig,
    fail::{
        Fail,
        ResultCode,
    },
    scheduler::Scheduler,
};
use ::std::sync::{
    Arc,
    OnceLock,
};

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Process-wide scheduler.
static GLOBAL_SCHEDULER: OnceLock<Arc<Scheduler>> = OnceLock::new();

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Starts the process-wide scheduler. Later calls return the scheduler that is already running.
pub fn initialize(config: SchedulerConfig) -> Result<Arc<Scheduler>, Fail> {
    logging::initialize();
    if let Some(scheduler) = GLOBAL_SCHEDULER.get() {
        warn!("initialize(): scheduler is already initialized");
        return Ok(scheduler.clone());
    }
    let scheduler: Arc<Scheduler> = Scheduler::new(config)?;
    match GLOBAL_SCHEDULER.set(scheduler.clone()) {
        Ok(()) => Ok(scheduler),
        Err(_) => {
            // Lost a race against a concurrent initialization.
            scheduler.shutdown()?;
            scheduler_or_fail()
        },
    }
}

/// Process-wide scheduler started by [initialize].
pub fn scheduler() -> Result<Arc<Scheduler>, Fail> {
    scheduler_or_fail()
}

fn scheduler_or_fail() -> Result<Arc<Scheduler>, Fail> {
    match GLOBAL_SCHEDULER.get() {
        Some(scheduler) => Ok(scheduler.clone()),
        None => {
            let cause: &str = "scheduler is not initialized";
            error!("scheduler(): {}", cause);
            Err(Fail::new(ResultCode::InvalidHandle, cause))
        },
    }
}
