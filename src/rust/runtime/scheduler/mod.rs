// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod state;
mod waitable;

//==============================================================================
// Exports
//==============================================================================

pub mod arbiter;
pub mod context;
pub mod core;
pub mod fiber;
pub mod scheduler;

pub use self::{
    arbiter::{
        ArbitrationType,
        SignalType,
        CONTESTED,
    },
    core::CoreMask,
    fiber::{
        ActivityLevel,
        FiberState,
        ThreadFunction,
        ThreadInfo,
    },
    scheduler::{
        fiber_terminated,
        Scheduler,
    },
};
