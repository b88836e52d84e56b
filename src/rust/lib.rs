// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the enclosing [anyhow::Result] function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(
                        "ensure failed: `(left == right)` left: `{:?}`, right: `{:?}` ({}:{})",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    });
}

/// Ensures that two expressions are not equal, bailing out of the enclosing [anyhow::Result] function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left != right)` left: `{:?}`, right: `{:?}` ({}:{})",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    });
}

/// Checks an internal consistency condition. A violated condition corrupts scheduler invariants, so the process is
/// aborted with a diagnostic report (expression, location and result code).
#[macro_export]
macro_rules! ukern_assert {
    ($cond:expr, $code:expr) => {
        if !$cond {
            $crate::runtime::fail::fatal(stringify!($cond), file!(), line!(), $code);
        }
    };
}

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod collections;
pub mod runtime;
pub mod sync;

pub use self::{
    collections::handle_table::Handle,
    runtime::{
        config::{
            Config,
            SchedulerConfig,
        },
        fail::{
            Fail,
            ResultCode,
        },
        initialize,
        scheduler,
        scheduler::{
            ActivityLevel,
            ArbitrationType,
            CoreMask,
            FiberState,
            Scheduler,
            SignalType,
            ThreadFunction,
            ThreadInfo,
        },
        timer::{
            Clock,
            Tick,
        },
    },
    sync::{
        busy_mutex::BusyMutex,
        condition_variable::InternalConditionVariable,
        critical_section::InternalCriticalSection,
        event::{
            Event,
            ResetMode,
        },
    },
};
