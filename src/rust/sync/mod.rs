// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod busy_mutex;
pub mod condition_variable;
pub mod critical_section;
pub mod event;

pub use self::{
    busy_mutex::{
        BusyMutex,
        BusyMutexGuard,
    },
    condition_variable::InternalConditionVariable,
    critical_section::{
        CriticalSectionGuard,
        InternalCriticalSection,
    },
    event::{
        Event,
        ResetMode,
    },
};
