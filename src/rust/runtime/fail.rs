// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::{
    error,
    fmt,
    io::{
        self,
        Write,
    },
    process,
};

//==============================================================================
// Structures
//==============================================================================

/// Result codes reported by the scheduler and its synchronization primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Timeout,
    InvalidHandle,
    ThreadStorageExhaustion,
    HandleExhaustion,
    InvalidThreadFunctionPointer,
    InvalidStackSize,
    InvalidPriority,
    InvalidCoreId,
    InvalidAddress,
    InvalidWaitAddressValue,
    InvalidLockAddressValue,
    RequiresLock,
    ValueOutOfRange,
    SamePriority,
    SameActivityLevel,
    SameCoreMask,
    InvalidArbitrationType,
    InvalidSignalType,
}

/// Failure
#[derive(Clone)]
pub struct Fail {
    /// Result code.
    pub code: ResultCode,
    /// Cause.
    pub cause: String,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl ResultCode {
    /// Short human-readable description of the result code.
    pub fn description(&self) -> &'static str {
        match self {
            ResultCode::Timeout => "wait timed out",
            ResultCode::InvalidHandle => "invalid handle",
            ResultCode::ThreadStorageExhaustion => "no free thread slots",
            ResultCode::HandleExhaustion => "handle table is full",
            ResultCode::InvalidThreadFunctionPointer => "invalid thread function pointer",
            ResultCode::InvalidStackSize => "invalid stack size",
            ResultCode::InvalidPriority => "invalid priority",
            ResultCode::InvalidCoreId => "invalid core id",
            ResultCode::InvalidAddress => "invalid address",
            ResultCode::InvalidWaitAddressValue => "unexpected value at wait address",
            ResultCode::InvalidLockAddressValue => "unexpected value at lock address",
            ResultCode::RequiresLock => "lock must be held",
            ResultCode::ValueOutOfRange => "value out of range",
            ResultCode::SamePriority => "priority unchanged",
            ResultCode::SameActivityLevel => "activity level unchanged",
            ResultCode::SameCoreMask => "core mask unchanged",
            ResultCode::InvalidArbitrationType => "invalid arbitration type",
            ResultCode::InvalidSignalType => "invalid signal type",
        }
    }
}

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(code: ResultCode, cause: &str) -> Self {
        Self {
            code,
            cause: cause.to_string(),
        }
    }
}

//==============================================================================
// Standalone Functions
//==============================================================================

/// Reports a violated internal consistency check and aborts the process.
#[cold]
pub fn fatal(expression: &str, file: &str, line: u32, code: ResultCode) -> ! {
    let report: String = format!(
        "fatal: assertion `{}` failed at {}:{} (result={:?}: {})",
        expression,
        file,
        line,
        code,
        code.description()
    );
    error!("{}", report);
    log::logger().flush();
    let _ = writeln!(io::stderr(), "{}", report);
    process::abort()
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Display Trait Implementation for Result Codes
impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.description())
    }
}

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.code, self.cause)
    }
}

/// Debug trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.code, self.cause)
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {}

/// Conversion Trait Implementation for Fail
impl From<ResultCode> for Fail {
    fn from(code: ResultCode) -> Self {
        Self {
            code,
            cause: code.description().to_string(),
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
