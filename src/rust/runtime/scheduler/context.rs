// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cooperative execution contexts.
//!
//! Every fiber is backed by a native thread that only makes progress while it holds the resume baton of its context.
//! Switching to a fiber hands it the baton together with the index of the dispatching core; the fiber gives control
//! back by notifying that core and blocking on the baton again. Dropping the context disconnects the baton, which
//! makes the blocked fiber unwind out of its entry point without running any further user code.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::{
    Fail,
    ResultCode,
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
    TrySendError,
};
use ::std::thread::{
    self,
    JoinHandle,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler-side end of a fiber's execution context.
pub struct ExecutionContext {
    resume_tx: Option<Sender<usize>>,
    thread: Option<JoinHandle<()>>,
}

/// Fiber-side end of an execution context.
pub struct ContextBaton {
    resume_rx: Receiver<usize>,
}

/// Unwind payload of a fiber whose context was destroyed while it was switched out.
#[derive(Debug)]
pub struct FiberTerminated;

/// Unwind payload of a fiber leaving through `exit_thread()`.
#[derive(Debug)]
pub struct FiberExit;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ExecutionContext {
    /// A context that is not backed by any thread yet.
    pub fn empty() -> Self {
        Self {
            resume_tx: None,
            thread: None,
        }
    }

    /// Spawns the thread backing a new context. `body` starts right away but should wait on the baton before doing
    /// anything observable.
    pub fn create<F>(name: &str, stack_size: usize, body: F) -> Result<Self, Fail>
    where
        F: FnOnce(ContextBaton) + Send + 'static,
    {
        let (resume_tx, resume_rx): (Sender<usize>, Receiver<usize>) = crossbeam_channel::bounded(1);
        let baton: ContextBaton = ContextBaton { resume_rx };
        match thread::Builder::new()
            .name(name.to_string())
            .stack_size(stack_size)
            .spawn(move || body(baton))
        {
            Ok(thread) => Ok(Self {
                resume_tx: Some(resume_tx),
                thread: Some(thread),
            }),
            Err(e) => {
                let cause: String = format!("failed to spawn execution context (name={:?}, error={:?})", name, e);
                error!("create(): {}", cause);
                Err(Fail::new(ResultCode::ThreadStorageExhaustion, &cause))
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resume_tx.is_none()
    }

    /// Hands the baton to the fiber. Returns false if the fiber already holds an unconsumed baton or is gone.
    pub fn resume(&self, core: usize) -> bool {
        match &self.resume_tx {
            Some(resume_tx) => match resume_tx.try_send(core) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            },
            None => false,
        }
    }

    /// Destroys the context. When `join` is set, waits for the backing thread to finish unwinding.
    pub fn destroy(mut self, join: bool) {
        self.resume_tx = None;
        if let Some(thread) = self.thread.take() {
            if join && thread.thread().id() != thread::current().id() {
                if thread.join().is_err() {
                    warn!("destroy(): execution context terminated abnormally");
                }
            }
        }
    }
}

impl ContextBaton {
    /// Blocks until the baton is handed over. Returns the dispatching core.
    pub fn wait(&self) -> Result<usize, FiberTerminated> {
        self.resume_rx.recv().map_err(|_| FiberTerminated)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
