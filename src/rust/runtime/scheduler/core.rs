// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::ResultCode,
    limits::MAX_CORES,
    scheduler::{
        fiber::{
            FiberRecord,
            FiberState,
        },
        scheduler::Scheduler,
    },
    timer::Tick,
};
use ::bit_iter::BitIter;
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::std::{
    fmt,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Set of cores, one bit per core.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CoreMask(u64);

/// Channels through which fibers and other cores talk to a core's run loop.
pub struct CoreChannels {
    /// Signaled by the fiber the core dispatched when it gives control back.
    pub yield_tx: Sender<()>,
    pub yield_rx: Receiver<()>,
    /// Signaled when a fiber becomes ready on an idle core.
    pub kick_rx: Receiver<()>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl CoreMask {
    pub const EMPTY: CoreMask = CoreMask(0);

    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Mask of cores `0..num_cores`.
    pub fn all(num_cores: usize) -> Self {
        if num_cores >= MAX_CORES {
            Self(u64::MAX)
        } else {
            Self((1u64 << num_cores) - 1)
        }
    }

    pub fn single(core: usize) -> Self {
        if core < MAX_CORES {
            Self(1 << core)
        } else {
            Self::EMPTY
        }
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, core: usize) -> bool {
        core < MAX_CORES && self.0 & (1 << core) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_subset_of(&self, other: CoreMask) -> bool {
        self.0 & !other.0 == 0
    }

    /// Lowest core in the mask.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        BitIter::from(self.0)
    }
}

impl CoreChannels {
    pub fn create() -> (Self, Sender<()>) {
        let (yield_tx, yield_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::unbounded();
        let (kick_tx, kick_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
        (
            Self {
                yield_tx,
                yield_rx,
                kick_rx,
            },
            kick_tx,
        )
    }
}

impl Scheduler {
    /// Run loop of one core. Dispatches ready fibers one at a time until the scheduler shuts down.
    pub(super) fn run_core(&self, core: usize) {
        if self.config().pin_cores {
            pin_to_host_cpu(core);
        }
        debug!("run_core(): core {} started", core);
        let channels: &CoreChannels = &self.cores[core];

        while self.is_running() {
            let mut state = self.state.lock();
            let now: Tick = self.now();
            match state.select_next(core, now) {
                Some(index) => {
                    let fiber: &mut FiberRecord = &mut state.fibers[index];
                    fiber.state = FiberState::Running;
                    fiber.running_on = Some(core);
                    let resumed: bool = fiber.context.resume(core);
                    drop(state);
                    crate::ukern_assert!(resumed, ResultCode::InvalidHandle);
                    // The dispatched fiber owns the core until it reports back.
                    if channels.yield_rx.recv().is_err() {
                        break;
                    }
                },
                None => {
                    let next_deadline: Option<Tick> = state.next_deadline(core);
                    drop(state);
                    let idle_timeout: Duration = match next_deadline {
                        Some(deadline) => self
                            .config()
                            .idle_timeout
                            .min(deadline.saturating_sub(now).to_duration()),
                        None => self.config().idle_timeout,
                    };
                    let _ = channels.kick_rx.recv_timeout(idle_timeout);
                },
            }
        }
        debug!("run_core(): core {} stopped", core);
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Pins the calling native thread to a host CPU. Best effort.
pub fn pin_to_host_cpu(cpu: usize) {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            let num_cpus: usize = ::std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            let host_cpu: usize = cpu % num_cpus;
            // Safety: the set is a plain bit array owned by this frame.
            let rc: libc::c_int = unsafe {
                let mut set: libc::cpu_set_t = ::std::mem::zeroed();
                libc::CPU_ZERO(&mut set);
                libc::CPU_SET(host_cpu, &mut set);
                libc::sched_setaffinity(0, ::std::mem::size_of::<libc::cpu_set_t>(), &set)
            };
            if rc != 0 {
                warn!("pin_to_host_cpu(): sched_setaffinity() failed (cpu={})", host_cpu);
            }
        } else {
            trace!("pin_to_host_cpu(): not supported on this platform (cpu={})", cpu);
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreMask({:#x})", self.0)
    }
}

impl From<u64> for CoreMask {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
