// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::{
    fmt,
    time::{
        Duration,
        Instant,
    },
};

//==============================================================================
// Constants
//==============================================================================

/// Frequency of the monotonic tick counter, in ticks per second.
pub const TICK_FREQUENCY: u64 = 19_200_000;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

//==============================================================================
// Structures
//==============================================================================

/// A point on (or a span of) the monotonic tick counter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(u64);

/// Monotonic tick source. Ticks are counted from the moment the clock was created.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    epoch: Instant,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl Tick {
    pub const ZERO: Tick = Tick(0);
    /// Sentinel for waits without a deadline.
    pub const INFINITE: Tick = Tick(u64::MAX);

    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_infinite(self) -> bool {
        self.0 == u64::MAX
    }

    /// Converts a duration into ticks, rounding down. Saturates at [Tick::INFINITE].
    pub fn from_duration(duration: Duration) -> Self {
        let ticks: u128 = duration.as_nanos() * TICK_FREQUENCY as u128 / NANOS_PER_SECOND;
        Self(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    /// Converts a duration into ticks, rounding up. Used for deadlines so that a wait never ends early.
    pub fn from_duration_ceil(duration: Duration) -> Self {
        let scaled: u128 = duration.as_nanos() * TICK_FREQUENCY as u128;
        let ticks: u128 = (scaled + NANOS_PER_SECOND - 1) / NANOS_PER_SECOND;
        Self(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    /// Converts ticks into a duration, rounding down.
    pub fn to_duration(self) -> Duration {
        let nanos: u128 = self.0 as u128 * NANOS_PER_SECOND / TICK_FREQUENCY as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn saturating_add(self, other: Tick) -> Tick {
        Tick(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Tick) -> Tick {
        Tick(self.0.saturating_sub(other.0))
    }

    /// Computes the absolute deadline of a wait that starts at `now`. `None` waits forever.
    pub fn deadline_after(now: Tick, timeout: Option<Duration>) -> Tick {
        match timeout {
            None => Tick::INFINITE,
            Some(timeout) if timeout.is_zero() => now,
            // One extra tick covers the truncation of `now` itself.
            Some(timeout) => now
                .saturating_add(Tick::from_duration_ceil(timeout))
                .saturating_add(Tick(1)),
        }
    }
}

impl Clock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    /// Current value of the tick counter.
    pub fn now(&self) -> Tick {
        Tick::from_duration(self.epoch.elapsed())
    }

    pub fn frequency(&self) -> u64 {
        TICK_FREQUENCY
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "Tick(inf)")
        } else {
            write!(f, "Tick({})", self.0)
        }
    }
}

impl From<Duration> for Tick {
    fn from(duration: Duration) -> Self {
        Tick::from_duration(duration)
    }
}

impl From<Tick> for Duration {
    fn from(tick: Tick) -> Self {
        tick.to_duration()
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
