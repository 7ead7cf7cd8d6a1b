//! Timekeeping.
//!
//! Everything in the stack is stamped with an [`embedded_time::Instant`] of
//! some user-provided clock. Two clocks ship with the crate: [`ManualClock`],
//! which a driver (or a test) advances by hand from its own microsecond
//! counter, and [`StdClock`] behind the `std` feature.

use core::cell::Cell;

use embedded_time::duration::Generic;
use embedded_time::rate::Fraction;
use embedded_time::{Clock, Instant, TimeInt};

#[cfg(feature = "std")]
pub use std_clock::StdClock;

pub type Timestamp<C> = Instant<C>;

/// Returns true if more than `timeout` has passed between `since` and `now`.
///
/// A missing timeout or start time never expires.
pub(crate) fn expired<C: Clock>(
    timeout: Option<Generic<C::T>>,
    now: Timestamp<C>,
    since: Option<Timestamp<C>>,
) -> bool {
    match (timeout, since) {
        (Some(timeout), Some(since)) => {
            match (now.checked_duration_since(&since), ticks::<C>(&timeout)) {
                (Some(elapsed), Some(limit)) => elapsed.integer() > limit,
                // A timeout too long to count in ticks never runs out
                _ => false,
            }
        }
        _ => false,
    }
}

/// Length of `duration` in ticks of `C`.
///
/// `Generic`'s own ordering truncates both sides to whole seconds, so
/// comparisons against an elapsed time go through ticks instead.
pub(crate) fn ticks<C: Clock>(duration: &Generic<C::T>) -> Option<C::T> {
    if *duration.scaling_factor() == C::SCALING_FACTOR {
        return Some(duration.integer());
    }
    let ratio = duration.scaling_factor().checked_div(&C::SCALING_FACTOR)?;
    duration.integer().checked_mul_fraction(&ratio)
}

/// Microsecond clock whose value is set from the outside.
///
/// Handy when the CAN driver already timestamps frames, and in tests.
#[derive(Debug, Default)]
pub struct ManualClock(Cell<u64>);

impl ManualClock {
    pub const fn new() -> Self {
        Self(Cell::new(0))
    }

    /// Jump to an absolute time in microseconds.
    pub fn set(&self, micros: u64) {
        self.0.set(micros);
    }

    pub fn advance(&self, micros: u64) {
        self.0.set(self.0.get().wrapping_add(micros));
    }

    /// Duration of `micros` microseconds in this clock's units.
    pub fn micros(micros: u64) -> Generic<u64> {
        Generic::new(micros, Self::SCALING_FACTOR)
    }

    /// Instant at `micros` microseconds.
    pub fn instant(micros: u64) -> Timestamp<Self> {
        Instant::new(micros)
    }
}

impl Clock for ManualClock {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
        Ok(Instant::new(self.0.get()))
    }
}

#[cfg(feature = "std")]
mod std_clock {
    use embedded_time::rate::Fraction;
    use embedded_time::{Clock, Instant};

    /// Microseconds elapsed since the clock was created.
    #[derive(Copy, Clone, Debug)]
    pub struct StdClock {
        start: std::time::Instant,
    }

    impl StdClock {
        pub fn new() -> Self {
            Self {
                start: std::time::Instant::now(),
            }
        }
    }

    impl Default for StdClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for StdClock {
        type T = u64;

        const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

        fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
            Ok(Instant::new(self.start.elapsed().as_micros() as u64))
        }
    }
}
