//! Injectable time sources for budget accounting.
//!
//! Every temporal decision the scheduler makes -- how much of a pass budget
//! has been consumed, whether a job's slice is exhausted -- is derived from
//! a [`TimeSource`] reading. The trait is the single seam between the
//! scheduler and real time, so tests can substitute a manually advanced
//! clock and reproduce any interleaving exactly.
//!
//! # Design Principles
//!
//! - Readings are elapsed durations, not wall-clock timestamps. Consumers
//!   only ever subtract two readings from the same source.
//! - Readings never decrease. [`MonotonicClock`] inherits this from
//!   [`Instant`]; [`ManualClock`] enforces it by only advancing forward.
//! - Sources are shared by reference counting, never by global state.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonically non-decreasing reading of elapsed time.
///
/// The unit of all scheduler budgets and accumulators. Implementations must
/// guarantee that successive calls to [`elapsed`](Self::elapsed) never go
/// backwards; nothing else is assumed about the rate at which time advances.
pub trait TimeSource {
    /// Time elapsed since this source's origin.
    fn elapsed(&self) -> Duration;
}

/// A shared, reference-counted time source.
///
/// The scheduler is single-threaded by contract, so sharing uses [`Rc`].
pub type SharedTimeSource = Rc<dyn TimeSource>;

/// Wall-clock time source backed by [`Instant`].
///
/// The origin is the moment the clock was created. This is the source the
/// host loop uses in production.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    /// The instant this clock started measuring from.
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Deterministic time source that only advances when told to.
///
/// Used by tests and replayable simulations: job bodies or the test harness
/// advance the clock explicitly, which makes slice accounting reproducible
/// down to the nanosecond. Cloning yields a handle to the same underlying
/// reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current elapsed reading, shared across clones.
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a clock at reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the reading by `delta`, saturating at [`Duration::MAX`].
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get().saturating_add(delta));
    }

    /// Current reading.
    pub fn reading(&self) -> Duration {
        self.now.get()
    }
}

impl TimeSource for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.elapsed(), Duration::from_millis(200));
        clock.advance(Duration::from_millis(300));
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn manual_clock_clones_share_the_reading() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_secs(1));
        assert_eq!(other.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn manual_clock_saturates_instead_of_overflowing() {
        let clock = ManualClock::new();
        clock.advance(Duration::MAX);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::MAX);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(second >= first);
    }

    #[test]
    fn shared_source_is_usable_through_the_trait() {
        let clock = ManualClock::new();
        let shared: SharedTimeSource = Rc::new(clock.clone());
        clock.advance(Duration::from_millis(50));
        assert_eq!(shared.elapsed(), Duration::from_millis(50));
    }
}
