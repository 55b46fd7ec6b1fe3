//! # Frame Pacer
//!
//! Shared elapsed-time clock for one session. Video and audio pushes read the
//! same pacer so timestamps on both tracks share one origin.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use quanta::{Clock, Instant};

/// Monotonic millisecond clock with a resettable origin.
///
/// The origin is an atomic offset from a fixed base instant, so `reset` and
/// `elapsed_ms` never block and can be called from any thread.
pub struct FramePacer {
    clock: Clock,
    base: Instant,
    origin_nanos: AtomicU64,
}

impl FramePacer {
    /// Creates a pacer on the system clock, starting at zero.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates a pacer on the given clock (use `Clock::mock()` in tests).
    pub fn with_clock(clock: Clock) -> Self {
        let base = clock.now();
        Self {
            clock,
            base,
            origin_nanos: AtomicU64::new(0),
        }
    }

    /// Moves the origin to now.
    pub fn reset(&self) {
        self.origin_nanos.store(self.now_nanos(), Ordering::Release);
    }

    /// Milliseconds since the last reset (or since creation).
    pub fn elapsed_ms(&self) -> u64 {
        let origin = self.origin_nanos.load(Ordering::Acquire);
        self.now_nanos().saturating_sub(origin) / 1_000_000
    }

    fn now_nanos(&self) -> u64 {
        self.clock.now().duration_since(self.base).as_nanos() as u64
    }
}

impl fmt::Debug for FramePacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePacer")
            .field("elapsed_ms", &self.elapsed_ms())
            .finish()
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}
