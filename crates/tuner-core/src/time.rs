//! Wall-clock abstraction.
//!
//! The renderer reasons about three time bases; the wall clock is the only one
//! it does not own, so it is injected to keep timing logic deterministic under
//! test.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic wall-clock source with microsecond resolution.
pub trait Clock: Send + Sync {
    /// Microseconds elapsed since an arbitrary, fixed origin.
    fn now_us(&self) -> i64;

    /// Milliseconds elapsed since the same origin.
    fn now_ms(&self) -> i64 {
        self.now_us() / 1000
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by `Instant`, anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SystemClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemClock").finish_non_exhaustive()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

/// Manually advanced clock for tests and offline drivers.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<Mutex<i64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now_us: i64) -> Self {
        Self {
            now_us: Arc::new(Mutex::new(now_us)),
        }
    }

    pub fn advance_us(&self, delta_us: i64) {
        *self.now_us.lock() += delta_us;
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.advance_us(delta_ms * 1000);
    }

    pub fn set_us(&self, now_us: i64) {
        *self.now_us.lock() = now_us;
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> i64 {
        *self.now_us.lock()
    }
}
