//! Time Sources
//!
//! Every deadline in the protocol core flows through the `Clock` trait so
//! that tests drive timeouts without sleeping. `unix_secs` exists only for
//! the one replicated wall-clock value (`deleted_at`); deadlines use the
//! monotonic `now`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic and wall-clock time.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Monotonic now, used for every deadline comparison.
    fn now(&self) -> Instant;

    /// Wall-clock unix seconds, used only for replicated timestamps.
    fn unix_secs(&self) -> u64;
}

/// System time source.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_secs(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually advanced time source.
///
/// Clones share the same offset, so a test can keep one handle and hand
/// another to the service under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    unix_base: u64,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock pinned at an arbitrary base.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            unix_base: 1_700_000_000,
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock for every clone.
    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn unix_secs(&self) -> u64 {
        self.unix_base + self.offset_ms.load(Ordering::SeqCst) / 1000
    }
}
