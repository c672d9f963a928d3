//! Cooperative cancellation for specialization passes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Wall-clock budget for one specialization pass, plus a manual trip switch.
///
/// Workers poll [`SearchTimer::stop_spec`]; once it has returned `true` it
/// keeps returning `true` until the next [`SearchTimer::start_spec`].
/// Polling is lock-free: the pass start is kept as nanoseconds since the
/// timer was created.
#[derive(Debug)]
pub struct SearchTimer {
    program_start: Instant,
    spec_start_nanos: AtomicU64,
    limit: Option<Duration>,
    tripped: AtomicBool,
}

impl SearchTimer {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            program_start: Instant::now(),
            spec_start_nanos: AtomicU64::new(0),
            limit,
            tripped: AtomicBool::new(false),
        }
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.program_start.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Start the clock for a new target.
    pub fn start_spec(&self) {
        self.spec_start_nanos.store(self.now_nanos(), Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
    }

    pub fn stop_spec(&self) -> bool {
        if self.tripped.load(Ordering::Relaxed) {
            return true;
        }
        let over = self.limit.is_some_and(|limit| self.spec_elapsed() > limit);
        if over {
            self.tripped.store(true, Ordering::SeqCst);
        }
        over
    }

    /// Trip the switch now; used when a worker fails.
    pub fn cancel(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn spec_elapsed(&self) -> Duration {
        let start = self.spec_start_nanos.load(Ordering::Relaxed);
        Duration::from_nanos(self.now_nanos().saturating_sub(start))
    }

    pub fn elapsed(&self) -> Duration {
        self.program_start.elapsed()
    }
}

impl Default for SearchTimer {
    fn default() -> Self {
        Self::new(None)
    }
}
