//! Single-flight guards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Compare-and-set flag allowing one holder at a time.
///
/// Acquisition never waits: a second caller gets `None` and is expected to
/// drop its work.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the flag; released when the returned guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flight: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holder of a [`SingleFlight`]; releases it on drop, panics included.
#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}
