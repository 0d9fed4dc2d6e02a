use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/**
 * Millisecond clock driving source and sink cadence. The engine never
 * schedules its own ticks; it only reads "now" once per `do_physics` call,
 * so swapping the wall clock for a manual one makes emission and drain
 * timing fully deterministic in tests.
 */
pub trait SimClock {
    fn now_ms(&self) -> f64;
}

/// Monotonic wall clock, the default for interactive hosts.
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn new() -> WallClock {
        WallClock {
            start: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock::new()
    }
}

impl SimClock for WallClock {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.
    }
}

/**
 * Explicitly advanced clock. Clones share the same time value, so a test
 * can keep one clone and hand the other to the engine:
 *
 * ```
 * use crowdflow::{ManualClock, SimClock};
 *
 * let clock = ManualClock::new();
 * let handle = clock.clone();
 * handle.advance(15.);
 * assert_eq!(clock.now_ms(), 15.);
 * ```
 */
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock {
            now: Rc::new(Cell::new(0.)),
        }
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new()
    }
}

impl SimClock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}
