//! Blocking delays for std targets.

use embedded_hal::delay::DelayNs;
use std::thread::sleep;
use std::time::Duration;

/// A [DelayNs] implementation that puts the current thread to sleep.
///
/// The OS scheduler only guarantees a lower bound, so short waits usually take longer than
/// requested. All HD44780 timings are minimums, which makes this fine for driving the display.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdDelay;

impl StdDelay {
    pub fn new() -> Self {
        StdDelay
    }
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        sleep(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        sleep(Duration::from_millis(ms as u64));
    }
}
