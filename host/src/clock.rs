//! Wall-clock time source.

use std::thread;
use std::time::{Duration, Instant};

use esp8266_at::Clock;

/// Milliseconds since construction, wrapping at `u32::MAX`
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the intended wrap
        self.origin.elapsed().as_millis() as u32
    }

    fn sleep_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
