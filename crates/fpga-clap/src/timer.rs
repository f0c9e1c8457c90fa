//! Minimal elapsed-time stopwatch used by the backend's per-transfer
//! logging and the [`crate::watchdog::WatchDog`]'s runtime measurement.

use std::time::Instant;

pub struct Timer {
    start: Option<Instant>,
    elapsed_secs: f64,
}

impl Default for Timer {
    fn default() -> Self {
        Self { start: None, elapsed_secs: 0.0 }
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(start) = self.start.take() {
            self.elapsed_secs = start.elapsed().as_secs_f64();
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_secs * 1000.0
    }
}
