use log::info;
use std::time::Instant;

/// Wall-clock timer for logging stage durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Timer {
            start: Instant::now(),
        }
    }

    /// Restart the timer.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Seconds elapsed since construction or the last reset.
    pub fn elapsed(&self) -> f64 {
        let delta = self.start.elapsed();
        delta.as_secs() as f64 + f64::from(delta.subsec_millis()) / 1000.0
    }

    /// Log the elapsed time for a named stage.
    pub fn finish(&self, stage: &str) {
        info!("{}: done in {:.2}s", stage, self.elapsed());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new()
    }
}
