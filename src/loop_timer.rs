// Control loop performance
//
// Average loop rate over a one-second window, plus the slowest single period
// since the peak was last reset. Time is passed in, so the station's
// simulated clock and the real-time loop are measured the same way.

use serde::Serialize;
use tracing::debug;

use crate::config::LOOP_RATE_WINDOW_MS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoopStats {
    pub loop_hz: f64,
    pub peak_loop_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LoopTimer {
    last_millis: Option<u64>,
    window_start_millis: u64,
    window_loops: u32,
    loop_hz: f64,
    peak_loop_millis: u64,
}

impl LoopTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart the rate window and period measurement at `now_millis`
    pub fn start(&mut self, now_millis: u64) {
        self.last_millis = Some(now_millis);
        self.window_start_millis = now_millis;
        self.window_loops = 0;
    }

    /// Call once per loop iteration. The first call only starts the timer.
    pub fn update(&mut self, now_millis: u64) {
        let Some(last) = self.last_millis else {
            self.start(now_millis);
            return;
        };

        let period = now_millis.saturating_sub(last);
        if period > self.peak_loop_millis {
            debug!("New peak loop time: {}ms", period);
            self.peak_loop_millis = period;
        }
        self.last_millis = Some(now_millis);
        self.window_loops += 1;

        let window = now_millis.saturating_sub(self.window_start_millis);
        if window >= LOOP_RATE_WINDOW_MS {
            self.loop_hz = f64::from(self.window_loops) * 1000.0 / window as f64;
            self.window_loops = 0;
            self.window_start_millis = now_millis;
        }
    }

    /// Forget the slowest period seen so far
    pub fn reset_peak(&mut self) {
        self.peak_loop_millis = 0;
    }

    /// Average rate over the last full window; zero until one has elapsed
    pub fn loop_hz(&self) -> f64 {
        self.loop_hz
    }

    pub fn peak_loop_millis(&self) -> u64 {
        self.peak_loop_millis
    }

    pub fn stats(&self) -> LoopStats {
        LoopStats {
            loop_hz: self.loop_hz,
            peak_loop_ms: self.peak_loop_millis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_steady(timer: &mut LoopTimer, from: u64, to: u64, period: u64) {
        let mut now = from;
        while now <= to {
            timer.update(now);
            now += period;
        }
    }

    #[test]
    fn test_rate_needs_a_full_window() {
        let mut timer = LoopTimer::new();
        run_steady(&mut timer, 0, 980, 20);
        assert_eq!(timer.loop_hz(), 0.0);
        timer.update(1_000);
        assert!((timer.loop_hz() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_follows_slower_loop() {
        let mut timer = LoopTimer::new();
        run_steady(&mut timer, 0, 1_000, 20);
        run_steady(&mut timer, 1_040, 2_000, 40);
        assert!((timer.loop_hz() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_peak_catches_single_spike() {
        let mut timer = LoopTimer::new();
        timer.update(0);
        timer.update(20);
        timer.update(110);
        timer.update(130);
        assert_eq!(timer.peak_loop_millis(), 90);

        timer.reset_peak();
        assert_eq!(timer.peak_loop_millis(), 0);
        timer.update(150);
        assert_eq!(timer.stats().peak_loop_ms, 20);
    }

    #[test]
    fn test_first_update_only_starts() {
        let mut timer = LoopTimer::new();
        timer.update(5_000);
        assert_eq!(timer.peak_loop_millis(), 0);
        assert_eq!(timer.loop_hz(), 0.0);
    }
}
