//! Caller-owned timers.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Measures elapsed wall time from its creation.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Starts a stopwatch.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whole milliseconds since start.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Records named laps of an operation for later reporting.
///
/// A disabled profile accepts laps and discards them, so callers can pass
/// one unconditionally.
#[derive(Debug)]
pub struct Profile {
    enabled: bool,
    total: Stopwatch,
    last: Instant,
    laps: Vec<(String, Duration)>,
}

impl Profile {
    /// Creates a recording profile.
    #[must_use]
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// Creates a profile that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    fn with_enabled(enabled: bool) -> Self {
        let total = Stopwatch::start();
        Self {
            enabled,
            last: total.started,
            total,
            laps: Vec::new(),
        }
    }

    /// Returns true if laps are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Closes the current lap under `label` and starts the next one.
    pub fn lap(&mut self, label: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        self.laps.push((label.into(), now - self.last));
        self.last = now;
    }

    /// Recorded laps in order.
    #[must_use]
    pub fn laps(&self) -> &[(String, Duration)] {
        &self.laps
    }

    /// Renders one line per lap followed by the total.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (label, duration) in &self.laps {
            let _ = writeln!(out, "{label}: {:.3} ms", duration.as_secs_f64() * 1000.0);
        }
        let _ = writeln!(
            out,
            "total: {:.3} ms",
            self.total.elapsed().as_secs_f64() * 1000.0
        );
        out
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laps_are_recorded_in_order() {
        let mut profile = Profile::new();
        profile.lap("open");
        profile.lap("read");
        let labels: Vec<_> = profile.laps().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, ["open", "read"]);
        assert!(profile.report().contains("total:"));
    }

    #[test]
    fn disabled_profile_discards_laps() {
        let mut profile = Profile::disabled();
        profile.lap("open");
        assert!(profile.laps().is_empty());
        assert!(!profile.is_enabled());
    }

    #[test]
    fn stopwatch_moves_forward() {
        let watch = Stopwatch::start();
        std::thread::sleep(Duration::from_millis(2));
        assert!(watch.elapsed() >= Duration::from_millis(2));
    }
}
