//! Wall-clock timing with exponential smoothing.

use std::collections::HashMap;
use std::ops::Index;
use std::time::{Duration, Instant};

/// Weight of the newest sample in the smoothed duration.
const ALPHA: f64 = 0.1;

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Accumulated statistics for one named measurement.
#[derive(Debug, Clone, Default)]
pub struct CallStat {
    calls: u64,
    total_ms: f64,
    last_ms: f64,
    smoothed_ms: Option<f64>,
    started: Option<Instant>,
}

impl CallStat {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    fn finish(&mut self) {
        if let Some(started) = self.started.take() {
            self.record(started.elapsed());
        }
    }

    fn record(&mut self, elapsed: Duration) {
        let ms = as_ms(elapsed);
        self.calls += 1;
        self.total_ms += ms;
        self.last_ms = ms;
        let seed = self.smoothed_ms.unwrap_or(ms);
        self.smoothed_ms = Some(seed * (1.0 - ALPHA) + ms * ALPHA);
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn last_ms(&self) -> f64 {
        self.last_ms
    }

    /// Smoothed duration in milliseconds.
    ///
    /// Before the first completed call this reports the time elapsed
    /// since the open measurement started, so live displays move during
    /// the very first call; afterwards the smoothed estimate holds even
    /// while a measurement is open.
    pub fn smoothed_ms(&self) -> f64 {
        match (self.smoothed_ms, self.started) {
            (Some(ms), _) => ms,
            (None, Some(started)) => as_ms(started.elapsed()),
            (None, None) => 0.0,
        }
    }

    pub fn mean_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_ms / self.calls as f64
        }
    }
}

/// Registry of named [`CallStat`]s.
///
/// `start` creates the entry on first use; `finish` and `stat` panic on
/// a name that was never started, which always indicates a typo at the
/// call site rather than a runtime condition.
#[derive(Debug, Default)]
pub struct Timer {
    stats: HashMap<String, CallStat>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a measurement for `name`, creating its stat on first use.
    pub fn start(&mut self, name: &str) {
        self.stats.entry(name.to_string()).or_default().start();
    }

    /// Close the open measurement for `name` and fold it into the stat.
    ///
    /// # Panics
    ///
    /// Panics if `name` was never started.
    pub fn finish(&mut self, name: &str) {
        match self.stats.get_mut(name) {
            Some(stat) => stat.finish(),
            None => panic!("no timer with name {name}"),
        }
    }

    /// # Panics
    ///
    /// Panics if `name` was never started.
    pub fn stat(&self, name: &str) -> &CallStat {
        match self.stats.get(name) {
            Some(stat) => stat,
            None => panic!("no timer with name {name}"),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CallStat> {
        self.stats.get(name)
    }
}

impl Index<&str> for Timer {
    type Output = CallStat;

    fn index(&self, name: &str) -> &CallStat {
        self.stat(name)
    }
}
