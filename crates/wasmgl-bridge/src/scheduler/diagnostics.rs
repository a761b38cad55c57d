//! Timing diagnostics: achieved timer rate, tick rate and frame cost.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Result of sampling a host timer at a requested interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockReport {
    /// Interval the guest asked for
    pub requested_ms: f64,
    /// Mean interval actually achieved
    pub measured_ms: f64,
    /// `1000 / measured_ms`
    pub measured_hz: f64,
    /// Number of intervals averaged
    pub samples: u32,
}

impl ClockReport {
    /// Frequency the guest asked for.
    pub fn requested_hz(&self) -> f64 {
        1000.0 / self.requested_ms
    }
}

impl fmt::Display for ClockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Real clock: {:.3} ms ({:.3} Hz) ({} ticks sampled)",
            self.measured_ms, self.measured_hz, self.samples
        )
    }
}

/// Dummy timer target that measures the real firing interval.
///
/// The first firing only records the start time; every later one counts as
/// one interval. After `target_samples` intervals it yields a report.
#[derive(Debug, Clone)]
pub struct ClockProbe {
    requested: Duration,
    target_samples: u32,
    count: u32,
    first: Option<Duration>,
}

impl ClockProbe {
    /// Probe a timer running every `requested`, averaging `target_samples` intervals.
    pub fn new(requested: Duration, target_samples: u32) -> Self {
        Self {
            requested,
            target_samples: target_samples.max(1),
            count: 0,
            first: None,
        }
    }

    /// Record one firing at `now`; returns the report once enough were seen.
    pub fn sample(&mut self, now: Duration) -> Option<ClockReport> {
        let Some(first) = self.first else {
            self.first = Some(now);
            return None;
        };
        self.count += 1;
        if self.count < self.target_samples {
            return None;
        }
        let measured_ms = (now - first).as_secs_f64() * 1000.0 / f64::from(self.count);
        Some(ClockReport {
            requested_ms: self.requested.as_secs_f64() * 1000.0,
            measured_ms,
            measured_hz: 1000.0 / measured_ms,
            samples: self.count,
        })
    }
}

/// Achieved ticks per second over a sliding time window.
#[derive(Debug, Clone)]
pub struct TickRateMeter {
    samples: VecDeque<Duration>,
    max_samples: usize,
    window: Duration,
}

impl TickRateMeter {
    /// Keep at most `max_samples` timestamps, measuring over `window`.
    pub fn new(max_samples: usize, window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples.min(4096)),
            max_samples: max_samples.max(2),
            window,
        }
    }

    /// Record a tick at `now`.
    pub fn record(&mut self, now: Duration) {
        self.samples.push_back(now);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Ticks per second across the newest samples that fit in the window.
    pub fn rate_hz(&self) -> Option<f64> {
        let last = *self.samples.back()?;
        if self.samples.len() < 2 {
            return None;
        }
        let mut first_idx = self.samples.len() - 2;
        while first_idx > 0 && last - self.samples[first_idx - 1] <= self.window {
            first_idx -= 1;
        }
        let span = (last - self.samples[first_idx]).as_secs_f64();
        if span <= 0.0 {
            return None;
        }
        let ticks = (self.samples.len() - 1 - first_idx) as f64;
        Some(ticks / span)
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Draw-call cost collector.
pub struct FrameStats {
    samples: Vec<u64>,
    aborted: u64,
}

impl FrameStats {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            aborted: 0,
        }
    }

    /// Record a frame duration in microseconds.
    pub fn record(&mut self, us: u64) {
        self.samples.push(us);
    }

    /// Count a frame whose draw trapped.
    pub fn record_aborted(&mut self) {
        self.aborted += 1;
    }

    /// Number of completed frames.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Number of aborted frames.
    pub fn aborted(&self) -> u64 {
        self.aborted
    }

    /// Mean frame time in microseconds.
    pub fn mean_us(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }

    /// Median frame time in microseconds.
    pub fn p50_us(&self) -> u64 {
        self.percentile(50)
    }

    /// 99th percentile frame time in microseconds.
    pub fn p99_us(&self) -> u64 {
        self.percentile(99)
    }

    /// Get a percentile value.
    pub fn percentile(&self, p: usize) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let idx = (p * sorted.len() / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Fastest frame.
    pub fn min_us(&self) -> u64 {
        self.samples.iter().copied().min().unwrap_or(0)
    }

    /// Slowest frame.
    pub fn max_us(&self) -> u64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "frames={} aborted={} min={}us mean={:.1}us p50={}us p99={}us max={}us",
            self.count(),
            self.aborted,
            self.min_us(),
            self.mean_us(),
            self.p50_us(),
            self.p99_us(),
            self.max_us()
        )
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}
