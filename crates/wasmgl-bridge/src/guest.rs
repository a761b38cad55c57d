//! Host-side state shared by every bridge call.
//!
//! [`BridgeContext`] owns everything the guest can reach through imports:
//! the graphics backend, the handle table, the timer queue and the console.
//! [`GuestEnv`] is the narrow view of a running guest the dispatch code needs:
//! the linear memory plus the two guest exports (`strlen`, `malloc`) that
//! string marshalling re-enters.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::Result;
use crate::gl::{GraphicsBackend, ObjectTable};
use crate::scheduler::{ClockProbe, ClockReport, SharedClock, TickRateMeter, TimerQueue, TimerTarget, TimerToken};
use crate::wasm::BridgeConfig;

/// Bounded history of lines the guest printed.
#[derive(Debug)]
pub struct GuestConsole {
    lines: VecDeque<String>,
    capacity: usize,
}

impl GuestConsole {
    /// Keep at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity,
        }
    }

    /// Log a guest line and keep it in the history.
    pub fn push(&mut self, line: String) {
        tracing::info!(target: "wasmgl::guest", "{}", line);
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Lines kept so far, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Most recent line.
    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Take all kept lines.
    pub fn drain(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }
}

/// State behind the bridge imports.
pub struct BridgeContext<B: GraphicsBackend> {
    pub(crate) backend: B,
    pub(crate) objects: ObjectTable<B>,
    pub(crate) timers: TimerQueue,
    pub(crate) clock: SharedClock,
    pub(crate) console: GuestConsole,
    pub(crate) ticks: TickRateMeter,
    measure_clock: bool,
    clock_samples: u32,
    clock_reports: Vec<ClockReport>,
}

impl<B: GraphicsBackend> BridgeContext<B> {
    /// Create a context around `backend`, reading time from `clock`.
    pub fn new(backend: B, clock: SharedClock, config: &BridgeConfig) -> Self {
        let timers = &config.timers;
        Self {
            backend,
            objects: ObjectTable::new(config.handle_soft_limit),
            timers: TimerQueue::new(Duration::from_millis(timers.min_interval_ms)),
            clock,
            console: GuestConsole::new(config.console_history),
            ticks: TickRateMeter::new(
                timers.tick_window_samples,
                Duration::from_millis(timers.tick_window_ms),
            ),
            measure_clock: timers.measure_clock,
            clock_samples: timers.clock_samples,
            clock_reports: Vec::new(),
        }
    }

    /// The graphics backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The graphics backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The guest's graphics objects.
    pub fn objects(&self) -> &ObjectTable<B> {
        &self.objects
    }

    /// Guest console history.
    pub fn console(&self) -> &GuestConsole {
        &self.console
    }

    /// Completed clock probe reports.
    pub fn clock_reports(&self) -> &[ClockReport] {
        &self.clock_reports
    }

    /// Achieved guest tick rate.
    pub fn tick_rate_hz(&self) -> Option<f64> {
        self.ticks.rate_hz()
    }

    /// Pending intervals, clock probes included.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Milliseconds since the session started.
    pub fn time_precise_ms(&self) -> f64 {
        self.clock.now().as_secs_f64() * 1000.0
    }

    /// Register a guest interval calling `func(arg)` every `delay_ms`.
    pub fn set_interval(&mut self, func: i32, delay_ms: i32, arg: i32) -> TimerToken {
        let interval = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        tracing::info!(
            "Set clock to {} ms (expected {} Hz)",
            delay_ms,
            1000.0 / f64::from(delay_ms)
        );
        let now = self.clock.now();
        let token = self
            .timers
            .request_periodic(now, interval, TimerTarget::Guest { func, arg });
        if self.measure_clock {
            let probe = ClockProbe::new(interval, self.clock_samples);
            let probe_token = self
                .timers
                .request_periodic(now, interval, TimerTarget::Probe(probe));
            tracing::debug!(token, probe_token, "clock probe registered");
        }
        token
    }

    /// Cancel a guest interval. Unknown tokens are ignored.
    pub fn clear_interval(&mut self, token: TimerToken) -> bool {
        let removed = self.timers.cancel(token);
        if !removed {
            tracing::debug!(token, "clear_interval for unknown interval");
        }
        removed
    }

    pub(crate) fn record_clock_report(&mut self, report: ClockReport) {
        tracing::info!("{}", report);
        self.clock_reports.push(report);
    }
}

/// A running guest as seen by the bridge imports.
pub trait GuestEnv {
    /// Graphics backend of the surrounding context.
    type Backend: GraphicsBackend;

    /// The bridge context.
    fn context(&mut self) -> &mut BridgeContext<Self::Backend>;

    /// Guest linear memory and the bridge context, borrowed together.
    fn split(&mut self) -> Result<(&mut [u8], &mut BridgeContext<Self::Backend>)>;

    /// Call the guest's `strlen` export.
    fn strlen(&mut self, offset: u32) -> Result<u32>;

    /// Call the guest's `malloc` export. May grow the linear memory.
    fn malloc(&mut self, len: u32) -> Result<u32>;

    /// Guest linear memory.
    fn arena(&mut self) -> Result<&[u8]> {
        let (arena, _) = self.split()?;
        Ok(arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::RecordingBackend;
    use crate::scheduler::{Clock, Fired, ManualClock};
    use std::sync::Arc;

    fn context(clock: &ManualClock, config: &BridgeConfig) -> BridgeContext<RecordingBackend> {
        BridgeContext::new(RecordingBackend::new(), Arc::new(clock.clone()), config)
    }

    #[test]
    fn test_console_is_bounded() {
        let mut console = GuestConsole::new(2);
        console.push("a".into());
        console.push("b".into());
        console.push("c".into());
        assert_eq!(console.lines().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(console.last(), Some("c"));
        assert_eq!(console.drain(), vec!["b".to_string(), "c".to_string()]);
        assert!(console.is_empty());
    }

    #[test]
    fn test_set_interval_registers_probe() {
        let clock = ManualClock::new();
        let mut ctx = context(&clock, &BridgeConfig::default());
        let token = ctx.set_interval(5, 33, 9);
        assert_eq!(token, 1);
        assert_eq!(ctx.pending_timers(), 2);

        assert!(ctx.clear_interval(token));
        assert!(!ctx.clear_interval(token));
        assert_eq!(ctx.pending_timers(), 1);
    }

    #[test]
    fn test_set_interval_without_probe() {
        let clock = ManualClock::new();
        let mut ctx = context(&clock, &BridgeConfig::headless());
        let token = ctx.set_interval(5, 10, 9);
        assert_eq!(ctx.pending_timers(), 1);

        clock.advance(Duration::from_millis(10));
        let fired = ctx.timers.pop_due(clock.now());
        assert_eq!(
            fired,
            Some(Fired::Guest {
                token,
                func: 5,
                arg: 9,
                due: Duration::from_millis(10)
            })
        );
    }

    #[test]
    fn test_time_precise_ms_follows_clock() {
        let clock = ManualClock::new();
        let ctx = context(&clock, &BridgeConfig::default());
        clock.advance(Duration::from_micros(1500));
        assert!((ctx.time_precise_ms() - 1.5).abs() < 1e-9);
    }
}
