//! Periodic callbacks requested by the guest.
//!
//! Intervals live in a token map; a min-heap keyed by next fire time (ties
//! broken by registration order) decides who fires next. Cancelling only
//! removes the map entry. Heap entries for cancelled tokens are dropped when
//! they surface, so a fire that was already queued when `cancel` ran never
//! reaches guest code.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use super::diagnostics::{ClockProbe, ClockReport};

/// Guest-visible interval id.
pub type TimerToken = i32;

/// What an interval invokes.
#[derive(Debug, Clone)]
pub enum TimerTarget {
    /// Guest function reference and its opaque argument, run through the
    /// guest's `call` trampoline.
    Guest { func: i32, arg: i32 },
    /// Host-only probe measuring the achieved interval.
    Probe(ClockProbe),
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub enum Fired {
    /// Run `call(func, arg)` in the guest.
    Guest {
        token: TimerToken,
        func: i32,
        arg: i32,
        /// When this firing was due
        due: Duration,
    },
    /// A clock probe sampled; carries its report once complete.
    Probe {
        token: TimerToken,
        report: Option<ClockReport>,
    },
}

#[derive(Debug)]
struct PendingInterval {
    interval: Duration,
    target: TimerTarget,
}

/// Pending intervals ordered by next fire time.
#[derive(Debug)]
pub struct TimerQueue {
    pending: HashMap<TimerToken, PendingInterval>,
    queue: BinaryHeap<Reverse<(Duration, u64, TimerToken)>>,
    next_token: TimerToken,
    seq: u64,
    min_interval: Duration,
}

impl TimerQueue {
    /// Create a queue that clamps intervals to at least `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            queue: BinaryHeap::new(),
            next_token: 1,
            seq: 0,
            min_interval: min_interval.max(Duration::from_micros(1)),
        }
    }

    /// Register an interval whose first firing is `interval` after `now`.
    pub fn request_periodic(&mut self, now: Duration, interval: Duration, target: TimerTarget) -> TimerToken {
        let interval = interval.max(self.min_interval);
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1).max(1);
        self.pending.insert(token, PendingInterval { interval, target });
        self.push(now + interval, token);
        token
    }

    /// Cancel an interval. Returns false for unknown or already cancelled tokens.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        self.pending.remove(&token).is_some()
    }

    /// Whether `token` is still registered.
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.pending.contains_key(&token)
    }

    /// Number of registered intervals, probes included.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest fire time among live intervals.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        while let Some(Reverse((due, _, token))) = self.queue.peek().copied() {
            if self.pending.contains_key(&token) {
                return Some(due);
            }
            self.queue.pop();
        }
        None
    }

    /// Pop the earliest interval due at or before `now` and reschedule it.
    ///
    /// Periods missed while the host was busy are skipped, not replayed.
    pub fn pop_due(&mut self, now: Duration) -> Option<Fired> {
        loop {
            let Reverse((due, _, token)) = self.queue.peek().copied()?;
            if due > now {
                return None;
            }
            self.queue.pop();
            let Some(entry) = self.pending.get_mut(&token) else {
                tracing::trace!(token, "dropping fire for cancelled interval");
                continue;
            };

            let mut next = due + entry.interval;
            if next <= now {
                next = now + entry.interval;
            }
            let fired = match &mut entry.target {
                TimerTarget::Guest { func, arg } => Fired::Guest {
                    token,
                    func: *func,
                    arg: *arg,
                    due,
                },
                TimerTarget::Probe(probe) => Fired::Probe {
                    token,
                    report: probe.sample(now),
                },
            };

            if matches!(fired, Fired::Probe { report: Some(_), .. }) {
                self.pending.remove(&token);
            } else {
                self.push(next, token);
            }
            return Some(fired);
        }
    }

    fn push(&mut self, at: Duration, token: TimerToken) {
        self.seq += 1;
        self.queue.push(Reverse((at, self.seq, token)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::clock::{Clock, MonotonicClock};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn guest(func: i32) -> TimerTarget {
        TimerTarget::Guest { func, arg: 0 }
    }

    fn drain(queue: &mut TimerQueue, now: Duration) -> Vec<Fired> {
        std::iter::from_fn(|| queue.pop_due(now)).collect()
    }

    #[test]
    fn test_tokens_start_at_one_and_increase() {
        let mut q = TimerQueue::new(ms(1));
        assert_eq!(q.request_periodic(ms(0), ms(10), guest(0)), 1);
        assert_eq!(q.request_periodic(ms(0), ms(10), guest(1)), 2);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_fires_every_interval() {
        let mut q = TimerQueue::new(ms(1));
        let t = q.request_periodic(ms(0), ms(10), TimerTarget::Guest { func: 3, arg: 9 });
        assert!(q.pop_due(ms(9)).is_none());
        assert_eq!(
            q.pop_due(ms(10)),
            Some(Fired::Guest {
                token: t,
                func: 3,
                arg: 9,
                due: ms(10)
            })
        );
        assert!(q.pop_due(ms(10)).is_none());
        assert_eq!(q.next_deadline(), Some(ms(20)));
    }

    #[test]
    fn test_late_host_skips_missed_periods() {
        let mut q = TimerQueue::new(ms(1));
        q.request_periodic(ms(0), ms(10), guest(0));
        assert_eq!(drain(&mut q, ms(55)).len(), 1);
        assert_eq!(q.next_deadline(), Some(ms(65)));
    }

    #[test]
    fn test_cancel_prevents_queued_fire() {
        let mut q = TimerQueue::new(ms(1));
        let a = q.request_periodic(ms(0), ms(10), guest(1));
        let b = q.request_periodic(ms(0), ms(10), guest(2));

        // Both are due at 10ms; `a` fires first and its callback cancels `b`.
        let first = q.pop_due(ms(10)).unwrap();
        assert!(matches!(first, Fired::Guest { token, .. } if token == a));
        assert!(q.cancel(b));
        assert!(q.pop_due(ms(10)).is_none());

        let later = drain(&mut q, ms(100));
        assert!(later
            .iter()
            .all(|f| matches!(f, Fired::Guest { token, .. } if *token == a)));
    }

    #[test]
    fn test_self_cancel_stops_future_fires() {
        let mut q = TimerQueue::new(ms(1));
        let a = q.request_periodic(ms(0), ms(5), guest(1));
        assert!(q.pop_due(ms(5)).is_some());
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert!(q.pop_due(ms(1000)).is_none());
        assert_eq!(q.next_deadline(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let mut q = TimerQueue::new(ms(4));
        q.request_periodic(ms(0), ms(0), guest(0));
        assert_eq!(q.next_deadline(), Some(ms(4)));
    }

    #[test]
    fn test_same_deadline_fires_in_registration_order() {
        let mut q = TimerQueue::new(ms(1));
        for func in 0..5 {
            q.request_periodic(ms(0), ms(10), guest(func));
        }
        let order: Vec<i32> = drain(&mut q, ms(10))
            .into_iter()
            .map(|f| match f {
                Fired::Guest { func, .. } => func,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_probe_completes_and_unregisters() {
        let mut q = TimerQueue::new(ms(1));
        let probe = q.request_periodic(ms(0), ms(33), TimerTarget::Probe(ClockProbe::new(ms(33), 50)));
        let mut report = None;
        for step in 1..=51u64 {
            match q.pop_due(ms(step * 33)) {
                Some(Fired::Probe { report: r, .. }) => report = r,
                other => panic!("unexpected {other:?}"),
            }
        }
        let report = report.expect("probe should report after 50 intervals");
        assert_eq!(report.samples, 50);
        assert!((report.measured_hz - 1000.0 / 33.0).abs() < 1e-6);
        assert!(!q.is_pending(probe));
    }

    #[test]
    fn test_real_clock_33ms_interval_measures_near_30hz() {
        let clock = MonotonicClock::new();
        let mut q = TimerQueue::new(ms(1));
        q.request_periodic(clock.now(), ms(33), TimerTarget::Probe(ClockProbe::new(ms(33), 50)));

        let report = loop {
            let deadline = q.next_deadline().expect("probe still pending");
            clock.sleep_until(deadline);
            if let Some(Fired::Probe { report: Some(r), .. }) = q.pop_due(clock.now()) {
                break r;
            }
        };
        assert_eq!(report.samples, 50);
        assert!(
            (25.0..=31.0).contains(&report.measured_hz),
            "measured {} Hz",
            report.measured_hz
        );
    }
}
