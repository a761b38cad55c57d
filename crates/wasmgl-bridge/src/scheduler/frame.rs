//! Display refresh cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Drawable size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

/// Where the frame cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Not started, or stopped.
    Idle,
    /// Waiting for the next refresh.
    Scheduled { due: Duration },
    /// `draw` is executing.
    Running { due: Duration },
}

/// A frame that is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStart {
    /// Zero-based frame number
    pub index: u64,
    /// Set when the viewport differs from the one last handed to the guest
    pub resized: Option<Viewport>,
}

/// Schedules one `draw` per refresh period.
#[derive(Debug)]
pub struct FrameScheduler {
    phase: FramePhase,
    period: Duration,
    applied: Option<Viewport>,
    frames: u64,
}

impl FrameScheduler {
    /// Create an idle scheduler refreshing at `refresh_hz`.
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1)));
        Self {
            phase: FramePhase::Idle,
            period,
            applied: None,
            frames: 0,
        }
    }

    /// Refresh period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Current phase.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frames begun so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Start the cycle; `applied` is the viewport the guest already knows about.
    pub fn start(&mut self, now: Duration, applied: Viewport) {
        self.applied = Some(applied);
        self.phase = FramePhase::Scheduled { due: now + self.period };
    }

    /// Stop scheduling frames.
    pub fn stop(&mut self) {
        self.phase = FramePhase::Idle;
    }

    /// When the next frame is due, if one is scheduled.
    pub fn due(&self) -> Option<Duration> {
        match self.phase {
            FramePhase::Scheduled { due } => Some(due),
            _ => None,
        }
    }

    /// Begin a frame if one is due at `now`.
    pub fn begin(&mut self, now: Duration, viewport: Viewport) -> Option<FrameStart> {
        let FramePhase::Scheduled { due } = self.phase else {
            return None;
        };
        if due > now {
            return None;
        }
        self.phase = FramePhase::Running { due };
        let resized = (self.applied != Some(viewport)).then_some(viewport);
        self.applied = Some(viewport);
        let index = self.frames;
        self.frames += 1;
        Some(FrameStart { index, resized })
    }

    /// Finish the running frame and schedule the next one.
    pub fn finish(&mut self, now: Duration) {
        let FramePhase::Running { due } = self.phase else {
            return;
        };
        let mut next = due + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.phase = FramePhase::Scheduled { due: next };
    }
}
