//! Frame and tick scheduling.
//!
//! Two independent cycles share one [`Clock`]: the display refresh that calls
//! the guest's `draw`, and the guest-requested intervals that call back into
//! the guest through its `call` trampoline.

pub mod clock;
pub mod diagnostics;
pub mod frame;
pub mod timers;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use diagnostics::{ClockProbe, ClockReport, FrameStats, TickRateMeter};
pub use frame::{FramePhase, FrameScheduler, FrameStart, Viewport};
pub use timers::{Fired, TimerQueue, TimerTarget, TimerToken};
