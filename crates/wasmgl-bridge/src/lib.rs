//! # WasmGL Bridge
//!
//! Host side of a WebAssembly guest that renders through an immediate-mode
//! graphics API.
//!
//! The guest never sees host objects. It sees small integer handles, reads
//! and writes its own linear memory, and calls a flat list of imports. This
//! crate resolves those handles, decodes guest memory, forwards calls to a
//! [`gl::GraphicsBackend`] and drives the guest's frame and timer callbacks.
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`handles`] | Integer handle table, never reused |
//! | [`memory`] | Bounds-checked views into the guest arena |
//! | [`strings`] | UTF-8 decoding and guest string allocation |
//! | [`format`] | printf-style formatting over guest varargs |
//! | [`dispatch`] | One function per guest import |
//! | [`scheduler`] | Frame pacing, periodic timers, clock diagnostics |
//! | [`wasm`] | wasmtime runtime, linker and session loop |
//! | [`remote`] | Payload fetch, design save and login |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wasmgl_bridge::gl::RecordingBackend;
//! use wasmgl_bridge::wasm::{BridgeConfig, BridgeRuntime};
//!
//! let runtime = BridgeRuntime::new(BridgeConfig::default())?;
//! let module = runtime.load_module("fcsim.wasm")?;
//! let mut session = runtime.boot(&module, RecordingBackend::new(), b"<level/>")?;
//! session.run_until(std::time::Duration::from_secs(1));
//! println!("{}", session.frame_stats().summary());
//! ```
//!
//! ## Features
//!
//! - `wasm` - wasmtime guest runtime (default)
//! - `remote` - blocking HTTP client for the level server (default)

#![warn(rust_2018_idioms)]

pub mod dispatch;
pub mod error;
pub mod format;
pub mod gl;
pub mod guest;
pub mod handles;
pub mod input;
pub mod memory;
pub mod scheduler;
pub mod strings;
pub mod wasm;

#[cfg(feature = "remote")]
pub mod remote;

#[cfg(test)]
mod testing;

// Re-export main types
pub use error::{BridgeError, Disposition, Result};
pub use gl::{GraphicsBackend, ObjectKind, ObjectTable, RecordingBackend};
pub use guest::{BridgeContext, GuestConsole, GuestEnv};
pub use handles::{Handle, HandleTable};
pub use input::{GuestInput, InputEvent};
pub use scheduler::{Clock, ClockReport, FrameStats, ManualClock, MonotonicClock, SharedClock, Viewport};
pub use wasm::{BridgeConfig, TimerConfig};

#[cfg(feature = "wasm")]
pub use wasm::{BridgeRuntime, GuestModule, PumpReport, Session};

#[cfg(feature = "remote")]
pub use remote::{LoginOutcome, PayloadId, RemoteClient, RemoteConfig, SaveOutcome};
