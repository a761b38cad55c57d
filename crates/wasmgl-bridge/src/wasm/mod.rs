//! WebAssembly guest hosting.
//!
//! This module runs a guest module under wasmtime and wires the bridge
//! imports into it. The guest is trusted code running in-process; the store
//! limits here keep a runaway guest from taking the host down with it, they
//! are not a security boundary.
//!
//! ## Guest ABI
//!
//! - **Memory**: one exported linear memory named `memory`
//! - **Allocator**: `malloc(len) -> ptr` and `strlen(ptr) -> len` exports, used
//!   by the bridge for payloads and strings it hands to the guest
//! - **Entry points**: `init(ptr, len)`, `resize(w, h)`, `draw()` and the
//!   `call(func, arg)` trampoline for timers are required; input handlers
//!   and `export` are optional
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wasmgl_bridge::gl::RecordingBackend;
//! use wasmgl_bridge::wasm::{BridgeConfig, BridgeRuntime};
//!
//! let runtime = BridgeRuntime::new(BridgeConfig::headless())?;
//! let module = runtime.load_module("fcsim.wasm")?;
//! let mut session = runtime.boot(&module, RecordingBackend::new(), &payload)?;
//! session.run_frames(60);
//! ```

mod config;
#[cfg(feature = "wasm")]
mod host_functions;
#[cfg(feature = "wasm")]
mod runtime;
#[cfg(feature = "wasm")]
mod session;

pub use config::{BridgeConfig, TimerConfig};
#[cfg(feature = "wasm")]
pub use host_functions::BridgeHostFunctions;
#[cfg(feature = "wasm")]
pub use runtime::{BridgeRuntime, BridgeState, GuestModule};
#[cfg(feature = "wasm")]
pub use session::{PumpReport, Session};
