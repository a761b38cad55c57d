//! Error types for the bridge crate.

use thiserror::Error;

use crate::gl::ObjectKind;

/// What a failed bridge call does to the surrounding guest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Log, leave host state untouched and return a fallback value to the guest.
    SkipCall,
    /// Trap the guest so the current draw, tick or event handler stops.
    /// The session keeps running.
    AbortFrame,
    /// The operation that produced it (boot, remote request) fails as a whole.
    Fatal,
}

/// Bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Guest passed a handle that was never issued
    #[error("invalid handle {0}")]
    InvalidHandle(i32),

    /// Guest passed a handle that refers to a different kind of object
    #[error("handle {handle} is a {found}, expected a {expected}")]
    WrongHandleKind {
        /// The offending handle
        handle: i32,
        /// Kind the call needed
        expected: ObjectKind,
        /// Kind the handle is bound to
        found: ObjectKind,
    },

    /// Handle counter reached the top of the guest's integer range
    #[error("handle space exhausted")]
    HandleSpaceExhausted,

    /// A guest memory view does not fit inside the current arena
    #[error("guest memory access out of bounds: offset={offset:#x} len={len:#x} arena={arena_len:#x}")]
    OutOfBounds {
        /// Start of the requested range
        offset: u64,
        /// Length of the requested range
        len: u64,
        /// Arena size at the time of the request
        arena_len: usize,
    },

    /// A guest-supplied length or count was negative
    #[error("invalid guest length {0}")]
    InvalidLength(i32),

    /// Text payload is not valid UTF-8
    #[error("decode error: {0}")]
    Decode(String),

    /// Pixel format/type pair the upload path cannot size
    #[error("unsupported pixel format {format:#06x} with type {ty:#06x}")]
    UnsupportedPixelFormat {
        /// GL pixel format enum
        format: u32,
        /// GL component type enum
        ty: u32,
    },

    /// Re-entering the guest (strlen, malloc, callbacks) failed
    #[error("guest call `{export}` failed: {reason}")]
    GuestCall {
        /// Name of the guest export
        export: &'static str,
        /// Trap or error message
        reason: String,
    },

    /// A bridge import was called before the guest exports were resolved
    #[error("guest exports not resolved yet")]
    GuestNotReady,

    /// Guest module lacks a required export
    #[error("guest module does not export `{0}`")]
    MissingExport(String),

    /// WebAssembly engine, module or linker error
    #[error("WASM error: {0}")]
    Wasm(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote payload/save/login request failed
    #[error("remote request failed: {0}")]
    Remote(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// How the bridge reacts when a call fails with this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::InvalidHandle(_)
            | Self::WrongHandleKind { .. }
            | Self::UnsupportedPixelFormat { .. }
            | Self::Decode(_) => Disposition::SkipCall,
            Self::OutOfBounds { .. }
            | Self::InvalidLength(_)
            | Self::HandleSpaceExhausted
            | Self::GuestCall { .. }
            | Self::GuestNotReady => Disposition::AbortFrame,
            Self::MissingExport(_)
            | Self::Wasm(_)
            | Self::Config(_)
            | Self::Remote(_)
            | Self::Io(_) => Disposition::Fatal,
        }
    }

    pub(crate) fn guest_call(export: &'static str, err: impl std::fmt::Display) -> Self {
        Self::GuestCall {
            export,
            reason: err.to_string(),
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
