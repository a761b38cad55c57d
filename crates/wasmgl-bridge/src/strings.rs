//! UTF-8 text across the guest boundary.

use crate::error::{BridgeError, Result};
use crate::guest::GuestEnv;
use crate::memory::{view, view_mut};

/// Decode exactly `len` bytes at `offset`, rejecting invalid UTF-8.
pub fn decode_strict(arena: &[u8], offset: u32, len: u32) -> Result<String> {
    let bytes = view(arena, offset, len)?.bytes();
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| BridgeError::Decode(format!("at {offset:#x}: {e}")))
}

/// Decode exactly `len` bytes at `offset`.
///
/// Invalid sequences are replaced with U+FFFD and a warning is logged.
pub fn decode_fixed(arena: &[u8], offset: u32, len: u32) -> Result<String> {
    match decode_strict(arena, offset, len) {
        Ok(text) => Ok(text),
        Err(BridgeError::Decode(reason)) => {
            tracing::warn!(%reason, "guest string is not valid UTF-8, decoding lossily");
            let bytes = view(arena, offset, len)?.bytes();
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        Err(e) => Err(e),
    }
}

/// Decode a NUL-terminated guest string, measured with the guest's `strlen`.
pub fn decode_cstring<E: GuestEnv>(env: &mut E, offset: u32) -> Result<String> {
    let len = env.strlen(offset)?;
    decode_fixed(env.arena()?, offset, len)
}

/// Copy `text` plus a trailing NUL into guest-allocated memory.
///
/// The guest owns the returned buffer; the bridge never frees it.
pub fn encode_into_guest<E: GuestEnv>(env: &mut E, text: &str) -> Result<u32> {
    let bytes = text.as_bytes();
    let len = u32::try_from(bytes.len() + 1).map_err(|_| BridgeError::OutOfBounds {
        offset: 0,
        len: bytes.len() as u64 + 1,
        arena_len: u32::MAX as usize,
    })?;
    let ptr = env.malloc(len)?;
    let (arena, _) = env.split()?;
    let mut dst = view_mut(arena, ptr, len)?;
    dst.copy_from(bytes)?;
    dst.write_u8(bytes.len(), 0)?;
    Ok(ptr)
}
