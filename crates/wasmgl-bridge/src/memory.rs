//! Bounded views over guest linear memory.
//!
//! ## Memory Convention
//!
//! - Guest pointers are `i32` on the wire and reinterpreted as `u32` offsets
//! - Multi-byte values are little-endian
//! - Lengths and counts are `i32` on the wire; negative values are rejected
//!
//! A [`View`] borrows the arena slice it was cut from. Any call back into the
//! guest needs mutable access to the whole store, so the borrow checker
//! rejects code that keeps a view alive across `strlen`, `malloc` or a guest
//! callback, any of which may grow (and move) the arena.

use crate::error::{BridgeError, Result};

fn bounds(arena_len: usize, offset: u32, len: u32) -> Result<std::ops::Range<usize>> {
    let start = offset as usize;
    start
        .checked_add(len as usize)
        .filter(|&end| end <= arena_len)
        .map(|end| start..end)
        .ok_or(BridgeError::OutOfBounds {
            offset: u64::from(offset),
            len: u64::from(len),
            arena_len,
        })
}

/// Take a read-only view of `[offset, offset + len)`.
pub fn view(arena: &[u8], offset: u32, len: u32) -> Result<View<'_>> {
    let range = bounds(arena.len(), offset, len)?;
    Ok(View {
        base: offset,
        bytes: &arena[range],
    })
}

/// Take a read-only view from `offset` to the end of the arena.
pub fn view_to_end(arena: &[u8], offset: u32) -> Result<View<'_>> {
    let len = arena.len().checked_sub(offset as usize).ok_or(BridgeError::OutOfBounds {
        offset: u64::from(offset),
        len: 0,
        arena_len: arena.len(),
    })?;
    // Arenas are at most 4 GiB, so the remainder always fits in u32.
    view(arena, offset, len as u32)
}

/// Take a writable view of `[offset, offset + len)`.
pub fn view_mut(arena: &mut [u8], offset: u32, len: u32) -> Result<ViewMut<'_>> {
    let range = bounds(arena.len(), offset, len)?;
    Ok(ViewMut {
        base: offset,
        bytes: &mut arena[range],
    })
}

/// Convert a guest length or count into an unsigned size.
pub fn guest_len(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| BridgeError::InvalidLength(value))
}

/// Convert a guest pointer into an arena offset.
pub fn guest_ptr(value: i32) -> u32 {
    value as u32
}

/// Read-only window over guest memory.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    base: u32,
    bytes: &'a [u8],
}

impl<'a> View<'a> {
    /// Arena offset of the first byte.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of bytes in the view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length view.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The viewed bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    fn array<const N: usize>(&self, at: usize) -> Result<[u8; N]> {
        at.checked_add(N)
            .and_then(|end| self.bytes.get(at..end))
            .and_then(|b| b.try_into().ok())
            .ok_or(BridgeError::OutOfBounds {
                offset: u64::from(self.base) + at as u64,
                len: N as u64,
                arena_len: self.base as usize + self.bytes.len(),
            })
    }

    /// Read a byte at a view-relative offset.
    pub fn read_u8(&self, at: usize) -> Result<u8> {
        Ok(self.array::<1>(at)?[0])
    }

    /// Read a little-endian `i32`.
    pub fn read_i32(&self, at: usize) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array(at)?))
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&self, at: usize) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(at)?))
    }

    /// Read a little-endian `f64`.
    pub fn read_f64(&self, at: usize) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array(at)?))
    }
}

/// Writable window over guest memory.
#[derive(Debug)]
pub struct ViewMut<'a> {
    base: u32,
    bytes: &'a mut [u8],
}

impl ViewMut<'_> {
    /// Arena offset of the first byte.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of bytes in the view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length view.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy `src` to the start of the view. `src` must not be longer than the view.
    pub fn copy_from(&mut self, src: &[u8]) -> Result<()> {
        let arena_len = self.base as usize + self.bytes.len();
        let dst = self.bytes.get_mut(..src.len()).ok_or(BridgeError::OutOfBounds {
            offset: u64::from(self.base),
            len: src.len() as u64,
            arena_len,
        })?;
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Write a byte at a view-relative offset.
    pub fn write_u8(&mut self, at: usize, value: u8) -> Result<()> {
        let arena_len = self.base as usize + self.bytes.len();
        let byte = self.bytes.get_mut(at).ok_or(BridgeError::OutOfBounds {
            offset: u64::from(self.base) + at as u64,
            len: 1,
            arena_len,
        })?;
        *byte = value;
        Ok(())
    }
}
