//! In-memory guest for unit tests.

use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::gl::RecordingBackend;
use crate::guest::{BridgeContext, GuestEnv};
use crate::scheduler::ManualClock;
use crate::wasm::BridgeConfig;

/// Guest backed by a plain `Vec`, with a bump allocator and a scanning `strlen`.
pub(crate) struct VecGuest {
    pub arena: Vec<u8>,
    pub heap: u32,
    pub ctx: BridgeContext<RecordingBackend>,
    pub clock: ManualClock,
    pub mallocs: usize,
}

impl VecGuest {
    pub fn new(size: usize) -> Self {
        let clock = ManualClock::new();
        Self {
            arena: vec![0; size],
            heap: (size / 2) as u32,
            ctx: BridgeContext::new(
                RecordingBackend::new(),
                Arc::new(clock.clone()),
                &BridgeConfig::default(),
            ),
            clock,
            mallocs: 0,
        }
    }

    /// Place bytes at `offset`.
    pub fn poke(&mut self, offset: u32, bytes: &[u8]) {
        let at = offset as usize;
        self.arena[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Place a NUL-terminated string at `offset`.
    pub fn poke_cstr(&mut self, offset: u32, text: &str) {
        self.poke(offset, text.as_bytes());
        self.poke(offset + text.len() as u32, &[0]);
    }
}

impl GuestEnv for VecGuest {
    type Backend = RecordingBackend;

    fn context(&mut self) -> &mut BridgeContext<RecordingBackend> {
        &mut self.ctx
    }

    fn split(&mut self) -> Result<(&mut [u8], &mut BridgeContext<RecordingBackend>)> {
        Ok((self.arena.as_mut_slice(), &mut self.ctx))
    }

    fn strlen(&mut self, offset: u32) -> Result<u32> {
        let tail = self.arena.get(offset as usize..).ok_or(BridgeError::OutOfBounds {
            offset: u64::from(offset),
            len: 1,
            arena_len: self.arena.len(),
        })?;
        tail.iter()
            .position(|&b| b == 0)
            .map(|n| n as u32)
            .ok_or_else(|| BridgeError::guest_call("strlen", "unterminated string"))
    }

    fn malloc(&mut self, len: u32) -> Result<u32> {
        self.mallocs += 1;
        let ptr = self.heap.next_multiple_of(8);
        let end = ptr as usize + len as usize;
        if end > self.arena.len() {
            // grow like memory.grow, one 64 KiB page at a time
            let pages = (end - self.arena.len()).div_ceil(65536);
            self.arena.resize(self.arena.len() + pages * 65536, 0);
        }
        self.heap = end as u32;
        Ok(ptr)
    }
}
