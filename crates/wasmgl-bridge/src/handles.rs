//! Integer handles for host objects.
//!
//! The guest can only pass integers across the boundary, so every host object
//! it needs to name again later (buffers, textures, shaders, programs, uniform
//! locations) is registered here and referred to by its slot index.
//!
//! Handles are issued from 0 upwards and never reused. Deleting the host
//! object behind a handle only marks the slot dead; the entry itself stays,
//! so a stale handle held by the guest can never alias a newer object.

use crate::error::{BridgeError, Result};

/// Guest-visible handle.
pub type Handle = i32;

struct Slot<T> {
    object: T,
    live: bool,
}

/// Append-only table mapping handles to host objects.
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    dead: usize,
}

impl<T> HandleTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            dead: 0,
        }
    }

    /// Register a new object and return its handle.
    pub fn create(&mut self, object: T) -> Result<Handle> {
        let handle = Handle::try_from(self.slots.len()).map_err(|_| BridgeError::HandleSpaceExhausted)?;
        self.slots.push(Slot { object, live: true });
        Ok(handle)
    }

    /// Resolve a handle to the object it was issued for.
    pub fn resolve(&self, handle: Handle) -> Result<&T> {
        usize::try_from(handle)
            .ok()
            .and_then(|idx| self.slots.get(idx))
            .map(|slot| &slot.object)
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    /// Mark the object behind `handle` as deleted. The slot is kept.
    pub fn retire(&mut self, handle: Handle) -> Result<()> {
        let slot = usize::try_from(handle)
            .ok()
            .and_then(|idx| self.slots.get_mut(idx))
            .ok_or(BridgeError::InvalidHandle(handle))?;
        if slot.live {
            slot.live = false;
            self.dead += 1;
        }
        Ok(())
    }

    /// Whether the object behind `handle` has not been deleted.
    pub fn is_live(&self, handle: Handle) -> bool {
        usize::try_from(handle)
            .ok()
            .and_then(|idx| self.slots.get(idx))
            .is_some_and(|slot| slot.live)
    }

    /// Number of handles issued so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no handle has been issued.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots whose object was deleted.
    pub fn dead_count(&self) -> usize {
        self.dead
    }

    /// Number of slots whose object is still alive.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.dead
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
