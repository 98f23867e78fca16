//! Single-handle holder

use std::sync::Arc;

/// Holds at most one open arena handle for one scope instance.
///
/// Invariant: a bound slot holds a handle that has been opened and not yet
/// disposed. The slot itself is not synchronized; owners wrap it in
/// whatever their scope's concurrency model needs.
#[derive(Debug)]
pub struct Slot<H> {
    handle: Option<Arc<H>>,
}

impl<H> Default for Slot<H> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<H> Slot<H> {
    /// An unbound slot
    #[must_use]
    pub const fn empty() -> Self {
        Self { handle: None }
    }

    /// A slot already holding `handle`
    #[must_use]
    pub fn bound(handle: Arc<H>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Store `handle`. If the slot is already bound the new handle is
    /// handed back untouched.
    pub fn bind(&mut self, handle: Arc<H>) -> Result<(), Arc<H>> {
        if self.handle.is_some() {
            return Err(handle);
        }
        self.handle = Some(handle);
        Ok(())
    }

    /// The bound handle, if any
    #[must_use]
    pub fn get(&self) -> Option<&Arc<H>> {
        self.handle.as_ref()
    }

    /// Clear the slot, returning what it held.
    pub fn take(&mut self) -> Option<Arc<H>> {
        self.handle.take()
    }

    /// Whether a handle is bound
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }
}
