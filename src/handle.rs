//! Reference-counted owner of a raw mapping.

use std::{
    ptr::NonNull,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::accessor::ViewAccessor;
use crate::errors::{MmapViewError, Result};
use crate::flush::FlushPolicy;
use crate::raw::RawMapping;
use crate::view::View;

// High bit of the reference word marks the handle closed; the rest is the view count.
const CLOSED: usize = 1 << (usize::BITS - 1);
const COUNT_MASK: usize = !CLOSED;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Access mode for a mapping or a view over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapMode {
    /// Read-only mapping.
    ReadOnly,
    /// Read-write mapping. Writes reach the backing store.
    ReadWrite,
    /// Copy-on-Write mapping (private). Writes affect this mapping only; the backing store remains unchanged.
    CopyOnWrite,
}

impl MmapMode {
    /// Whether writes are permitted in this mode.
    #[must_use]
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Whether a view in `view` mode can be opened over a mapping in this mode.
    #[must_use]
    pub fn permits(self, view: MmapMode) -> bool {
        match view {
            MmapMode::ReadOnly => true,
            MmapMode::ReadWrite => self == MmapMode::ReadWrite,
            MmapMode::CopyOnWrite => self == MmapMode::CopyOnWrite,
        }
    }
}

/// An open mapping shared by any number of [`View`]s.
///
/// The handle counts the views that reference it. When the last view is
/// released the mapping is unmapped, and the handle stays closed from then on.
/// A handle that never had a view is unmapped when its last `Arc` is dropped.
///
/// The count and the closed flag share one atomic word, so acquire and release
/// are lock-free. The mapping itself sits behind an `RwLock`: reads and writes
/// through views take the shared side, unmapping takes the exclusive side, so
/// no access can observe a torn-down address range.
pub struct MappingHandle {
    id: u64,
    mode: MmapMode,
    capacity: u64,
    flush_policy: FlushPolicy,
    refs: AtomicUsize,
    map: RwLock<Option<Box<dyn RawMapping>>>,
}

impl std::fmt::Debug for MappingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingHandle")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("capacity", &self.capacity)
            .field("open", &self.is_open())
            .field("views", &self.ref_count())
            .finish()
    }
}

impl MappingHandle {
    /// Wrap an established raw mapping. Capacity is the mapping's length.
    #[must_use]
    pub fn from_raw(raw: Box<dyn RawMapping>, mode: MmapMode) -> Arc<Self> {
        Self::with_policy(raw, mode, FlushPolicy::default())
    }

    /// Wrap an established raw mapping; accessors created from it use `flush_policy`.
    #[must_use]
    pub fn with_policy(
        raw: Box<dyn RawMapping>,
        mode: MmapMode,
        flush_policy: FlushPolicy,
    ) -> Arc<Self> {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        let capacity = raw.len() as u64;
        log::debug!("mapping handle {id} opened: mode={mode:?} capacity={capacity}");
        Arc::new(Self {
            id,
            mode,
            capacity,
            flush_policy,
            refs: AtomicUsize::new(0),
            map: RwLock::new(Some(raw)),
        })
    }

    /// Process-unique identifier, used in log output.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Access mode the mapping was established with.
    #[must_use]
    pub fn mode(&self) -> MmapMode {
        self.mode
    }

    /// Total mapped length in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Flush policy inherited by accessors created over this handle.
    #[must_use]
    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush_policy
    }

    /// Whether the mapping is still established.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.refs.load(Ordering::Acquire) & CLOSED == 0
    }

    /// Number of views currently holding this handle.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Base address of the mapping, or `None` once closed.
    #[must_use]
    pub fn base_address(&self) -> Option<NonNull<u8>> {
        self.map.read().as_ref().map(|m| m.base())
    }

    /// Unmap now. Idempotent.
    ///
    /// The handle is closed after this call whatever the outcome; outstanding
    /// views fail their subsequent operations with `InvalidState`.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Resource` if the OS reports a failure while unmapping.
    pub fn close(&self) -> Result<()> {
        let prev = self.refs.fetch_or(CLOSED, Ordering::AcqRel);
        if prev & CLOSED != 0 {
            return Ok(());
        }
        self.unmap()
    }

    /// Register one more view. Fails once the handle is closed.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` if the handle is closed, or
    /// `MmapViewError::Resource` if the view count is saturated.
    pub fn acquire(&self) -> Result<()> {
        let mut cur = self.refs.load(Ordering::Acquire);
        loop {
            if cur & CLOSED != 0 {
                return Err(MmapViewError::InvalidState("mapping handle is closed"));
            }
            if cur & COUNT_MASK == COUNT_MASK {
                return Err(MmapViewError::Resource("too many views over one mapping".into()));
            }
            match self.refs.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Drop one view's claim. The transition to zero closes the handle.
    ///
    /// A release without a matching acquire is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Resource` if this release closed the handle and
    /// unmapping failed. The count is already updated when the error is returned.
    pub fn release(&self) -> Result<()> {
        let mut cur = self.refs.load(Ordering::Acquire);
        loop {
            let count = cur & COUNT_MASK;
            if count == 0 {
                log::warn!("mapping handle {}: release without matching acquire", self.id);
                return Ok(());
            }
            let next = if count == 1 { CLOSED } else { cur - 1 };
            match self.refs.compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(prev) => {
                    if count == 1 && prev & CLOSED == 0 {
                        return self.unmap();
                    }
                    return Ok(());
                }
                Err(actual) => cur = actual,
            }
        }
    }

    /// Create a view over `[offset, offset+size)` and bind an accessor to it.
    /// A `size` of zero means the rest of the mapping.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Argument` for an out-of-range request, a closed
    /// handle, or an access mode the mapping cannot satisfy.
    pub fn create_view_accessor(
        self: &Arc<Self>,
        offset: u64,
        size: u64,
        access: MmapMode,
    ) -> Result<ViewAccessor> {
        let view = View::create(Arc::clone(self), offset, size, access)?;
        Ok(ViewAccessor::new(view))
    }

    /// Run `f` against the live mapping, holding off unmap for its duration.
    pub(crate) fn with_map<R>(&self, f: impl FnOnce(&dyn RawMapping) -> R) -> Result<R> {
        let guard = self.map.read();
        match guard.as_deref() {
            Some(map) => Ok(f(map)),
            None => Err(MmapViewError::InvalidState("mapping handle is closed")),
        }
    }

    fn unmap(&self) -> Result<()> {
        let taken = self.map.write().take();
        let Some(map) = taken else {
            return Ok(());
        };
        match map.unmap() {
            Ok(()) => {
                log::debug!("mapping handle {} closed", self.id);
                Ok(())
            }
            Err(e) => {
                log::error!("mapping handle {}: unmap failed: {e}", self.id);
                Err(MmapViewError::Resource(format!("unmap failed: {e}")))
            }
        }
    }
}

#[cfg(test)]
impl MappingHandle {
    /// Overwrite the view count, keeping the closed bit.
    pub(crate) fn force_ref_count(&self, count: usize) {
        let closed = self.refs.load(Ordering::Acquire) & CLOSED;
        self.refs.store(closed | (count & COUNT_MASK), Ordering::Release);
    }
}

impl Drop for MappingHandle {
    fn drop(&mut self) {
        // Errors are already logged by unmap.
        let _ = self.close();
    }
}
