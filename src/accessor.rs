//! Bounds-checked typed access to a single view.

use crate::errors::{MmapViewError, Result};
use crate::flush::FlushTracker;
use crate::handle::MmapMode;
use crate::storage::{self, Primitive};
use crate::utils::ensure_in_bounds;
use crate::view::View;

const ERR_CLOSED: &str = "view accessor is closed";

enum AccessorState {
    Open(View),
    Closed,
}

/// User-facing handle bound to exactly one [`View`].
///
/// Offsets passed to `read`/`write` are relative to the offset the view was
/// requested at; page rounding never shows through. Disposing the accessor
/// (explicitly or by dropping it) flushes a write-capable view and then
/// releases it, in that order, even if the flush fails.
///
/// # Examples
///
/// ```no_run
/// use mmap_view::{MappingBuilder, MmapMode};
///
/// let handle = MappingBuilder::new("data.bin").capacity(8192).create()?;
/// let mut acc = handle.create_view_accessor(5000, 1000, MmapMode::ReadWrite)?;
/// acc.write::<u32>(0, 0xDEAD_BEEF)?;
/// assert_eq!(acc.read::<u32>(0)?, 0xDEAD_BEEF);
/// acc.flush()?;
/// acc.dispose();
/// # Ok::<(), mmap_view::MmapViewError>(())
/// ```
pub struct ViewAccessor {
    state: AccessorState,
    capacity: u64,
    access: MmapMode,
    tracker: FlushTracker,
}

impl std::fmt::Debug for ViewAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("ViewAccessor");
        d.field("capacity", &self.capacity)
            .field("access", &self.access)
            .field("pending_bytes", &self.tracker.pending_bytes());
        match &self.state {
            AccessorState::Open(view) => d.field("view", view),
            AccessorState::Closed => d.field("view", &"<closed>"),
        };
        d.finish()
    }
}

impl ViewAccessor {
    /// Bind an accessor to `view`, taking ownership of it.
    #[must_use]
    pub fn new(view: View) -> Self {
        let capacity = view.capacity();
        let access = view.access();
        let tracker = FlushTracker::new(view.handle().flush_policy());
        Self {
            state: AccessorState::Open(view),
            capacity,
            access,
            tracker,
        }
    }

    /// Number of addressable bytes, as requested when the view was created.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Access mode of the underlying view.
    #[must_use]
    pub fn access(&self) -> MmapMode {
        self.access
    }

    /// Whether the accessor has not been disposed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, AccessorState::Open(_))
    }

    /// Whether reads are currently possible.
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.is_open()
    }

    /// Whether writes are currently possible.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.is_open() && self.access.is_writable()
    }

    /// Page-aligned physical offset of the view within its mapping.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` once the view has been released.
    pub fn pointer_offset(&self) -> Result<u64> {
        Ok(self.view()?.pointer_offset())
    }

    /// Offset the view was requested at.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` once the view has been released.
    pub fn logical_offset(&self) -> Result<u64> {
        Ok(self.view()?.logical_offset())
    }

    /// Read a `T` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` if closed, or
    /// `MmapViewError::OutOfRange` if `offset + size_of::<T>()` exceeds capacity.
    pub fn read<T: Primitive>(&self, offset: u64) -> Result<T> {
        let view = self.view()?;
        ensure_in_bounds(offset, T::SIZE as u64, self.capacity)?;
        // SAFETY: the access lies in [0, capacity) past the logical start, inside the mapping.
        view.with_region(|base| unsafe { storage::load::<T>(base, offset as usize) })
    }

    /// Write `value` at `offset`.
    ///
    /// The write has taken effect even if a policy-triggered flush then fails.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` if closed, `MmapViewError::InvalidMode`
    /// for a read-only view, `MmapViewError::OutOfRange` if the value does not fit,
    /// or `MmapViewError::Resource` if a policy-triggered flush fails.
    pub fn write<T: Primitive>(&mut self, offset: u64, value: T) -> Result<()> {
        let view = self.writable_view()?;
        ensure_in_bounds(offset, T::SIZE as u64, self.capacity)?;
        // SAFETY: the access lies in [0, capacity) past the logical start of a writable view.
        view.with_region(|base| unsafe { storage::store(base, offset as usize, value) })?;
        self.after_write(T::SIZE as u64)
    }

    /// Fill `buf` from the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`ViewAccessor::read`].
    pub fn read_bytes(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let view = self.view()?;
        ensure_in_bounds(offset, buf.len() as u64, self.capacity)?;
        // SAFETY: bounds checked above.
        view.with_region(|base| unsafe { storage::load_bytes(base, offset as usize, buf) })
    }

    /// Copy `data` into the view starting at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`ViewAccessor::write`].
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let view = self.writable_view()?;
        ensure_in_bounds(offset, data.len() as u64, self.capacity)?;
        if data.is_empty() {
            return Ok(());
        }
        // SAFETY: bounds checked above; `data` is caller memory, not part of the mapping.
        view.with_region(|base| unsafe { storage::store_bytes(base, offset as usize, data) })?;
        self.after_write(data.len() as u64)
    }

    /// Read one byte at `offset` as a boolean; any non-zero byte is `true`.
    ///
    /// # Errors
    ///
    /// Same as [`ViewAccessor::read`].
    pub fn read_bool(&self, offset: u64) -> Result<bool> {
        Ok(self.read::<u8>(offset)? != 0)
    }

    /// Write a boolean as a single `0`/`1` byte.
    ///
    /// # Errors
    ///
    /// Same as [`ViewAccessor::write`].
    pub fn write_bool(&mut self, offset: u64, value: bool) -> Result<()> {
        self.write::<u8>(offset, u8::from(value))
    }

    /// Synchronize the accessible region with the backing store.
    ///
    /// The OS works in whole pages, so bytes outside the accessible region up
    /// to the surrounding page boundaries may be written back as well.
    /// A failed flush leaves the accessor open and usable.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` if closed, or
    /// `MmapViewError::Resource` if the OS flush fails.
    pub fn flush(&self) -> Result<()> {
        let view = self.view()?;
        view.flush(self.capacity)?;
        self.tracker.reset();
        Ok(())
    }

    /// Flush (if write-capable), then release the view, then close. Idempotent.
    ///
    /// Neither step can fail the caller: a flush error is logged and the view
    /// is released anyway; a release error is logged.
    pub fn dispose(&mut self) {
        let AccessorState::Open(mut view) = std::mem::replace(&mut self.state, AccessorState::Closed)
        else {
            return;
        };
        if self.access.is_writable() && !view.is_closed() {
            if let Err(e) = view.flush(self.capacity) {
                log::warn!(
                    "flush during dispose failed on handle {}; releasing view anyway: {e}",
                    view.handle().id()
                );
            }
        }
        if let Err(e) = view.release() {
            log::error!("releasing view during dispose failed: {e}");
        }
    }

    fn view(&self) -> Result<&View> {
        match &self.state {
            AccessorState::Open(view) => Ok(view),
            AccessorState::Closed => Err(MmapViewError::InvalidState(ERR_CLOSED)),
        }
    }

    fn writable_view(&self) -> Result<&View> {
        let view = self.view()?;
        if !self.access.is_writable() {
            return Err(MmapViewError::InvalidMode("write through a read-only view"));
        }
        Ok(view)
    }

    fn after_write(&self, len: u64) -> Result<()> {
        if self.tracker.record(len) {
            self.flush()?;
        }
        Ok(())
    }
}

impl Drop for ViewAccessor {
    fn drop(&mut self) {
        self.dispose();
    }
}
