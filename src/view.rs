//! Page-aligned views into a [`MappingHandle`].

use std::{ptr::NonNull, sync::Arc};

use crate::errors::{MmapViewError, Result};
use crate::handle::{MappingHandle, MmapMode};
use crate::utils::{align_down, page_size};

/// Translation between a user-requested byte range and its page-aligned
/// physical window inside a mapping.
///
/// # Examples
///
/// ```
/// use mmap_view::view::ViewGeometry;
///
/// let g = ViewGeometry::compute(5000, 1000, 8192, 4096)?;
/// assert_eq!(g.pointer_offset, 4096);
/// assert_eq!(g.extra(), 904);
/// assert_eq!(g.size, 1904);
/// assert_eq!(g.capacity, 1000);
/// # Ok::<(), mmap_view::MmapViewError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewGeometry {
    /// Page-aligned distance from the mapping base to the start of the window.
    pub pointer_offset: u64,
    /// The offset the caller asked for.
    pub logical_offset: u64,
    /// Physical length of the window, counted from `pointer_offset`.
    pub size: u64,
    /// Length visible to the caller, counted from `logical_offset`.
    pub capacity: u64,
}

impl ViewGeometry {
    /// Resolve a request against a mapping of `total` bytes.
    ///
    /// A `requested_size` of zero means "to the end of the mapping".
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Argument` if the range leaves the mapping,
    /// resolves to zero bytes, or `page_size` is zero.
    pub fn compute(
        requested_offset: u64,
        requested_size: u64,
        total: u64,
        page_size: u64,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(MmapViewError::Argument("page size must be non-zero".into()));
        }
        if requested_offset > total {
            return Err(MmapViewError::Argument(format!(
                "offset {requested_offset} is past the end of a {total}-byte mapping"
            )));
        }
        let capacity = if requested_size == 0 {
            total - requested_offset
        } else {
            requested_size
        };
        if capacity == 0 {
            return Err(MmapViewError::Argument(format!(
                "offset {requested_offset} leaves no bytes to view in a {total}-byte mapping"
            )));
        }
        match requested_offset.checked_add(capacity) {
            Some(end) if end <= total => {}
            _ => {
                return Err(MmapViewError::Argument(format!(
                    "view [{requested_offset}, +{capacity}) exceeds mapping capacity {total}"
                )))
            }
        }

        let pointer_offset = align_down(requested_offset, page_size);
        let extra = requested_offset - pointer_offset;
        Ok(Self {
            pointer_offset,
            logical_offset: requested_offset,
            size: capacity + extra,
            capacity,
        })
    }

    /// Bytes between the page-aligned start and the requested start.
    #[must_use]
    pub fn extra(&self) -> u64 {
        self.logical_offset - self.pointer_offset
    }
}

/// One bounded window into a shared mapping.
///
/// A view holds one claim on its [`MappingHandle`] from creation until
/// [`View::release`] (or drop). It is owned by exactly one accessor.
pub struct View {
    handle: Arc<MappingHandle>,
    geometry: ViewGeometry,
    access: MmapMode,
    released: bool,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("handle", &self.handle.id())
            .field("geometry", &self.geometry)
            .field("access", &self.access)
            .field("released", &self.released)
            .finish()
    }
}

impl View {
    /// Create a view over `[offset, offset+size)` of `handle`, using the system page size.
    ///
    /// Nothing is acquired unless every check passes.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Argument` if the handle is closed, the access mode
    /// is not permitted by the mapping, or the range does not fit. Any other
    /// failure to register with the handle is returned as is.
    pub fn create(
        handle: Arc<MappingHandle>,
        offset: u64,
        size: u64,
        access: MmapMode,
    ) -> Result<Self> {
        if !handle.is_open() {
            return Err(MmapViewError::Argument("mapping handle is closed".into()));
        }
        if !handle.mode().permits(access) {
            return Err(MmapViewError::Argument(format!(
                "{access:?} view requested over a {:?} mapping",
                handle.mode()
            )));
        }
        let geometry = ViewGeometry::compute(offset, size, handle.capacity(), page_size() as u64)?;
        handle.acquire().map_err(|e| match e {
            MmapViewError::InvalidState(_) => {
                MmapViewError::Argument("mapping handle is closed".into())
            }
            other => other,
        })?;

        log::trace!(
            "view created on handle {}: pointer_offset={} logical_offset={} size={}",
            handle.id(),
            geometry.pointer_offset,
            geometry.logical_offset,
            geometry.size
        );
        Ok(Self {
            handle,
            geometry,
            access,
            released: false,
        })
    }

    /// Page-aligned physical offset of this view within the mapping.
    #[must_use]
    pub fn pointer_offset(&self) -> u64 {
        self.geometry.pointer_offset
    }

    /// Offset originally requested by the caller.
    #[must_use]
    pub fn logical_offset(&self) -> u64 {
        self.geometry.logical_offset
    }

    /// Physical length, including the bytes before the logical start.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.geometry.size
    }

    /// Length visible to callers.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.geometry.capacity
    }

    /// Full offset translation for this view.
    #[must_use]
    pub fn geometry(&self) -> ViewGeometry {
        self.geometry
    }

    /// Access mode of this view.
    #[must_use]
    pub fn access(&self) -> MmapMode {
        self.access
    }

    /// The mapping this view points into.
    #[must_use]
    pub fn handle(&self) -> &Arc<MappingHandle> {
        &self.handle
    }

    /// True once released or once the underlying mapping has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.released || !self.handle.is_open()
    }

    /// Write back the physical range covering the first `num_bytes` past the
    /// logical start, beginning at `pointer_offset`.
    ///
    /// The OS flushes whole pages, so bytes before the logical start and after
    /// its end, up to page boundaries, may be written back too.
    /// Read-only and copy-on-write views have nothing to write back, and a view
    /// whose mapping was closed underneath it logs and returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidState` if the view was released, or
    /// `MmapViewError::Resource` if the OS flush primitive fails.
    pub fn flush(&self, num_bytes: u64) -> Result<()> {
        if self.released {
            return Err(MmapViewError::InvalidState("view has been released"));
        }
        if self.access != MmapMode::ReadWrite {
            return Ok(());
        }
        let len = self
            .geometry
            .extra()
            .saturating_add(num_bytes)
            .min(self.geometry.size);
        if len == 0 {
            return Ok(());
        }
        // Both values are bounded by the mapping length, which fits in usize.
        let start = self.geometry.pointer_offset as usize;
        let len = len as usize;
        match self.handle.with_map(|m| m.flush_range(start, len)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MmapViewError::Resource(format!(
                "flush of [{start}, +{len}) failed: {e}"
            ))),
            Err(_) => {
                log::warn!(
                    "flush skipped: mapping handle {} already closed",
                    self.handle.id()
                );
                Ok(())
            }
        }
    }

    /// Give the view's claim on the mapping back. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Resource` if this was the last claim and
    /// unmapping failed. The view is released either way.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        log::trace!("view released on handle {}", self.handle.id());
        self.handle.release()
    }

    /// Run `f` with a pointer to the logical start, keeping the mapping alive meanwhile.
    pub(crate) fn with_region<R>(&self, f: impl FnOnce(NonNull<u8>) -> R) -> Result<R> {
        if self.released {
            return Err(MmapViewError::InvalidState("view has been released"));
        }
        let logical = self.geometry.logical_offset as usize;
        self.handle.with_map(|m| {
            // SAFETY: logical_offset + capacity <= mapping length, checked at creation.
            let start = unsafe { NonNull::new_unchecked(m.base().as_ptr().add(logical)) };
            f(start)
        })
    }
}

impl Drop for View {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("releasing view on drop failed: {e}");
        }
    }
}
