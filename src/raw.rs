//! OS-independent seam over a raw virtual-memory mapping.
//!
//! [`RawMapping`] is the narrow interface a [`MappingHandle`](crate::MappingHandle)
//! owns: a base address, a length, a synchronous range flush, and an unmap step.
//! [`MmapRegion`] implements it on top of `memmap2` for files and anonymous memory.

use std::{fs::File, io, ptr::NonNull};

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::handle::MmapMode;

/// A raw mapping of `len()` bytes starting at `base()`.
///
/// Implementors own the native resource exclusively. The base address must stay
/// valid until [`RawMapping::unmap`] runs or the value is dropped.
pub trait RawMapping: Send + Sync {
    /// Base address of the mapping.
    fn base(&self) -> NonNull<u8>;

    /// Length of the mapping in bytes.
    fn len(&self) -> usize;

    /// Whether the mapping is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronously write `[offset, offset+len)` back to the backing store.
    ///
    /// The OS may widen the range to page granularity on either side.
    ///
    /// # Errors
    ///
    /// Returns the OS error reported by the flush primitive.
    fn flush_range(&self, offset: usize, len: usize) -> io::Result<()>;

    /// Release the native mapping. The value is consumed even on failure.
    ///
    /// For [`MmapRegion`] the address range is always unmapped: memmap2 ignores
    /// munmap errors on drop, so the only failure reported is the asynchronous
    /// write-back scheduled beforehand for read-write mappings.
    ///
    /// # Errors
    ///
    /// Returns the OS error reported while tearing the mapping down.
    fn unmap(self: Box<Self>) -> io::Result<()> {
        drop(self);
        Ok(())
    }
}

enum MapVariant {
    Ro(Mmap),
    Rw(MmapMut),
    /// Private mapping. Writes stay in this process and never reach the file.
    Cow(MmapMut),
}

/// `memmap2`-backed [`RawMapping`] over a file or anonymous memory.
pub struct MmapRegion {
    map: MapVariant,
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: `base` points into the mapping owned by `map`, which is itself Send + Sync.
// Every access through `base` is serialized against unmap by the owning handle's lock.
unsafe impl Send for MmapRegion {}
// SAFETY: see above.
unsafe impl Sync for MmapRegion {}

impl std::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.map {
            MapVariant::Ro(_) => "ro",
            MapVariant::Rw(_) => "rw",
            MapVariant::Cow(_) => "cow",
        };
        f.debug_struct("MmapRegion")
            .field("kind", &kind)
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

impl MmapRegion {
    /// Map the first `len` bytes of `file` with the given access mode.
    ///
    /// The file must already be at least `len` bytes long.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the mapping cannot be established.
    pub fn map_file(file: &File, len: usize, mode: MmapMode) -> io::Result<Self> {
        // SAFETY: the caller owns the file; memmap2 handles platform-specific mmap details.
        // Concurrent truncation by another process is outside what this crate can guard.
        let map = unsafe {
            match mode {
                MmapMode::ReadOnly => MapVariant::Ro(MmapOptions::new().len(len).map(file)?),
                MmapMode::ReadWrite => MapVariant::Rw(MmapOptions::new().len(len).map_mut(file)?),
                MmapMode::CopyOnWrite => {
                    MapVariant::Cow(MmapOptions::new().len(len).map_copy(file)?)
                }
            }
        };
        Self::from_variant(map, len)
    }

    /// Map `len` bytes of zero-initialized anonymous memory.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the mapping cannot be established.
    pub fn map_anon(len: usize, mode: MmapMode) -> io::Result<Self> {
        let anon = MmapOptions::new().len(len).map_anon()?;
        let map = match mode {
            MmapMode::ReadOnly => MapVariant::Ro(anon.make_read_only()?),
            MmapMode::ReadWrite => MapVariant::Rw(anon),
            MmapMode::CopyOnWrite => MapVariant::Cow(anon),
        };
        Self::from_variant(map, len)
    }

    fn from_variant(mut map: MapVariant, len: usize) -> io::Result<Self> {
        let ptr = match &mut map {
            MapVariant::Ro(m) => m.as_ptr().cast_mut(),
            MapVariant::Rw(m) | MapVariant::Cow(m) => m.as_mut_ptr(),
        };
        let base = NonNull::new(ptr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mapping returned a null base"))?;
        Ok(Self { map, base, len })
    }
}

impl RawMapping for MmapRegion {
    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }

    fn flush_range(&self, offset: usize, len: usize) -> io::Result<()> {
        match &self.map {
            MapVariant::Rw(m) => m.flush_range(offset, len),
            MapVariant::Ro(_) | MapVariant::Cow(_) => Ok(()),
        }
    }

    fn unmap(self: Box<Self>) -> io::Result<()> {
        // Schedule write-back before the address range goes away; munmap itself is
        // performed by memmap2's Drop regardless of the outcome.
        let scheduled = match &self.map {
            MapVariant::Rw(m) => m.flush_async(),
            MapVariant::Ro(_) | MapVariant::Cow(_) => Ok(()),
        };
        drop(self);
        scheduled
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Heap-backed mapping with injectable flush and unmap failures.

    use std::io;
    use std::ops::Range;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::RawMapping;

    /// Shared switches and counters observed by tests after the mapping is gone.
    #[derive(Default)]
    pub(crate) struct Faults {
        pub fail_flush: AtomicBool,
        pub fail_unmap: AtomicBool,
        pub unmaps: AtomicUsize,
        pub flushed: Mutex<Vec<Range<usize>>>,
    }

    pub(crate) struct HeapMapping {
        buf: Vec<u8>,
        base: NonNull<u8>,
        faults: Arc<Faults>,
    }

    // SAFETY: test-only; the buffer is never reallocated after construction.
    unsafe impl Send for HeapMapping {}
    // SAFETY: test-only; see above.
    unsafe impl Sync for HeapMapping {}

    impl HeapMapping {
        pub(crate) fn new(len: usize) -> (Box<Self>, Arc<Faults>) {
            let mut buf = vec![0u8; len.max(1)];
            let base = NonNull::new(buf.as_mut_ptr()).expect("vec pointer");
            let faults = Arc::new(Faults::default());
            let mapping = Box::new(Self {
                buf,
                base,
                faults: Arc::clone(&faults),
            });
            (mapping, faults)
        }
    }

    impl RawMapping for HeapMapping {
        fn base(&self) -> NonNull<u8> {
            self.base
        }

        fn len(&self) -> usize {
            self.buf.len()
        }

        fn flush_range(&self, offset: usize, len: usize) -> io::Result<()> {
            if self.faults.fail_flush.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected flush failure"));
            }
            self.faults.flushed.lock().push(offset..offset + len);
            Ok(())
        }

        fn unmap(self: Box<Self>) -> io::Result<()> {
            self.faults.unmaps.fetch_add(1, Ordering::SeqCst);
            if self.faults.fail_unmap.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected unmap failure"));
            }
            Ok(())
        }
    }
}
