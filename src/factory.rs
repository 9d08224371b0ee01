//! Producing [`MappingHandle`]s from files and anonymous memory.
//!
//! Views and accessors only ever consume an already-open handle plus its
//! capacity; everything that names or sizes a backing object lives here.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::errors::{MmapViewError, Result};
use crate::flush::FlushPolicy;
use crate::handle::{MappingHandle, MmapMode};
use crate::raw::MmapRegion;

const ERR_ZERO_CAPACITY: &str = "cannot map a zero-length object";

/// What a mapping is backed by.
#[derive(Debug, Clone, Copy)]
pub enum MappingSource<'a> {
    /// An already-open file. It must be readable, and writable for `ReadWrite`.
    File(&'a File),
    /// Zero-initialized memory with no backing file.
    Anonymous,
}

/// Map `capacity` bytes of `source` in `mode`.
///
/// For files, a `capacity` of zero maps the file's current length. A
/// `ReadWrite` mapping larger than the file grows the file first; other modes
/// cannot map past the end of the file.
///
/// # Errors
///
/// Returns `MmapViewError::Argument` for a zero-length or oversized request,
/// `MmapViewError::Io` if the file cannot be inspected or grown, and
/// `MmapViewError::Resource` if the OS refuses the mapping.
pub fn open_mapping(
    source: MappingSource<'_>,
    capacity: u64,
    mode: MmapMode,
) -> Result<Arc<MappingHandle>> {
    open_mapping_with_policy(source, capacity, mode, FlushPolicy::default())
}

fn open_mapping_with_policy(
    source: MappingSource<'_>,
    capacity: u64,
    mode: MmapMode,
    policy: FlushPolicy,
) -> Result<Arc<MappingHandle>> {
    let region = match source {
        MappingSource::File(file) => {
            let file_len = file.metadata()?.len();
            let capacity = if capacity == 0 { file_len } else { capacity };
            if capacity == 0 {
                return Err(MmapViewError::Argument(ERR_ZERO_CAPACITY.into()));
            }
            if capacity > file_len {
                if mode != MmapMode::ReadWrite {
                    return Err(MmapViewError::Argument(format!(
                        "capacity {capacity} exceeds file length {file_len} for a {mode:?} mapping"
                    )));
                }
                file.set_len(capacity)?;
            }
            let len = to_usize(capacity)?;
            MmapRegion::map_file(file, len, mode)
                .map_err(|e| MmapViewError::Resource(format!("mapping {len} bytes failed: {e}")))?
        }
        MappingSource::Anonymous => {
            if capacity == 0 {
                return Err(MmapViewError::Argument(ERR_ZERO_CAPACITY.into()));
            }
            let len = to_usize(capacity)?;
            MmapRegion::map_anon(len, mode).map_err(|e| {
                MmapViewError::Resource(format!("anonymous mapping of {len} bytes failed: {e}"))
            })?
        }
    };
    Ok(MappingHandle::with_policy(Box::new(region), mode, policy))
}

fn to_usize(capacity: u64) -> Result<usize> {
    usize::try_from(capacity).map_err(|_| {
        MmapViewError::Argument(format!("capacity {capacity} exceeds the address space"))
    })
}

/// Builder for path-backed mappings.
///
/// # Examples
///
/// ```no_run
/// use mmap_view::{FlushPolicy, MappingBuilder, MmapMode};
///
/// let handle = MappingBuilder::new("data.bin")
///     .capacity(1 << 20)
///     .flush_policy(FlushPolicy::EveryBytes(64 * 1024))
///     .create()?;
/// assert_eq!(handle.mode(), MmapMode::ReadWrite);
/// # Ok::<(), mmap_view::MmapViewError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MappingBuilder {
    path: PathBuf,
    mode: MmapMode,
    capacity: u64,
    flush_policy: FlushPolicy,
}

impl MappingBuilder {
    /// Start a builder for `path`: read-write, whole file, manual flushing.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: MmapMode::ReadWrite,
            capacity: 0,
            flush_policy: FlushPolicy::default(),
        }
    }

    /// Access mode for `open()`. `create()` always maps read-write.
    #[must_use]
    pub fn mode(mut self, mode: MmapMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mapping length in bytes. Zero means the file's length when opening.
    #[must_use]
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Flush policy inherited by accessors over the new mapping.
    #[must_use]
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Create (truncating if it exists) a file of `capacity` bytes and map it read-write.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Argument` if capacity is zero, `MmapViewError::Io`
    /// if the file cannot be created, or `MmapViewError::Resource` if mapping fails.
    pub fn create(&self) -> Result<Arc<MappingHandle>> {
        if self.capacity == 0 {
            return Err(MmapViewError::Argument(ERR_ZERO_CAPACITY.into()));
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.set_len(self.capacity)?;
        log::debug!("created {} ({} bytes)", self.path.display(), self.capacity);
        open_mapping_with_policy(
            MappingSource::File(&file),
            self.capacity,
            MmapMode::ReadWrite,
            self.flush_policy,
        )
    }

    /// Open an existing file and map it in the configured mode.
    ///
    /// # Errors
    ///
    /// Same as [`open_mapping`], plus `MmapViewError::Io` if the file cannot be opened.
    pub fn open(&self) -> Result<Arc<MappingHandle>> {
        let file = OpenOptions::new()
            .read(true)
            .write(self.mode == MmapMode::ReadWrite)
            .open(&self.path)?;
        open_mapping_with_policy(
            MappingSource::File(&file),
            self.capacity,
            self.mode,
            self.flush_policy,
        )
    }
}

/// Create a new read-write mapping of the given capacity at `path`.
/// Truncates if the file already exists.
///
/// # Errors
///
/// Returns errors from [`MappingBuilder::create`].
pub fn create_mapping<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Arc<MappingHandle>> {
    MappingBuilder::new(path).capacity(capacity).create()
}

/// Map the whole of an existing file in the requested mode.
///
/// # Errors
///
/// Returns errors from [`MappingBuilder::open`].
pub fn load_mapping<P: AsRef<Path>>(path: P, mode: MmapMode) -> Result<Arc<MappingHandle>> {
    MappingBuilder::new(path).mode(mode).open()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::io::Write;

    #[test]
    fn anonymous_mapping_requires_capacity() {
        let err = open_mapping(MappingSource::Anonymous, 0, MmapMode::ReadWrite)
            .expect_err("zero capacity");
        assert_eq!(err.kind(), ErrorKind::Argument);

        let handle = open_mapping(MappingSource::Anonymous, 8192, MmapMode::ReadWrite)
            .expect("anon");
        assert_eq!(handle.capacity(), 8192);
        assert!(handle.is_open());
    }

    #[test]
    fn read_only_file_cannot_grow() {
        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(&[1u8; 100]).expect("fill");

        let err = open_mapping(MappingSource::File(&file), 200, MmapMode::ReadOnly)
            .expect_err("past eof");
        assert_eq!(err.kind(), ErrorKind::Argument);

        let handle = open_mapping(MappingSource::File(&file), 0, MmapMode::ReadOnly)
            .expect("whole file");
        assert_eq!(handle.capacity(), 100);
    }

    #[test]
    fn read_write_file_grows_to_capacity() {
        let file = tempfile::tempfile().expect("tempfile");
        let handle = open_mapping(MappingSource::File(&file), 4096, MmapMode::ReadWrite)
            .expect("grow");
        assert_eq!(handle.capacity(), 4096);
        assert_eq!(file.metadata().expect("metadata").len(), 4096);
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::tempfile().expect("tempfile");
        let err = open_mapping(MappingSource::File(&file), 0, MmapMode::ReadWrite)
            .expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn builder_carries_flush_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = MappingBuilder::new(dir.path().join("policy.bin"))
            .capacity(4096)
            .flush_policy(FlushPolicy::Always)
            .create()
            .expect("create");
        assert_eq!(handle.flush_policy(), FlushPolicy::Always);
        assert_eq!(handle.mode(), MmapMode::ReadWrite);
    }
}
