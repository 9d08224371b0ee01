//! Crate-specific error types for mmap-view.

use std::io;
use thiserror::Error;

/// Result alias for mmap-view operations.
pub type Result<T> = std::result::Result<T, MmapViewError>;

/// Coarse classification of an [`MmapViewError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request: bad offset, size, or incompatible access mode.
    Argument,
    /// The operating system failed to map, flush, or unmap memory.
    Resource,
    /// A read or write reached past the accessor's capacity.
    OutOfRange,
    /// The accessor, view, or handle is closed or cannot perform the operation.
    InvalidState,
}

/// Error type covering view construction, bounds, lifecycle, and OS failures.
#[derive(Debug, Error)]
pub enum MmapViewError {
    /// Wrapper for `std::io::Error` raised while opening or sizing a backing file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A view request violated its preconditions.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// An OS-level mapping, flush, or unmap primitive failed.
    #[error("resource error: {0}")]
    Resource(String),

    /// A typed read/write fell outside the accessible region.
    #[error("access out of range: offset={offset}, len={len}, capacity={capacity}")]
    OutOfRange {
        /// Requested offset, relative to the view's logical start.
        offset: u64,
        /// Width of the access in bytes.
        len: u64,
        /// User-visible capacity of the accessor.
        capacity: u64,
    },

    /// The object is closed or was never initialized.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The operation is not permitted by the accessor's access mode.
    #[error("invalid access mode: {0}")]
    InvalidMode(&'static str),
}

impl MmapViewError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Resource(_) => ErrorKind::Resource,
            Self::Argument(_) => ErrorKind::Argument,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::InvalidState(_) | Self::InvalidMode(_) => ErrorKind::InvalidState,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_resource_errors() {
        let err = MmapViewError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(
            MmapViewError::InvalidMode("read-only").kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn out_of_range_message_names_the_bounds() {
        let err = MmapViewError::OutOfRange {
            offset: 96,
            len: 8,
            capacity: 100,
        };
        assert_eq!(
            err.to_string(),
            "access out of range: offset=96, len=8, capacity=100"
        );
    }
}
