//! # mmap-view: bounded, reference-counted views over memory mappings
//!
//! This crate hands out byte-range views into a memory-mapped file or
//! anonymous shared memory, and typed accessors over those views. A mapping
//! stays established exactly as long as some view references it, and every
//! write-capable accessor flushes its region back to the backing store when it
//! is disposed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mmap_view::{create_mapping, MmapMode};
//!
//! // Create an 8KB file-backed mapping
//! let handle = create_mapping("data.bin", 8192)?;
//!
//! // View 1000 bytes starting at byte 5000; the view itself starts on a page boundary
//! let mut acc = handle.create_view_accessor(5000, 1000, MmapMode::ReadWrite)?;
//! acc.write::<u64>(0, 42)?;
//! assert_eq!(acc.read::<u64>(0)?, 42);
//!
//! // Flush, release the view, and (as the last view) unmap
//! drop(acc);
//! assert!(!handle.is_open());
//! # Ok::<(), mmap_view::MmapViewError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error types and their classification
//! - [`utils`]: Page size, alignment, and bounds helpers
//! - [`raw`]: The raw mapping seam and its `memmap2` implementation
//! - [`handle`]: Reference-counted mapping handle
//! - [`view`]: Page-aligned views and offset translation
//! - [`storage`]: Typed loads and stores
//! - [`flush`]: Automatic flush policies
//! - [`accessor`]: Bounds-checked typed accessor with dispose semantics
//! - [`factory`]: Opening mappings over files and anonymous memory

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]

pub mod accessor;
pub mod errors;
pub mod factory;
pub mod flush;
pub mod handle;
pub mod raw;
pub mod storage;
pub mod utils;
pub mod view;

pub use accessor::ViewAccessor;
pub use errors::{ErrorKind, MmapViewError};
pub use factory::{create_mapping, load_mapping, open_mapping, MappingBuilder, MappingSource};
pub use flush::FlushPolicy;
pub use handle::{MappingHandle, MmapMode};
pub use raw::{MmapRegion, RawMapping};
pub use storage::Primitive;
pub use view::{View, ViewGeometry};
