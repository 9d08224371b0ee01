//! Typed loads and stores at validated offsets.
//!
//! Values are stored in native byte order with no alignment requirement.
//! Callers in this crate bounds-check every offset before reaching these helpers.

use std::ptr::{self, NonNull};

mod sealed {
    /// Restricts [`super::Primitive`] to the types implemented here.
    pub trait Sealed {}
}

/// Fixed-size plain value that can be read from or written to a view.
///
/// Implemented for every integer and floating-point primitive. Every bit
/// pattern of `SIZE` bytes is a valid value of these types.
pub trait Primitive: Copy + sealed::Sealed + 'static {
    /// Width of the value in bytes.
    const SIZE: usize;
}

macro_rules! primitive {
    ($($t:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}
            impl Primitive for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
            }
        )*
    };
}

primitive!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

/// Load a `T` from `base + offset`.
///
/// # Safety
///
/// `[base + offset, base + offset + T::SIZE)` must be inside one live mapping.
pub(crate) unsafe fn load<T: Primitive>(base: NonNull<u8>, offset: usize) -> T {
    base.as_ptr().add(offset).cast::<T>().read_unaligned()
}

/// Store `value` at `base + offset`.
///
/// # Safety
///
/// `[base + offset, base + offset + T::SIZE)` must be inside one live, writable mapping.
pub(crate) unsafe fn store<T: Primitive>(base: NonNull<u8>, offset: usize, value: T) {
    base.as_ptr().add(offset).cast::<T>().write_unaligned(value);
}

/// Copy `dst.len()` bytes out of the mapping starting at `base + offset`.
///
/// # Safety
///
/// The source range must be inside one live mapping.
pub(crate) unsafe fn load_bytes(base: NonNull<u8>, offset: usize, dst: &mut [u8]) {
    ptr::copy_nonoverlapping(base.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
}

/// Copy `src` into the mapping starting at `base + offset`.
///
/// # Safety
///
/// The destination range must be inside one live, writable mapping and must not
/// overlap `src`.
pub(crate) unsafe fn store_bytes(base: NonNull<u8>, offset: usize, src: &[u8]) {
    ptr::copy_nonoverlapping(src.as_ptr(), base.as_ptr().add(offset), src.len());
}
