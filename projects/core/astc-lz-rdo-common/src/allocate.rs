//! Aligned scratch memory for the filter and decode buffers.
//!
//! ## Useful APIs
//!
//! [`allocate_align_64`]: Allocates uninitialized memory aligned to 64-bytes.
//! [`AlignedF32Buffer::new`]: Allocates a zeroed, 64-byte aligned buffer of floats.

use core::alloc::{Layout, LayoutError};
use safe_allocator_api::prelude::*;
use safe_allocator_api::RawAlloc;
use thiserror::Error;

/// Allocates data with an alignment of 64 bytes.
///
/// # Parameters
///
/// - `num_bytes`: The number of bytes to allocate
///
/// # Returns
///
/// A [`RawAlloc`] containing the allocated data
#[inline]
pub fn allocate_align_64(num_bytes: usize) -> Result<RawAlloc, AllocateError> {
    let layout = Layout::from_size_align(num_bytes, 64)?;
    Ok(RawAlloc::new(layout)?)
}

/// A zero-initialized, 64-byte aligned buffer of `f32` values.
pub struct AlignedF32Buffer {
    alloc: RawAlloc,
    len: usize,
}

impl AlignedF32Buffer {
    /// Allocates `len` floats, all set to zero.
    pub fn new(len: usize) -> Result<Self, AllocateError> {
        let num_bytes = len
            .max(1)
            .checked_mul(core::mem::size_of::<f32>())
            .ok_or(AllocateError::SizeOverflow(len))?;
        let mut alloc = allocate_align_64(num_bytes)?;
        alloc.as_mut_slice().fill(0);
        Ok(Self { alloc, len })
    }

    /// Number of floats in the buffer.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no floats.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer contents.
    #[inline(always)]
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: the allocation is 64-byte aligned, holds at least `len` floats and was
        // zero-initialized, which is a valid bit pattern for f32.
        unsafe { core::slice::from_raw_parts(self.alloc.as_ptr() as *const f32, self.len) }
    }

    /// The buffer contents, mutably.
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: see `as_slice`; we hold the only reference to the allocation.
        unsafe { core::slice::from_raw_parts_mut(self.alloc.as_mut_ptr() as *mut f32, self.len) }
    }
}

/// An error that happened in memory allocation within the library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocateError {
    /// An error that occurred while creating a layout for allocation.
    #[error("Invalid layout provided. Likely due to `num_bytes` in `allocate_align_64` being larger than isize::MAX. {0}")]
    LayoutError(#[from] LayoutError),

    /// An error that occurred while allocating memory.
    #[error(transparent)]
    AllocationFailed(#[from] AllocError),

    /// The requested number of elements does not fit in memory.
    #[error("Requested buffer of {0} floats overflows the address space")]
    SizeOverflow(usize),
}
