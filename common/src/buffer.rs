//! Heap buffers with explicit alignment
//!
//! Unbuffered I/O requires the user buffer to start on a block boundary, and the bandwidth
//! simulation wants page-aligned buffers so that the per-page read-back touches exactly one word
//! per page. `Vec<u8>` gives neither guarantee, so buffers are allocated through `std::alloc`
//! with an explicit `Layout` and released with the same layout on drop.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::TransferError;

/// Zero-initialized byte buffer whose first byte is aligned to `align()`.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// the buffer uniquely owns its allocation
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `size` zeroed bytes aligned to `align`, which must be a power of two.
    pub fn new(size: usize, align: usize) -> Result<Self, TransferError> {
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| TransferError::Allocation { size, align })?;
        if size == 0 {
            // a zero-sized allocation is not allowed, use a well-aligned dangling pointer
            let ptr = NonNull::new(std::ptr::without_provenance_mut::<u8>(align))
                .ok_or(TransferError::Allocation { size, align })?;
            return Ok(Self { ptr, layout });
        }
        // SAFETY: layout has a non-zero size
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(TransferError::Allocation { size, align })?;
        tracing::trace!("allocated {} bytes aligned to {}", size, align);
        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }
}

impl std::ops::Deref for AlignedBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes (or dangling and len == 0) and zero-initialized
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl std::ops::DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: see Deref, and we hold the only reference
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `new` with this exact layout
            unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len())
            .field("align", &self.align())
            .finish()
    }
}

/// Rounds `value` down to a multiple of `align` (a power of two).
pub fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// Rounds `value` up to a multiple of `align` (a power of two).
pub fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}
