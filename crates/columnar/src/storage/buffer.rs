//! Memory blocks backing a column.
//!
//! A [`Buffer`] is one of three kinds:
//!
//! - **Heap**: owned, writable, resizable in place.
//! - **Mapped**: a read-only memory map of a file on disk.
//! - **External**: memory owned by a foreign caller. The buffer never frees it;
//!   instead a caller-supplied release callback is invoked exactly once when the
//!   buffer is dropped.
//!
//! Mapped and external buffers are always read-only. Any mutation of their
//! contents goes through [`Buffer::safe_resize`] or [`Buffer::make_writable`],
//! which swap in a heap copy first.

use crate::column::FwElement;
use crate::error::{ColumnarError, Result};
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::ptr::NonNull;
use tracing::{debug, trace};

/// Heap storage is kept in 8-byte words so that every fixed-width element type
/// can be viewed in place without alignment fixups.
const WORD: usize = std::mem::size_of::<u64>();

/// Callback invoked when an external buffer is released.
pub type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Storage backend of a [`Buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Heap allocation owned by the buffer.
    Heap,
    /// Read-only memory map of a file.
    Mapped,
    /// Memory owned by a foreign caller.
    External,
}

enum Storage {
    Heap(Vec<u64>),
    // `None` for empty files, which cannot be mapped.
    Mapped(Option<Mmap>),
    External {
        ptr: NonNull<u8>,
        release: Option<ReleaseFn>,
    },
}

/// An owned or borrowed block of memory with a size and a read-only flag.
pub struct Buffer {
    storage: Storage,
    size: usize,
    readonly: bool,
}

// SAFETY: heap and mapped storage are plain owned memory. External storage is
// never written through this type (it is always read-only), and the foreign
// owner guarantees the region outlives the buffer until `release` runs.
unsafe impl Send for Buffer {}
// SAFETY: see above; shared access only ever reads.
unsafe impl Sync for Buffer {}

fn words_for(size: usize) -> usize {
    size.div_ceil(WORD)
}

impl Buffer {
    /// Allocates a zero-filled heap buffer of `size` bytes.
    pub fn allocate(size: usize) -> Self {
        Self {
            storage: Storage::Heap(vec![0u64; words_for(size)]),
            size,
            readonly: false,
        }
    }

    /// Allocates a heap buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::allocate(bytes.len());
        if let Storage::Heap(words) = &mut buf.storage {
            // SAFETY: the word vector spans at least `bytes.len()` bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    words.as_mut_ptr() as *mut u8,
                    bytes.len(),
                );
            }
        }
        buf
    }

    /// Memory-maps an existing file read-only.
    ///
    /// When `expected_size` is given, the file must be exactly that many bytes
    /// long; otherwise [`ColumnarError::SizeMismatch`] is returned.
    pub fn map_file(path: &Path, expected_size: Option<usize>) -> Result<Self> {
        let file = File::open(path)?;
        let actual = file.metadata()?.len() as usize;
        if let Some(expected) = expected_size {
            if expected != actual {
                return Err(ColumnarError::SizeMismatch {
                    context: format!("file \"{}\"", path.display()),
                    expected,
                    actual,
                });
            }
        }
        let map = if actual == 0 {
            None
        } else {
            // SAFETY: the map is read-only; concurrent truncation of the file by
            // another process is outside the guarantees of this crate.
            Some(unsafe { Mmap::map(&file)? })
        };
        debug!("Mapped {} bytes from {}", actual, path.display());
        Ok(Self {
            storage: Storage::Mapped(map),
            size: actual,
            readonly: true,
        })
    }

    /// Wraps memory owned by a foreign caller.
    ///
    /// The buffer is read-only. `release`, if provided, is called exactly once
    /// when the buffer is dropped, signalling the owner that the region is no
    /// longer referenced.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `size` bytes until `release` has been
    /// invoked (or until the buffer is dropped when no callback is given), and
    /// the region must not be mutated by anyone in the meantime.
    pub unsafe fn wrap_external(ptr: NonNull<u8>, size: usize, release: Option<ReleaseFn>) -> Self {
        Self {
            storage: Storage::External { ptr, release },
            size,
            readonly: true,
        }
    }

    /// Returns the logical size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true if the buffer has zero size.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns true if the contents cannot be modified or resized in place.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns the storage backend.
    pub fn kind(&self) -> BufferKind {
        match self.storage {
            Storage::Heap(_) => BufferKind::Heap,
            Storage::Mapped(_) => BufferKind::Mapped,
            Storage::External { .. } => BufferKind::External,
        }
    }

    /// Best estimate of the memory held by this object, in bytes.
    pub fn memory_footprint(&self) -> usize {
        let backing = match &self.storage {
            Storage::Heap(words) => words.capacity() * WORD,
            Storage::Mapped(_) | Storage::External { .. } => self.size,
        };
        std::mem::size_of::<Self>() + backing
    }

    /// Returns a raw pointer to the start of the memory region.
    pub fn as_ptr(&self) -> *const u8 {
        match &self.storage {
            Storage::Heap(words) => words.as_ptr() as *const u8,
            Storage::Mapped(Some(map)) => map.as_ptr(),
            Storage::Mapped(None) => NonNull::<u64>::dangling().as_ptr() as *const u8,
            Storage::External { ptr, .. } => ptr.as_ptr() as *const u8,
        }
    }

    /// Returns the contents as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: every backend is valid for reads of `size` bytes, and the
        // pointer is non-null and aligned even for empty buffers.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Returns the contents as a mutable byte slice.
    ///
    /// Fails with [`ColumnarError::PreconditionViolation`] on a read-only buffer.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        if self.readonly {
            return Err(ColumnarError::precondition(
                "cannot write into a read-only buffer",
            ));
        }
        match &mut self.storage {
            // SAFETY: the word vector spans at least `size` bytes.
            Storage::Heap(words) => Ok(unsafe {
                std::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, self.size)
            }),
            _ => Err(ColumnarError::precondition(
                "only heap buffers are writable",
            )),
        }
    }

    /// Views the buffer as a slice of `T`, truncating any trailing partial element.
    pub(crate) fn typed<T: FwElement>(&self) -> &[T] {
        let width = std::mem::size_of::<T>();
        let ptr = self.as_ptr();
        debug_assert_eq!(ptr as usize % std::mem::align_of::<T>(), 0);
        // SAFETY: `FwElement` types accept any bit pattern, the region is valid
        // for `size` bytes and is aligned for `T` (heap words are 8-byte
        // aligned, maps are page aligned, external regions are checked by the
        // column constructor).
        unsafe { std::slice::from_raw_parts(ptr as *const T, self.size / width) }
    }

    /// Mutable typed view. Panics on a read-only buffer; callers go through
    /// [`Buffer::make_writable`] first.
    pub(crate) fn typed_mut<T: FwElement>(&mut self) -> &mut [T] {
        let width = std::mem::size_of::<T>();
        let len = self.size / width;
        match &mut self.storage {
            Storage::Heap(words) if !self.readonly => {
                // SAFETY: as in `typed`; heap storage is exclusively owned here.
                unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut T, len) }
            }
            _ => panic!("typed_mut called on a read-only buffer"),
        }
    }

    /// Changes the size to exactly `new_size` bytes in place, retaining the
    /// existing prefix and zero-filling any growth.
    ///
    /// Resizing a read-only buffer is a caller bug and fails with
    /// [`ColumnarError::PreconditionViolation`]; check [`Buffer::is_readonly`]
    /// or use [`Buffer::safe_resize`].
    pub fn resize(&mut self, new_size: usize) -> Result<()> {
        if self.readonly {
            return Err(ColumnarError::precondition(format!(
                "cannot resize read-only buffer of {} bytes to {} bytes",
                self.size, new_size
            )));
        }
        let old_size = self.size;
        if let Storage::Heap(words) = &mut self.storage {
            words.resize(words_for(new_size), 0);
            if new_size > old_size {
                // A previous shrink may have left stale bytes in the last word.
                let bytes = unsafe {
                    // SAFETY: the vector now spans at least `new_size` bytes.
                    std::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, new_size)
                };
                bytes[old_size..].fill(0);
            }
        }
        self.size = new_size;
        Ok(())
    }

    /// Resizes in place when possible; otherwise replaces `self` with a new
    /// writable heap buffer of `new_size` bytes holding a copy of the prefix.
    ///
    /// After this call the buffer is never read-only.
    pub fn safe_resize(&mut self, new_size: usize) -> Result<()> {
        if !self.readonly {
            return self.resize(new_size);
        }
        let mut fresh = Self::allocate(new_size);
        let keep = self.size.min(new_size);
        fresh.as_bytes_mut()?[..keep].copy_from_slice(&self.as_bytes()[..keep]);
        trace!(
            "Swapped read-only {:?} buffer ({} bytes) for heap buffer ({} bytes)",
            self.kind(),
            self.size,
            new_size
        );
        *self = fresh;
        Ok(())
    }

    /// Ensures the buffer can be written, copying it to the heap if needed.
    pub fn make_writable(&mut self) -> Result<()> {
        self.safe_resize(self.size)
    }

    /// Creates a heap copy of the contents.
    pub fn deep_copy(&self) -> Self {
        Self::from_bytes(self.as_bytes())
    }

    /// Releases the buffer. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Storage::External { release, .. } = &mut self.storage {
            if let Some(callback) = release.take() {
                callback();
            }
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &self.kind())
            .field("size", &self.size)
            .field("readonly", &self.readonly)
            .finish()
    }
}
