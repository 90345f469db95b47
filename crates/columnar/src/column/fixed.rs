//! Fixed-width typed column over a [`Buffer`] with an optional lazy view.

use super::element::{ExternalObject, FwElement, ObjRef, SType};
use super::stats::Stats;
use super::Column;
use crate::error::{ColumnarError, Result};
use crate::storage::{Buffer, ReleaseFn, RowIndex};
use rayon::prelude::*;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::trace;

/// Minimum number of elements handed to one rayon task.
const PAR_MIN_LEN: usize = 1024;

/// A column of fixed-width values of type `T`.
///
/// Without a row index the buffer holds exactly `nrows` elements. With a row
/// index the logical rows are a view over the (possibly larger) physical
/// buffer, and any mutation of the logical sequence materializes the view
/// first.
pub struct FixedWidthColumn<T: FwElement> {
    nrows: usize,
    buffer: Buffer,
    row_index: RowIndex,
    stats: Stats,
    _marker: PhantomData<T>,
}

impl<T: FwElement> FixedWidthColumn<T> {
    const WIDTH: usize = std::mem::size_of::<T>();

    /// Creates a column of `nrows` zero-initialized elements.
    ///
    /// # Panics
    ///
    /// Panics if the allocation size overflows, like `Vec::with_capacity`.
    pub fn new(nrows: usize) -> Self {
        Self::from_parts(Buffer::allocate(nrows.saturating_mul(Self::WIDTH)), nrows)
    }

    /// Creates a column of `nrows` NA values.
    pub fn new_na(nrows: usize) -> Self {
        let mut col = Self::new(nrows);
        col.buffer.typed_mut::<T>().fill(T::NA);
        col
    }

    /// Creates a column holding a copy of `values`.
    pub fn from_values(values: &[T]) -> Self {
        let mut col = Self::new(values.len());
        if T::REFCOUNTED {
            for &v in values {
                v.on_value_replicated(1);
            }
        }
        col.buffer.typed_mut::<T>().copy_from_slice(values);
        col
    }

    /// Wraps an existing buffer holding exactly `nrows` elements.
    pub fn with_buffer(buffer: Buffer, nrows: usize) -> Result<Self> {
        Self::reject_foreign_refs("an existing buffer")?;
        Self::check_alignment(buffer.as_ptr())?;
        let expected = Self::byte_size(nrows)?;
        if buffer.size() != expected {
            return Err(ColumnarError::SizeMismatch {
                context: format!("buffer for {nrows} rows of {}", T::STYPE),
                expected,
                actual: buffer.size(),
            });
        }
        Ok(Self::from_parts(buffer, nrows))
    }

    /// Opens a column backed by a read-only memory map of `path`.
    ///
    /// The file must hold exactly `nrows` elements.
    pub fn open_mmap(path: &Path, nrows: usize) -> Result<Self> {
        Self::reject_foreign_refs("a memory-mapped file")?;
        let buffer = Buffer::map_file(path, Some(Self::byte_size(nrows)?)).map_err(|err| match err {
            ColumnarError::SizeMismatch {
                context,
                expected,
                actual,
            } => ColumnarError::SizeMismatch {
                context: format!("{context} with {nrows} rows of {}", T::STYPE),
                expected,
                actual,
            },
            other => other,
        })?;
        Ok(Self::from_parts(buffer, nrows))
    }

    /// Creates a column over memory owned by a foreign caller.
    ///
    /// Ownership of the region passes to the column even when construction
    /// fails: `release` runs exactly once, either when the column is dropped or
    /// before this function returns an error.
    ///
    /// # Safety
    ///
    /// Same contract as [`Buffer::wrap_external`].
    pub unsafe fn from_external(
        ptr: NonNull<u8>,
        size: usize,
        nrows: usize,
        release: Option<ReleaseFn>,
    ) -> Result<Self> {
        let buffer = Buffer::wrap_external(ptr, size, release);
        Self::with_buffer(buffer, nrows)
    }

    fn from_parts(buffer: Buffer, nrows: usize) -> Self {
        Self {
            nrows,
            buffer,
            row_index: RowIndex::Absent,
            stats: Stats::new(),
            _marker: PhantomData,
        }
    }

    fn byte_size(nrows: usize) -> Result<usize> {
        nrows.checked_mul(Self::WIDTH).ok_or_else(|| {
            ColumnarError::precondition(format!(
                "{nrows} rows of {} exceed the addressable size",
                T::STYPE
            ))
        })
    }

    fn reject_foreign_refs(source: &str) -> Result<()> {
        if T::REFCOUNTED {
            return Err(ColumnarError::precondition(format!(
                "{} columns cannot be created from {source}",
                T::STYPE
            )));
        }
        Ok(())
    }

    fn check_alignment(ptr: *const u8) -> Result<()> {
        let align = std::mem::align_of::<T>();
        if ptr as usize % align != 0 {
            return Err(ColumnarError::precondition(format!(
                "buffer address {ptr:p} is not aligned to {align} bytes for {}",
                T::STYPE
            )));
        }
        Ok(())
    }

    /// Replaces the buffer; the row count becomes the number of whole elements
    /// it holds and any row index is dropped.
    pub fn replace_buffer(&mut self, buffer: Buffer) -> Result<()> {
        Self::reject_foreign_refs("an existing buffer")?;
        Self::check_alignment(buffer.as_ptr())?;
        if buffer.size() % Self::WIDTH != 0 {
            return Err(ColumnarError::SizeMismatch {
                context: format!("replacement buffer for {} elements", T::STYPE),
                expected: buffer.size() - buffer.size() % Self::WIDTH,
                actual: buffer.size(),
            });
        }
        self.nrows = buffer.size() / Self::WIDTH;
        self.buffer = buffer;
        self.row_index.clear();
        self.stats.reset();
        Ok(())
    }

    /// Storage type of the elements.
    pub fn stype(&self) -> SType {
        T::STYPE
    }

    /// Number of logical rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The active row index.
    pub fn row_index(&self) -> &RowIndex {
        &self.row_index
    }

    /// Size of the physical buffer in bytes.
    pub fn alloc_size(&self) -> usize {
        self.buffer.size()
    }

    /// The physical elements, ignoring the row index.
    pub fn data(&self) -> &[T] {
        self.buffer.typed::<T>()
    }

    /// Writable physical elements; copies a read-only buffer to the heap first.
    pub(crate) fn data_mut(&mut self) -> Result<&mut [T]> {
        self.buffer.make_writable()?;
        self.stats.reset();
        Ok(self.buffer.typed_mut::<T>())
    }

    /// Physical element `i`. Panics if `i` is outside the buffer.
    pub fn get_elem(&self, i: usize) -> T {
        self.data()[i]
    }

    /// Overwrites physical element `i`.
    pub fn set_elem(&mut self, i: usize, value: T) -> Result<()> {
        let physical = self.buffer.size() / Self::WIDTH;
        if i >= physical {
            return Err(ColumnarError::precondition(format!(
                "element {i} is out of bounds for {physical} physical rows"
            )));
        }
        let data = self.data_mut()?;
        let old = data[i];
        value.on_value_replicated(1);
        data[i] = value;
        old.on_value_overwritten();
        self.stats.reset();
        Ok(())
    }

    /// Logical row `i`, resolved through the row index.
    pub fn get(&self, i: usize) -> Option<T> {
        (i < self.nrows).then(|| self.data()[self.row_index.physical(i)])
    }

    /// Iterates over the logical rows.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let data = self.data();
        (0..self.nrows).map(move |i| data[self.row_index.physical(i)])
    }

    /// Copies the logical rows into a vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Logical rows as a contiguous slice, borrowing when no view is active.
    pub(crate) fn values(&self) -> Cow<'_, [T]> {
        if self.row_index.is_absent() {
            Cow::Borrowed(&self.data()[..self.nrows])
        } else {
            Cow::Owned(self.to_vec())
        }
    }

    /// Number of NA values among the logical rows (cached).
    pub fn na_count(&self) -> usize {
        self.stats
            .na_count_with(|| self.iter().filter(|v| v.is_na()).count())
    }

    /// The statistics cache.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Best estimate of the memory held by this column, in bytes.
    pub fn memory_footprint(&self) -> usize {
        let index = match &self.row_index {
            RowIndex::Array(indices) => indices.len() * std::mem::size_of::<i64>(),
            _ => 0,
        };
        std::mem::size_of::<Self>() + self.buffer.memory_footprint() + index
    }

    /// Creates an independent heap copy of the logical rows.
    pub fn deep_copy(&self) -> Self {
        Self::from_values(&self.values())
    }

    /// Attaches a view over the current logical rows.
    ///
    /// An existing view is materialized first, so the new index always refers
    /// to rows of a contiguous buffer.
    pub fn apply_row_index(&mut self, row_index: RowIndex) -> Result<()> {
        self.reify()?;
        row_index.validate(self.nrows)?;
        if let Some(n) = row_index.len() {
            self.nrows = n;
        }
        self.row_index = row_index;
        self.stats.reset();
        Ok(())
    }

    /// Drops the row index without copying any data.
    ///
    /// With `keep_buffer_size` the buffer is assumed to already match the
    /// logical extent; otherwise it is trimmed to exactly `nrows` elements.
    pub fn clear_row_index(&mut self, keep_buffer_size: bool) -> Result<()> {
        self.row_index.clear();
        self.stats.reset();
        if !keep_buffer_size {
            let size = Self::byte_size(self.nrows)?;
            if size != self.buffer.size() {
                if T::REFCOUNTED {
                    for &v in &self.data()[self.nrows.min(self.data().len())..] {
                        v.on_value_overwritten();
                    }
                }
                self.buffer.safe_resize(size)?;
            }
        }
        Ok(())
    }

    /// Materializes the row index into a contiguous buffer and clears it.
    ///
    /// A no-op without a row index. A unit-step slice over a writable buffer
    /// is moved to the front in place; a forward slice over a writable buffer
    /// is compacted in place; every other view is copied into a fresh buffer,
    /// so non-monotonic indices never read from slots already written.
    pub fn reify(&mut self) -> Result<()> {
        if self.row_index.is_absent() {
            return Ok(());
        }
        let nrows = self.nrows;
        let new_size = nrows * Self::WIDTH;

        if !T::REFCOUNTED && !self.buffer.is_readonly() && self.row_index.is_forward_slice() {
            let start = self.row_index.slice_start().unwrap_or(0) as usize;
            let step = self.row_index.slice_step().unwrap_or(1) as usize;
            let data = self.buffer.typed_mut::<T>();
            if step == 1 {
                data.copy_within(start..start + nrows, 0);
            } else {
                for k in 0..nrows {
                    data[k] = data[start + k * step];
                }
            }
            self.buffer.resize(new_size)?;
            trace!("Reified slice ({start}, {step}) of {nrows} rows in place");
        } else {
            let mut fresh = Buffer::allocate(new_size);
            {
                let src = self.buffer.typed::<T>();
                let dst = fresh.typed_mut::<T>();
                let mut k = 0;
                self.row_index.strided_loop(0, nrows, 1, |j| {
                    let v = src[j];
                    v.on_value_replicated(1);
                    dst[k] = v;
                    k += 1;
                });
            }
            if T::REFCOUNTED {
                for &v in self.buffer.typed::<T>() {
                    v.on_value_overwritten();
                }
            }
            trace!(
                "Reified {:?} view of {} rows into a fresh buffer",
                self.row_index_kind(),
                nrows
            );
            self.buffer = fresh;
        }
        self.clear_row_index(true)
    }

    fn row_index_kind(&self) -> &'static str {
        match self.row_index {
            RowIndex::Absent => "absent",
            RowIndex::Slice { .. } => "slice",
            RowIndex::Array(_) => "array",
        }
    }

    /// Grows the column to `new_nrows` rows.
    ///
    /// A one-row column replicates its value into every new row; otherwise new
    /// rows are NA. Shrinking fails with [`ColumnarError::IllegalShrink`].
    pub fn resize_and_fill(&mut self, new_nrows: usize) -> Result<()> {
        if new_nrows < self.nrows {
            return Err(ColumnarError::IllegalShrink {
                current: self.nrows,
                requested: new_nrows,
            });
        }
        if new_nrows == self.nrows {
            return Ok(());
        }
        self.reify()?;
        let old_nrows = self.nrows;
        let fill = if old_nrows == 1 { self.data()[0] } else { T::NA };
        self.buffer.safe_resize(Self::byte_size(new_nrows)?)?;
        self.buffer.typed_mut::<T>()[old_nrows..].fill(fill);
        fill.on_value_replicated(new_nrows - old_nrows);
        self.nrows = new_nrows;
        self.stats.reset();
        Ok(())
    }

    /// Sets the row count to exactly `new_nrows`, truncating or padding with NA.
    pub(crate) fn resize_exact(&mut self, new_nrows: usize) -> Result<()> {
        self.reify()?;
        let old_nrows = self.nrows;
        if new_nrows < old_nrows && T::REFCOUNTED {
            for &v in &self.data()[new_nrows..old_nrows] {
                v.on_value_overwritten();
            }
        }
        self.buffer.safe_resize(Self::byte_size(new_nrows)?)?;
        if new_nrows > old_nrows {
            self.buffer.typed_mut::<T>()[old_nrows..].fill(T::NA);
        }
        self.nrows = new_nrows;
        self.stats.reset();
        Ok(())
    }

    /// Appends the rows of `columns` to this column, producing `new_nrows` rows.
    ///
    /// Placeholder ([`Column::Void`]) inputs contribute NA runs. Inputs of a
    /// different type are cast to `T`. When `self_is_empty` is set, this
    /// column's own rows count as an NA run. Every input is consumed.
    pub fn rbind(&mut self, columns: Vec<Column>, new_nrows: usize, self_is_empty: bool) -> Result<()> {
        let total = self.nrows + columns.iter().map(Column::nrows).sum::<usize>();
        if total != new_nrows {
            return Err(ColumnarError::precondition(format!(
                "rbind inputs hold {total} rows but {new_nrows} were requested"
            )));
        }
        for col in &columns {
            if !Column::can_cast(col.stype(), T::STYPE) {
                return Err(ColumnarError::UnsupportedCast {
                    from: col.stype(),
                    to: T::STYPE,
                });
            }
        }

        self.reify()?;
        let old_nrows = self.nrows;
        let (mut offset, mut rows_to_fill) = if self_is_empty {
            let data = self.data_mut()?;
            for v in data.iter_mut() {
                v.on_value_overwritten();
                *v = T::NA;
            }
            (0, old_nrows)
        } else {
            (old_nrows, 0)
        };
        self.buffer.safe_resize(Self::byte_size(new_nrows)?)?;
        self.nrows = new_nrows;

        for col in columns {
            if col.stype() == SType::Void {
                rows_to_fill += col.nrows();
                continue;
            }
            if rows_to_fill > 0 {
                self.buffer.typed_mut::<T>()[offset..offset + rows_to_fill].fill(T::NA);
                offset += rows_to_fill;
                rows_to_fill = 0;
            }
            let src = col.into_typed::<T>()?;
            let values = &src.data()[..src.nrows()];
            if T::REFCOUNTED {
                for &v in values {
                    v.on_value_replicated(1);
                }
            }
            self.buffer.typed_mut::<T>()[offset..offset + values.len()].copy_from_slice(values);
            offset += values.len();
        }
        if rows_to_fill > 0 {
            self.buffer.typed_mut::<T>()[offset..offset + rows_to_fill].fill(T::NA);
            offset += rows_to_fill;
        }
        self.stats.reset();
        if offset != new_nrows {
            return Err(ColumnarError::precondition(format!(
                "rbind wrote {offset} rows into a column of {new_nrows}"
            )));
        }
        Ok(())
    }

    /// Sets every row flagged `true` in `mask` to NA.
    pub fn apply_na_mask(&mut self, mask: &FixedWidthColumn<super::Bool8>) -> Result<()> {
        if mask.nrows() != self.nrows {
            return Err(ColumnarError::precondition(format!(
                "mask has {} rows but the column has {}",
                mask.nrows(),
                self.nrows
            )));
        }
        self.reify()?;
        let mask_values = mask.values();
        let flags: &[super::Bool8] = &mask_values;
        let nrows = self.nrows;
        let data = self.data_mut()?;
        data[..nrows]
            .par_iter_mut()
            .zip(flags.par_iter())
            .with_min_len(PAR_MIN_LEN)
            .for_each(|(v, flag)| {
                if flag.0 == 1 {
                    v.on_value_overwritten();
                    *v = T::NA;
                }
            });
        self.stats.reset();
        Ok(())
    }

    /// Sets every logical row to NA, discarding the row index.
    ///
    /// No values are carried forward: a read-only or viewed buffer is replaced
    /// by a fresh one rather than materialized.
    pub fn fill_na(&mut self) -> Result<()> {
        if T::REFCOUNTED {
            for &v in self.data() {
                v.on_value_overwritten();
            }
        }
        let nrows = self.nrows;
        if self.buffer.is_readonly() || self.buffer.size() < nrows * Self::WIDTH {
            self.buffer = Buffer::allocate(nrows * Self::WIDTH);
        }
        let data = self.buffer.typed_mut::<T>();
        if T::REFCOUNTED {
            data.fill(T::NA);
        }
        data[..nrows]
            .par_iter_mut()
            .with_min_len(PAR_MIN_LEN)
            .for_each(|v| *v = T::NA);
        self.clear_row_index(false)?;
        self.stats.reset();
        Ok(())
    }

    /// Builds a column of type `T` from another fixed-width column.
    pub(crate) fn cast_from<U: FwElement>(src: &FixedWidthColumn<U>) -> Self {
        let mut out = Self::new(src.nrows());
        for (dst, v) in out.buffer.typed_mut::<T>().iter_mut().zip(src.iter()) {
            *dst = T::from_wide(v.to_wide());
        }
        out
    }
}

impl FixedWidthColumn<ObjRef> {
    /// Creates an object column; each slot takes its own reference.
    pub fn from_objects(objects: &[Option<Arc<ExternalObject>>]) -> Self {
        let mut col = Self::new(objects.len());
        let data = col.buffer.typed_mut::<ObjRef>();
        for (slot, obj) in data.iter_mut().zip(objects) {
            if let Some(obj) = obj {
                // SAFETY: `obj` is alive for the duration of the count increment.
                let r = unsafe { ObjRef::from_arc(obj) };
                r.on_value_replicated(1);
                *slot = r;
            }
        }
        col
    }

    /// Returns a new owned handle to the object at logical row `i`.
    pub fn get_object(&self, i: usize) -> Option<Arc<ExternalObject>> {
        let r = self.get(i)?;
        // SAFETY: the slot owns a count that keeps the object alive.
        unsafe { r.to_arc() }
    }

    /// Stores `obj` at physical row `i`, releasing the previous reference.
    pub fn set_object(&mut self, i: usize, obj: Option<&Arc<ExternalObject>>) -> Result<()> {
        let r = match obj {
            // SAFETY: `obj` stays alive until `set_elem` has taken its count.
            Some(obj) => unsafe { ObjRef::from_arc(obj) },
            None => ObjRef::NULL,
        };
        self.set_elem(i, r)
    }
}

impl<T: FwElement> Drop for FixedWidthColumn<T> {
    fn drop(&mut self) {
        if T::REFCOUNTED {
            for &v in self.buffer.typed::<T>() {
                v.on_value_overwritten();
            }
        }
    }
}

impl<T: FwElement> fmt::Debug for FixedWidthColumn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWidthColumn")
            .field("stype", &T::STYPE)
            .field("nrows", &self.nrows)
            .field("row_index", &self.row_index_kind())
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Bool8;

    #[test]
    fn test_reify_absent_is_noop() {
        let mut col = FixedWidthColumn::<i32>::from_values(&[1, 2, 3]);
        let ptr = col.buffer().as_ptr();
        col.reify().unwrap();
        assert_eq!(col.buffer().as_ptr(), ptr);
        assert_eq!(col.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clear_row_index_recounts_na() {
        let mut col = FixedWidthColumn::<i32>::from_values(&[1, i32::NA, 3, 4, 5]);
        col.apply_row_index(RowIndex::slice(2, 1, 3)).unwrap();
        assert_eq!(col.na_count(), 0);

        col.clear_row_index(false).unwrap();
        assert_eq!(col.to_vec(), vec![1, i32::NA, 3]);
        assert_eq!(col.na_count(), 1);
    }

    #[test]
    fn test_row_count_overflow_is_rejected() {
        let res = FixedWidthColumn::<i64>::with_buffer(Buffer::allocate(8), usize::MAX);
        assert!(matches!(res, Err(ColumnarError::PreconditionViolation(_))));

        let mut col = FixedWidthColumn::<i64>::from_values(&[1, 2]);
        assert!(matches!(
            col.resize_and_fill(usize::MAX),
            Err(ColumnarError::PreconditionViolation(_))
        ));
        assert_eq!(col.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_reify_unit_slice_moves_in_place() {
        let mut col = FixedWidthColumn::<i64>::from_values(&[10, 11, 12, 13, 14, 15]);
        let ptr = col.buffer().as_ptr();
        col.apply_row_index(RowIndex::slice(2, 1, 3)).unwrap();
        assert_eq!(col.nrows(), 3);
        col.reify().unwrap();
        assert!(col.row_index().is_absent());
        assert_eq!(col.buffer().as_ptr(), ptr);
        assert_eq!(col.alloc_size(), 3 * 8);
        assert_eq!(col.to_vec(), vec![12, 13, 14]);
    }

    #[test]
    fn test_reify_strided_and_negative_slices() {
        let mut col = FixedWidthColumn::<i16>::from_values(&[0, 1, 2, 3, 4, 5, 6]);
        col.apply_row_index(RowIndex::slice(1, 2, 3)).unwrap();
        col.reify().unwrap();
        assert_eq!(col.to_vec(), vec![1, 3, 5]);

        let mut col = FixedWidthColumn::<i16>::from_values(&[0, 1, 2, 3, 4]);
        col.apply_row_index(RowIndex::slice(4, -2, 3)).unwrap();
        col.reify().unwrap();
        assert_eq!(col.to_vec(), vec![4, 2, 0]);
    }

    #[test]
    fn test_reify_permutation_uses_fresh_buffer() {
        let mut col = FixedWidthColumn::<f64>::from_values(&[1.0, 2.0, 3.0, 4.0]);
        let ptr = col.buffer().as_ptr();
        col.apply_row_index(RowIndex::from_indices(vec![3, 0, 2, 0]))
            .unwrap();
        col.reify().unwrap();
        assert_ne!(col.buffer().as_ptr(), ptr);
        assert_eq!(col.to_vec(), vec![4.0, 1.0, 3.0, 1.0]);
    }

    #[test]
    fn test_resize_and_fill_replicates_single_value() {
        let mut col = FixedWidthColumn::<i8>::from_values(&[7]);
        col.resize_and_fill(4).unwrap();
        assert_eq!(col.to_vec(), vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_resize_and_fill_pads_with_na() {
        let mut col = FixedWidthColumn::<i32>::from_values(&[1, 2]);
        col.resize_and_fill(4).unwrap();
        assert_eq!(col.to_vec(), vec![1, 2, i32::NA, i32::NA]);
        assert_eq!(col.na_count(), 2);
        assert!(matches!(
            col.resize_and_fill(3),
            Err(ColumnarError::IllegalShrink {
                current: 4,
                requested: 3
            })
        ));
    }

    #[test]
    fn test_apply_na_mask() {
        let mut col = FixedWidthColumn::<i64>::from_values(&[1, 2, 3, 4]);
        assert_eq!(col.na_count(), 0);
        let mask = FixedWidthColumn::<Bool8>::from_values(&[
            Bool8::TRUE,
            Bool8::FALSE,
            Bool8::NA,
            Bool8::TRUE,
        ]);
        col.apply_na_mask(&mask).unwrap();
        assert_eq!(col.to_vec(), vec![i64::NA, 2, 3, i64::NA]);
        assert_eq!(col.na_count(), 2);

        let short = FixedWidthColumn::<Bool8>::from_values(&[Bool8::TRUE]);
        assert!(col.apply_na_mask(&short).is_err());
    }

    #[test]
    fn test_fill_na_discards_view() {
        let mut col = FixedWidthColumn::<f32>::from_values(&[1.0, 2.0, 3.0, 4.0]);
        col.apply_row_index(RowIndex::from_indices(vec![2, 1]))
            .unwrap();
        col.fill_na().unwrap();
        assert!(col.row_index().is_absent());
        assert_eq!(col.nrows(), 2);
        assert_eq!(col.alloc_size(), 8);
        assert!(col.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_set_elem_bounds() {
        let mut col = FixedWidthColumn::<i32>::new(2);
        col.set_elem(1, 5).unwrap();
        assert_eq!(col.get_elem(1), 5);
        assert!(col.set_elem(2, 1).is_err());
    }

    #[test]
    fn test_object_refcounts() {
        let a = ExternalObject::new("a");
        let b = ExternalObject::new("b");
        {
            let objects = vec![Some(a.clone()), None];
            let mut col = FixedWidthColumn::<ObjRef>::from_objects(&objects);
            drop(objects);
            assert_eq!(Arc::strong_count(&a), 2);

            col.resize_and_fill(3).unwrap();
            assert_eq!(Arc::strong_count(&a), 2);

            col.set_object(1, Some(&b)).unwrap();
            assert_eq!(Arc::strong_count(&b), 2);
            col.set_object(1, Some(&a)).unwrap();
            assert_eq!(Arc::strong_count(&b), 1);
            assert_eq!(Arc::strong_count(&a), 3);

            col.apply_row_index(RowIndex::from_indices(vec![1, 1, 0]))
                .unwrap();
            col.reify().unwrap();
            assert_eq!(Arc::strong_count(&a), 4);

            let got = col.get_object(2).unwrap();
            assert_eq!(got.downcast_ref::<&str>(), Some(&"a"));
            drop(got);

            col.fill_na().unwrap();
            assert_eq!(Arc::strong_count(&a), 1);
        }
        assert_eq!(Arc::strong_count(&a), 1);
        assert_eq!(Arc::strong_count(&b), 1);
    }

    #[test]
    fn test_object_column_rejects_foreign_buffers() {
        let buf = Buffer::allocate(16);
        assert!(FixedWidthColumn::<ObjRef>::with_buffer(buf, 2).is_err());
    }
}
