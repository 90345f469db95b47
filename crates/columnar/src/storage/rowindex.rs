//! Lazy row selections over a column's physical storage.

use crate::error::{ColumnarError, Result};
use std::sync::Arc;

/// A virtual view describing which physical rows make up a column's logical rows.
///
/// Row indices are immutable once constructed. Array indices are shared through
/// an `Arc`, so cloning a `RowIndex` never copies the index data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RowIndex {
    /// Identity mapping: logical row `i` is physical row `i`.
    #[default]
    Absent,
    /// Arithmetic progression `start, start + step, ...` with `count` elements.
    Slice {
        /// First physical row.
        start: i64,
        /// Distance between consecutive physical rows; may be zero or negative.
        step: i64,
        /// Number of logical rows.
        count: usize,
    },
    /// Arbitrary list of physical rows.
    Array(Arc<[i64]>),
}

impl RowIndex {
    /// Creates a strided slice view.
    pub fn slice(start: i64, step: i64, count: usize) -> Self {
        Self::Slice { start, step, count }
    }

    /// Creates an array view from explicit physical row numbers.
    pub fn from_indices(indices: Vec<i64>) -> Self {
        Self::Array(indices.into())
    }

    /// Returns true for the identity mapping.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Start of a slice view.
    pub fn slice_start(&self) -> Option<i64> {
        match self {
            Self::Slice { start, .. } => Some(*start),
            _ => None,
        }
    }

    /// Step of a slice view.
    pub fn slice_step(&self) -> Option<i64> {
        match self {
            Self::Slice { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Number of logical rows, or `None` for the identity mapping.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Absent => None,
            Self::Slice { count, .. } => Some(*count),
            Self::Array(indices) => Some(indices.len()),
        }
    }

    /// True if the view selects no rows. The identity mapping is never empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// True if consecutive logical rows map to strictly increasing physical rows
    /// in a way that permits materializing in place (a forward-stepping slice).
    pub fn is_forward_slice(&self) -> bool {
        matches!(self, Self::Slice { step, .. } if *step > 0)
    }

    /// Resolves logical row `i` to its physical row.
    #[inline]
    pub fn physical(&self, i: usize) -> usize {
        match self {
            Self::Absent => i,
            Self::Slice { start, step, .. } => (*start + *step * i as i64) as usize,
            Self::Array(indices) => indices[i] as usize,
        }
    }

    /// Calls `visitor(physical_row)` for logical rows `start, start + step, ...`
    /// below `end`, without allocating.
    pub fn strided_loop<F>(&self, start: usize, end: usize, step: usize, mut visitor: F)
    where
        F: FnMut(usize),
    {
        let step = step.max(1);
        match self {
            Self::Absent => {
                for i in (start..end).step_by(step) {
                    visitor(i);
                }
            }
            Self::Slice {
                start: s0, step: ds, ..
            } => {
                let stride = *ds * step as i64;
                let mut j = *s0 + *ds * start as i64;
                for _ in (start..end).step_by(step) {
                    visitor(j as usize);
                    j += stride;
                }
            }
            Self::Array(indices) => {
                for i in (start..end).step_by(step) {
                    visitor(indices[i] as usize);
                }
            }
        }
    }

    /// Checks that every selected row lies in `[0, physical_rows)`.
    pub fn validate(&self, physical_rows: usize) -> Result<()> {
        let in_range = |j: i64| j >= 0 && (j as u64) < physical_rows as u64;
        match self {
            Self::Absent => Ok(()),
            Self::Slice { start, step, count } => {
                if *count == 0 {
                    return Ok(());
                }
                let last = step
                    .checked_mul(*count as i64 - 1)
                    .and_then(|d| start.checked_add(d));
                match last {
                    Some(last) if in_range(*start) && in_range(last) => Ok(()),
                    _ => Err(ColumnarError::precondition(format!(
                        "slice ({start}, {step}, {count}) exceeds {physical_rows} physical rows"
                    ))),
                }
            }
            Self::Array(indices) => match indices.iter().find(|&&j| !in_range(j)) {
                Some(bad) => Err(ColumnarError::precondition(format!(
                    "row index {bad} is out of bounds for {physical_rows} physical rows"
                ))),
                None => Ok(()),
            },
        }
    }

    /// Resets to the identity mapping.
    pub fn clear(&mut self) {
        *self = Self::Absent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(ri: &RowIndex, n: usize) -> Vec<usize> {
        let mut out = Vec::new();
        ri.strided_loop(0, n, 1, |j| out.push(j));
        out
    }

    #[test]
    fn test_strided_loop_variants() {
        assert_eq!(collect(&RowIndex::Absent, 3), vec![0, 1, 2]);
        assert_eq!(collect(&RowIndex::slice(2, 3, 3), 3), vec![2, 5, 8]);
        assert_eq!(collect(&RowIndex::slice(4, -2, 3), 3), vec![4, 2, 0]);
        assert_eq!(
            collect(&RowIndex::from_indices(vec![3, 0, 3, 1]), 4),
            vec![3, 0, 3, 1]
        );
    }

    #[test]
    fn test_strided_loop_with_offset_and_step() {
        let ri = RowIndex::slice(10, 2, 6);
        let mut out = Vec::new();
        ri.strided_loop(1, 6, 2, |j| out.push(j));
        assert_eq!(out, vec![12, 16, 20]);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(RowIndex::slice(0, 1, 5).validate(5).is_ok());
        assert!(RowIndex::slice(1, 1, 5).validate(5).is_err());
        assert!(RowIndex::slice(4, -1, 5).validate(5).is_ok());
        assert!(RowIndex::slice(4, -2, 5).validate(5).is_err());
        assert!(RowIndex::slice(100, 1, 0).validate(5).is_ok());
        assert!(RowIndex::from_indices(vec![0, 4]).validate(5).is_ok());
        assert!(RowIndex::from_indices(vec![0, 5]).validate(5).is_err());
        assert!(RowIndex::from_indices(vec![-1]).validate(5).is_err());
    }

    #[test]
    fn test_len_and_clear() {
        let mut ri = RowIndex::from_indices(vec![1, 2, 3]);
        assert_eq!(ri.len(), Some(3));
        assert!(!ri.is_forward_slice());
        ri.clear();
        assert!(ri.is_absent());
        assert_eq!(ri.len(), None);
        assert!(RowIndex::slice(0, 2, 4).is_forward_slice());
    }
}
