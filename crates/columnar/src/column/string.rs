//! Variable-width UTF-8 string column.
//!
//! Strings are stored back to back in one byte vector. `ends[i]` is the end
//! offset of row `i`; an NA row stores `-1 - end` so that the start of the
//! following row can still be recovered.

use super::element::{FwElement, SType, Wide};
use super::Column;
use crate::error::{ColumnarError, Result};
use std::fmt;

/// A column of optional strings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StringColumn {
    data: Vec<u8>,
    ends: Vec<i64>,
}

#[inline]
pub(crate) fn encode_end(end: usize, is_na: bool) -> i64 {
    if is_na {
        -1 - end as i64
    } else {
        end as i64
    }
}

#[inline]
fn decode_end(raw: i64) -> usize {
    if raw < 0 {
        (-1 - raw) as usize
    } else {
        raw as usize
    }
}

impl StringColumn {
    /// Creates an empty column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a column of `nrows` NA values.
    pub fn new_na(nrows: usize) -> Self {
        Self {
            data: Vec::new(),
            ends: vec![encode_end(0, true); nrows],
        }
    }

    /// Creates a column from optional string values.
    pub fn from_strs<S: AsRef<str>>(values: &[Option<S>]) -> Self {
        let mut col = Self::new();
        for v in values {
            col.push(v.as_ref().map(AsRef::as_ref));
        }
        col
    }

    /// Assembles a column from raw parts. `data` must be valid UTF-8 at every
    /// row boundary described by `ends`.
    pub(crate) fn from_raw_parts(data: Vec<u8>, ends: Vec<i64>) -> Result<Self> {
        let col = Self { data, ends };
        let mut start = 0;
        for (i, &raw) in col.ends.iter().enumerate() {
            let end = decode_end(raw);
            if end < start || end > col.data.len() {
                return Err(ColumnarError::precondition(format!(
                    "string row {i} ends at {end}, outside [{start}, {}]",
                    col.data.len()
                )));
            }
            if std::str::from_utf8(&col.data[start..end]).is_err() {
                return Err(ColumnarError::precondition(format!(
                    "string row {i} is not valid UTF-8"
                )));
            }
            start = end;
        }
        Ok(col)
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.ends.len()
    }

    /// Total size of the string data in bytes.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    fn bounds(&self, i: usize) -> (usize, usize) {
        let start = if i == 0 {
            0
        } else {
            decode_end(self.ends[i - 1])
        };
        (start, decode_end(self.ends[i]))
    }

    /// Value of row `i`, or `None` for NA or out of range.
    pub fn get(&self, i: usize) -> Option<&str> {
        let raw = *self.ends.get(i)?;
        if raw < 0 {
            return None;
        }
        let (start, end) = self.bounds(i);
        std::str::from_utf8(&self.data[start..end]).ok()
    }

    /// Returns true if row `i` is NA.
    pub fn is_na(&self, i: usize) -> bool {
        self.ends.get(i).is_some_and(|&raw| raw < 0)
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.nrows()).map(move |i| self.get(i))
    }

    /// Copies the rows into owned strings.
    pub fn to_vec(&self) -> Vec<Option<String>> {
        self.iter().map(|v| v.map(str::to_owned)).collect()
    }

    /// Number of NA rows.
    pub fn na_count(&self) -> usize {
        self.ends.iter().filter(|&&raw| raw < 0).count()
    }

    /// Appends one value.
    pub fn push(&mut self, value: Option<&str>) {
        if let Some(s) = value {
            self.data.extend_from_slice(s.as_bytes());
        }
        self.ends.push(encode_end(self.data.len(), value.is_none()));
    }

    /// Appends `n` NA rows.
    pub fn push_na(&mut self, n: usize) {
        let end = encode_end(self.data.len(), true);
        self.ends.extend(std::iter::repeat(end).take(n));
    }

    /// Appends every row of `other`.
    pub fn extend_from(&mut self, other: &StringColumn) {
        let base = self.data.len();
        self.data.extend_from_slice(&other.data);
        self.ends.extend(
            other
                .ends
                .iter()
                .map(|&raw| encode_end(base + decode_end(raw), raw < 0)),
        );
    }

    /// Keeps the first `nrows` rows.
    pub fn truncate(&mut self, nrows: usize) {
        if nrows < self.ends.len() {
            self.ends.truncate(nrows);
            let end = self.ends.last().map_or(0, |&raw| decode_end(raw));
            self.data.truncate(end);
        }
    }

    /// Builds a string column by formatting a numeric column; NA stays NA.
    pub(crate) fn cast_from<T: FwElement>(values: impl Iterator<Item = T>) -> Self {
        let mut col = Self::new();
        for v in values {
            match v.to_wide() {
                Wide::Na => col.push(None),
                Wide::Int(x) if T::STYPE == SType::Bool => {
                    col.push(Some(if x != 0 { "true" } else { "false" }))
                }
                Wide::Int(x) => col.push(Some(&x.to_string())),
                Wide::Float(x) => col.push(Some(&x.to_string())),
            }
        }
        col
    }

    /// Appends the rows of `columns`, producing `new_nrows` rows.
    ///
    /// Follows the same contract as [`super::FixedWidthColumn::rbind`].
    pub fn rbind(&mut self, columns: Vec<Column>, new_nrows: usize, self_is_empty: bool) -> Result<()> {
        let total = self.nrows() + columns.iter().map(Column::nrows).sum::<usize>();
        if total != new_nrows {
            return Err(ColumnarError::precondition(format!(
                "rbind inputs hold {total} rows but {new_nrows} were requested"
            )));
        }
        for col in &columns {
            if !Column::can_cast(col.stype(), SType::Str) {
                return Err(ColumnarError::UnsupportedCast {
                    from: col.stype(),
                    to: SType::Str,
                });
            }
        }
        let mut rows_to_fill = 0;
        if self_is_empty {
            rows_to_fill = self.nrows();
            self.data.clear();
            self.ends.clear();
        }
        for col in columns {
            if col.stype() == SType::Void {
                rows_to_fill += col.nrows();
                continue;
            }
            if rows_to_fill > 0 {
                self.push_na(rows_to_fill);
                rows_to_fill = 0;
            }
            match col.cast(SType::Str)? {
                Column::Str(s) => self.extend_from(&s),
                other => {
                    return Err(ColumnarError::UnsupportedCast {
                        from: other.stype(),
                        to: SType::Str,
                    })
                }
            }
        }
        self.push_na(rows_to_fill);
        Ok(())
    }

    pub(crate) fn raw_parts_mut(&mut self) -> (&mut [i64], &mut [u8]) {
        (&mut self.ends, &mut self.data)
    }

    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub(crate) fn resize_rows(&mut self, nrows: usize) {
        if nrows < self.ends.len() {
            self.truncate(nrows);
        } else {
            self.push_na(nrows - self.ends.len());
        }
    }
}

impl fmt::Debug for StringColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringColumn")
            .field("nrows", &self.nrows())
            .field("data_size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let col = StringColumn::from_strs(&[Some("ab"), None, Some(""), Some("cde")]);
        assert_eq!(col.nrows(), 4);
        assert_eq!(col.get(0), Some("ab"));
        assert_eq!(col.get(1), None);
        assert!(col.is_na(1));
        assert_eq!(col.get(2), Some(""));
        assert!(!col.is_na(2));
        assert_eq!(col.get(3), Some("cde"));
        assert_eq!(col.na_count(), 1);
        assert_eq!(col.data_size(), 5);
    }

    #[test]
    fn test_extend_and_truncate() {
        let mut a = StringColumn::from_strs(&[Some("x"), None]);
        let b = StringColumn::from_strs(&[Some("yy"), Some("z")]);
        a.extend_from(&b);
        assert_eq!(
            a.to_vec(),
            vec![
                Some("x".to_string()),
                None,
                Some("yy".to_string()),
                Some("z".to_string())
            ]
        );
        a.truncate(3);
        assert_eq!(a.nrows(), 3);
        assert_eq!(a.data_size(), 3);
    }

    #[test]
    fn test_raw_parts_validation() {
        let ok = StringColumn::from_raw_parts(b"abc".to_vec(), vec![1, -2, 3]).unwrap();
        assert_eq!(ok.get(0), Some("a"));
        assert_eq!(ok.get(1), None);
        assert_eq!(ok.get(2), Some("bc"));
        assert!(StringColumn::from_raw_parts(b"abc".to_vec(), vec![2, 1]).is_err());
        assert!(StringColumn::from_raw_parts(vec![0xff], vec![1]).is_err());
    }
}
