//! Output columns of a read and the shared type-bump ledger.

use super::parsers::ParseType;
use crate::column::{Bool8, Column, FixedWidthColumn, StringColumn};
use crate::error::Result;
use std::sync::Mutex;

#[derive(Debug)]
struct LedgerState {
    types: Vec<ParseType>,
    bumped: Vec<bool>,
}

/// Shared record of the current type of every column.
///
/// Workers read a snapshot when they start a chunk. Promotions are committed
/// in input order, and only a promotion past the currently recorded type
/// counts, so each transition is reported once.
#[derive(Debug)]
pub struct TypeLedger {
    state: Mutex<LedgerState>,
}

impl TypeLedger {
    /// Creates a ledger starting from `types`.
    pub fn new(types: Vec<ParseType>) -> Self {
        let n = types.len();
        Self {
            state: Mutex::new(LedgerState {
                types,
                bumped: vec![false; n],
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Current type of every column.
    pub fn snapshot(&self) -> Vec<ParseType> {
        self.lock().types.clone()
    }

    /// Records that column `column` needs at least type `to`. Returns the
    /// previously recorded type if this widened it.
    pub fn commit(&self, column: usize, to: ParseType) -> Option<ParseType> {
        let mut state = self.lock();
        let from = state.types[column];
        if to <= from {
            return None;
        }
        state.types[column] = to;
        state.bumped[column] = true;
        Some(from)
    }

    /// Columns promoted since the last call, clearing the flags.
    pub fn take_bumped(&self) -> Vec<usize> {
        let mut state = self.lock();
        let cols = state
            .bumped
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        state.bumped.iter_mut().for_each(|b| *b = false);
        cols
    }
}

/// Typed storage of one output column during a read.
#[derive(Debug)]
pub(crate) enum ColumnData {
    Bool(FixedWidthColumn<Bool8>),
    Int32(FixedWidthColumn<i32>),
    Int64(FixedWidthColumn<i64>),
    Float64(FixedWidthColumn<f64>),
    Str(StringColumn),
}

impl ColumnData {
    pub(crate) fn new(ptype: ParseType, nrows: usize) -> Self {
        match ptype {
            ParseType::Bool => Self::Bool(FixedWidthColumn::new_na(nrows)),
            ParseType::Int32 => Self::Int32(FixedWidthColumn::new_na(nrows)),
            ParseType::Int64 => Self::Int64(FixedWidthColumn::new_na(nrows)),
            ParseType::Float64 => Self::Float64(FixedWidthColumn::new_na(nrows)),
            ParseType::Str => Self::Str(StringColumn::new_na(nrows)),
        }
    }

    pub(crate) fn resize(&mut self, nrows: usize) -> Result<()> {
        match self {
            Self::Bool(c) => c.resize_exact(nrows),
            Self::Int32(c) => c.resize_exact(nrows),
            Self::Int64(c) => c.resize_exact(nrows),
            Self::Float64(c) => c.resize_exact(nrows),
            Self::Str(c) => {
                c.resize_rows(nrows);
                Ok(())
            }
        }
    }

    pub(crate) fn alloc_size(&self) -> usize {
        match self {
            Self::Bool(c) => c.alloc_size(),
            Self::Int32(c) => c.alloc_size(),
            Self::Int64(c) => c.alloc_size(),
            Self::Float64(c) => c.alloc_size(),
            Self::Str(c) => c.nrows() * std::mem::size_of::<i64>() + c.data_size(),
        }
    }

    /// Mutable destination view over rows `[0, nrows)`.
    pub(crate) fn dest(&mut self, nrows: usize) -> Result<DestSlice<'_>> {
        Ok(match self {
            Self::Bool(c) => DestSlice::Bool(&mut c.data_mut()?[..nrows]),
            Self::Int32(c) => DestSlice::Int32(&mut c.data_mut()?[..nrows]),
            Self::Int64(c) => DestSlice::Int64(&mut c.data_mut()?[..nrows]),
            Self::Float64(c) => DestSlice::Float64(&mut c.data_mut()?[..nrows]),
            Self::Str(c) => {
                let (ends, data) = c.raw_parts_mut();
                DestSlice::Str {
                    ends: &mut ends[..nrows],
                    data: &mut data[..],
                    offset: 0,
                }
            }
        })
    }

    pub(crate) fn into_column(self) -> Column {
        match self {
            Self::Bool(c) => Column::Bool(c),
            Self::Int32(c) => Column::Int32(c),
            Self::Int64(c) => Column::Int64(c),
            Self::Float64(c) => Column::Float64(c),
            Self::Str(c) => Column::Str(c),
        }
    }
}

/// A disjoint, writable window of one output column.
#[derive(Debug)]
pub(crate) enum DestSlice<'a> {
    Skip,
    Bool(&'a mut [Bool8]),
    Int32(&'a mut [i32]),
    Int64(&'a mut [i64]),
    Float64(&'a mut [f64]),
    Str {
        ends: &'a mut [i64],
        data: &'a mut [u8],
        /// Offset of `data[0]` within the column's string data.
        offset: usize,
    },
}

impl<'a> DestSlice<'a> {
    /// Splits off the first `nrows` rows (and `nbytes` string bytes).
    pub(crate) fn split_front(self, nrows: usize, nbytes: usize) -> (DestSlice<'a>, DestSlice<'a>) {
        match self {
            Self::Skip => (Self::Skip, Self::Skip),
            Self::Bool(s) => {
                let (a, b) = s.split_at_mut(nrows);
                (Self::Bool(a), Self::Bool(b))
            }
            Self::Int32(s) => {
                let (a, b) = s.split_at_mut(nrows);
                (Self::Int32(a), Self::Int32(b))
            }
            Self::Int64(s) => {
                let (a, b) = s.split_at_mut(nrows);
                (Self::Int64(a), Self::Int64(b))
            }
            Self::Float64(s) => {
                let (a, b) = s.split_at_mut(nrows);
                (Self::Float64(a), Self::Float64(b))
            }
            Self::Str { ends, data, offset } => {
                let (ea, eb) = ends.split_at_mut(nrows);
                let (da, db) = data.split_at_mut(nbytes);
                (
                    Self::Str {
                        ends: ea,
                        data: da,
                        offset,
                    },
                    Self::Str {
                        ends: eb,
                        data: db,
                        offset: offset + nbytes,
                    },
                )
            }
        }
    }
}

/// A column of the input as seen by the reader.
#[derive(Debug)]
pub(crate) struct ReaderColumn {
    pub name: String,
    pub ptype: ParseType,
    pub present_in_output: bool,
    /// Whether the current pass stores values of this column.
    pub present_in_buffer: bool,
    pub data: Option<ColumnData>,
}

impl ReaderColumn {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            ptype: ParseType::Bool,
            present_in_output: true,
            present_in_buffer: true,
            data: None,
        }
    }
}

/// All columns of the input, including dropped ones.
#[derive(Debug, Default)]
pub(crate) struct ReaderColumns {
    columns: Vec<ReaderColumn>,
}

impl ReaderColumns {
    pub(crate) fn new(columns: Vec<ReaderColumn>) -> Self {
        Self { columns }
    }

    pub(crate) fn len(&self) -> usize {
        self.columns.len()
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, ReaderColumn> {
        self.columns.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, ReaderColumn> {
        self.columns.iter_mut()
    }

    pub(crate) fn types(&self) -> Vec<ParseType> {
        self.columns.iter().map(|c| c.ptype).collect()
    }

    pub(crate) fn n_outputs(&self) -> usize {
        self.columns.iter().filter(|c| c.present_in_output).count()
    }

    pub(crate) fn print_types(&self) -> String {
        self.columns
            .iter()
            .map(|c| {
                if !c.present_in_output {
                    "-"
                } else {
                    match c.ptype {
                        ParseType::Bool => "b",
                        ParseType::Int32 => "i",
                        ParseType::Int64 => "I",
                        ParseType::Float64 => "F",
                        ParseType::Str => "s",
                    }
                }
            })
            .collect()
    }

    /// (Re)allocates storage of every buffered column to `nrows` rows.
    /// Columns without storage, or whose storage type no longer matches, get
    /// fresh all-NA storage.
    pub(crate) fn allocate(&mut self, nrows: usize) -> Result<()> {
        for col in self.columns.iter_mut().filter(|c| c.present_in_buffer) {
            let fresh = !matches!(
                (&col.data, col.ptype),
                (Some(ColumnData::Bool(_)), ParseType::Bool)
                    | (Some(ColumnData::Int32(_)), ParseType::Int32)
                    | (Some(ColumnData::Int64(_)), ParseType::Int64)
                    | (Some(ColumnData::Float64(_)), ParseType::Float64)
                    | (Some(ColumnData::Str(_)), ParseType::Str)
            );
            if fresh {
                col.data = Some(ColumnData::new(col.ptype, nrows));
            } else if let Some(data) = col.data.as_mut() {
                data.resize(nrows)?;
            }
        }
        Ok(())
    }

    /// Resizes the string data of every buffered string column to `sizes[j]` bytes.
    pub(crate) fn reserve_strings(&mut self, sizes: &[usize]) {
        for (col, &size) in self.columns.iter_mut().zip(sizes) {
            if !col.present_in_buffer {
                continue;
            }
            if let Some(ColumnData::Str(s)) = col.data.as_mut() {
                s.data_mut().resize(size, 0);
            }
        }
    }

    /// Total bytes allocated for column storage.
    pub(crate) fn total_alloc_size(&self) -> usize {
        self.columns
            .iter()
            .filter_map(|c| c.data.as_ref())
            .map(ColumnData::alloc_size)
            .sum()
    }

    /// Destination views over rows `[0, nrows)` of every column; `Skip` for
    /// columns not stored in the current pass.
    pub(crate) fn dest_slices(&mut self, nrows: usize) -> Result<Vec<DestSlice<'_>>> {
        self.columns
            .iter_mut()
            .map(|c| match (&mut c.data, c.present_in_buffer) {
                (Some(data), true) => data.dest(nrows),
                _ => Ok(DestSlice::Skip),
            })
            .collect()
    }

    pub(crate) fn into_output(self) -> (Vec<String>, Vec<Column>) {
        self.columns
            .into_iter()
            .filter(|c| c.present_in_output)
            .map(|c| {
                let ptype = c.ptype;
                let column = c
                    .data
                    .map(ColumnData::into_column)
                    .unwrap_or_else(|| Column::new_na(ptype.stype(), 0));
                (c.name, column)
            })
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_reports_each_transition_once() {
        let ledger = TypeLedger::new(vec![ParseType::Int32, ParseType::Bool]);
        assert_eq!(ledger.commit(0, ParseType::Float64), Some(ParseType::Int32));
        assert_eq!(ledger.commit(0, ParseType::Int64), None);
        assert_eq!(ledger.commit(0, ParseType::Float64), None);
        assert_eq!(ledger.commit(0, ParseType::Str), Some(ParseType::Float64));
        assert_eq!(ledger.take_bumped(), vec![0]);
        assert!(ledger.take_bumped().is_empty());
        assert_eq!(ledger.snapshot(), vec![ParseType::Str, ParseType::Bool]);
    }

    #[test]
    fn test_dest_split_front() {
        let mut values = vec![0i32; 5];
        let dest = DestSlice::Int32(&mut values);
        let (a, rest) = dest.split_front(2, 0);
        let (b, _) = rest.split_front(3, 0);
        if let (DestSlice::Int32(a), DestSlice::Int32(b)) = (a, b) {
            a.fill(1);
            b.fill(2);
        }
        assert_eq!(values, vec![1, 1, 2, 2, 2]);
    }
}
