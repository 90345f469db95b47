//! Per-worker chunk parsing.
//!
//! A [`FreadLocalParseContext`] parses one chunk at a time into scratch
//! vectors owned by the worker. Once the reader has fixed the chunk's place in
//! the output (its first row and, for string columns, its first data byte),
//! [`FreadLocalParseContext::push_buffers`] copies the scratch into a window of
//! the output columns that no other worker touches.

use super::chunk::{ChunkCoordinates, LineShape};
use super::columns::{DestSlice, TypeLedger};
use super::parsers::{parse_widening, NaStrings, ParseType, Value};
use super::tokenizer::{line_number, line_snippet, Dialect, Field, Line, Tokenizer};
use crate::column::string::encode_end;
use crate::column::{Bool8, FwElement};
use crate::error::{ColumnarError, Result};
use std::time::{Duration, Instant};

/// Read-only inputs shared by every worker of one pass.
#[derive(Debug)]
pub(crate) struct ChunkParams<'a> {
    /// The data section, ending at the last consistent line.
    pub input: &'a [u8],
    pub dialect: Dialect,
    pub na: &'a NaStrings,
    pub shape: LineShape,
    /// Type stored for each column in this pass, `None` when not stored.
    pub targets: &'a [Option<ParseType>],
    pub ledger: &'a TypeLedger,
}

/// A type promotion seen inside one chunk, not yet committed to the ledger.
#[derive(Debug, Clone)]
pub(crate) struct LocalBump {
    pub column: usize,
    pub to: ParseType,
    pub offset: usize,
    pub text: Vec<u8>,
    /// Row within the chunk.
    pub row: usize,
}

#[derive(Debug)]
enum Scratch {
    Skip,
    Bool(Vec<Bool8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    /// Ends are relative to the start of this chunk's `data`.
    Str { data: Vec<u8>, ends: Vec<i64> },
}

impl Scratch {
    fn new(target: Option<ParseType>) -> Self {
        match target {
            None => Self::Skip,
            Some(ParseType::Bool) => Self::Bool(Vec::new()),
            Some(ParseType::Int32) => Self::Int32(Vec::new()),
            Some(ParseType::Int64) => Self::Int64(Vec::new()),
            Some(ParseType::Float64) => Self::Float64(Vec::new()),
            Some(ParseType::Str) => Self::Str {
                data: Vec::new(),
                ends: Vec::new(),
            },
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Skip => {}
            Self::Bool(v) => v.clear(),
            Self::Int32(v) => v.clear(),
            Self::Int64(v) => v.clear(),
            Self::Float64(v) => v.clear(),
            Self::Str { data, ends } => {
                data.clear();
                ends.clear();
            }
        }
    }

    fn push_na(&mut self) {
        match self {
            Self::Skip => {}
            Self::Bool(v) => v.push(Bool8::NA),
            Self::Int32(v) => v.push(<i32 as FwElement>::NA),
            Self::Int64(v) => v.push(<i64 as FwElement>::NA),
            Self::Float64(v) => v.push(<f64 as FwElement>::NA),
            Self::Str { data, ends } => ends.push(encode_end(data.len(), true)),
        }
    }

    fn push(&mut self, value: Value, field: &Field<'_>, dialect: &Dialect) {
        match (self, value) {
            (Self::Bool(v), Value::Bool(b)) => v.push(Bool8::from(b)),
            (Self::Int32(v), Value::Int32(x)) => v.push(x),
            (Self::Int64(v), Value::Int64(x)) => v.push(x),
            (Self::Float64(v), Value::Float64(x)) => v.push(x),
            (Self::Str { data, ends }, Value::Str) => {
                let text = field.text(dialect);
                match std::str::from_utf8(&text) {
                    Ok(s) => data.extend_from_slice(s.as_bytes()),
                    Err(_) => data.extend_from_slice(String::from_utf8_lossy(&text).as_bytes()),
                }
                ends.push(encode_end(data.len(), false));
            }
            (scratch, _) => scratch.push_na(),
        }
    }

    fn truncate(&mut self, nrows: usize) {
        match self {
            Self::Skip => {}
            Self::Bool(v) => v.truncate(nrows),
            Self::Int32(v) => v.truncate(nrows),
            Self::Int64(v) => v.truncate(nrows),
            Self::Float64(v) => v.truncate(nrows),
            Self::Str { data, ends } => {
                ends.truncate(nrows);
                let end = ends.last().map_or(0, |&e| if e < 0 { (-1 - e) as usize } else { e as usize });
                data.truncate(end);
            }
        }
    }

    fn data_size(&self) -> usize {
        match self {
            Self::Str { data, .. } => data.len(),
            _ => 0,
        }
    }
}

fn copy_rows<T: Copy>(dest: &mut [T], src: &[T], column: usize) -> Result<()> {
    if dest.len() != src.len() {
        return Err(ColumnarError::precondition(format!(
            "column {column}: chunk holds {} rows but its destination has {}",
            src.len(),
            dest.len()
        )));
    }
    dest.copy_from_slice(src);
    Ok(())
}

/// One worker's parsing state.
///
/// A context is reused for many chunks; every call to `read_chunk` starts
/// from empty scratch buffers and a fresh snapshot of the column types.
#[derive(Debug)]
pub struct FreadLocalParseContext<'a> {
    params: &'a ChunkParams<'a>,
    fields: Vec<Field<'a>>,
    types: Vec<ParseType>,
    scratch: Vec<Scratch>,
    bumps: Vec<LocalBump>,
    str_starts: Vec<usize>,
    used_nrows: usize,
    time_read: Duration,
    time_push: Duration,
}

impl<'a> FreadLocalParseContext<'a> {
    pub(crate) fn new(params: &'a ChunkParams<'a>) -> Self {
        let ncols = params.targets.len();
        Self {
            params,
            fields: Vec::with_capacity(ncols),
            types: Vec::new(),
            scratch: params.targets.iter().map(|&t| Scratch::new(t)).collect(),
            bumps: Vec::new(),
            str_starts: vec![0; ncols],
            used_nrows: 0,
            time_read: Duration::ZERO,
            time_push: Duration::ZERO,
        }
    }

    /// Number of rows parsed from the current chunk.
    pub fn used_nrows(&self) -> usize {
        self.used_nrows
    }

    /// Total time spent parsing.
    pub fn time_read(&self) -> Duration {
        self.time_read
    }

    /// Total time spent copying into the output.
    pub fn time_push(&self) -> Duration {
        self.time_push
    }

    pub(crate) fn bumps(&self) -> &[LocalBump] {
        &self.bumps
    }

    /// String bytes parsed for column `j` in the current chunk.
    pub(crate) fn string_size(&self, j: usize) -> usize {
        self.scratch.get(j).map_or(0, Scratch::data_size)
    }

    fn reset(&mut self) {
        self.scratch.iter_mut().for_each(Scratch::clear);
        self.bumps.clear();
        self.used_nrows = 0;
    }

    /// Parses the lines that start inside `cc`.
    ///
    /// Every line beginning before `cc.end` is read to its end, so the
    /// returned coordinates may extend past the requested end. Returns
    /// `Ok(None)` when the chunk start was a guess that turned out not to be
    /// a record boundary; the same input at a known-true start is an error.
    pub(crate) fn read_chunk(&mut self, cc: &ChunkCoordinates) -> Result<Option<ChunkCoordinates>> {
        let started = Instant::now();
        let outcome = self.parse_lines(cc);
        self.time_read += started.elapsed();
        outcome
    }

    fn parse_lines(&mut self, cc: &ChunkCoordinates) -> Result<Option<ChunkCoordinates>> {
        self.reset();
        let params = self.params;
        self.types = params.ledger.snapshot();
        let shape = params.shape;
        let mut tok = Tokenizer::at(params.input, params.dialect, cc.start);
        let mut fields = std::mem::take(&mut self.fields);

        while tok.pos() < cc.end && !tok.is_eof() {
            let line_start = tok.pos();
            let line = match tok.read_line(&mut fields) {
                Some(line) => line,
                None if !cc.true_start => return Ok(None),
                None => {
                    return Err(self.line_error(
                        line_start,
                        format!("Unable to tokenize <<{}>>", line_snippet(params.input, line_start)),
                    ))
                }
            };
            if line == Line::Blank {
                if shape.skip_blank_lines {
                    continue;
                }
                if shape.fill || shape.ncols == 1 {
                    self.scratch.iter_mut().for_each(Scratch::push_na);
                    self.used_nrows += 1;
                    continue;
                }
            }
            let n = fields.len();
            if n == shape.ncols || (shape.fill && n < shape.ncols) {
                self.store_row(&fields);
            } else if !cc.true_start {
                return Ok(None);
            } else {
                return Err(self.line_error(
                    line_start,
                    format!(
                        "Expecting {} fields but found {n}: <<{}>>",
                        shape.ncols,
                        line_snippet(params.input, line_start)
                    ),
                ));
            }
        }
        self.fields = fields;
        Ok(Some(ChunkCoordinates {
            start: cc.start,
            end: tok.pos(),
            true_start: cc.true_start,
            true_end: cc.true_end,
        }))
    }

    fn line_error(&self, offset: usize, message: String) -> ColumnarError {
        ColumnarError::parse(
            line_number(self.params.input, offset, self.params.dialect.lf_present),
            message,
        )
    }

    fn store_row(&mut self, fields: &[Field<'a>]) {
        let params = self.params;
        let row = self.used_nrows;
        for (j, target) in params.targets.iter().enumerate() {
            let Some(target) = *target else { continue };
            let Some(field) = fields.get(j) else {
                self.scratch[j].push_na();
                continue;
            };
            let current = self.types[j];
            let (ptype, value) = parse_widening(current, field, params.na);
            if ptype != current {
                self.types[j] = ptype;
                self.bumps.push(LocalBump {
                    column: j,
                    to: ptype,
                    offset: field.start,
                    text: field.text(&params.dialect).into_owned(),
                    row,
                });
            }
            if ptype == target {
                self.scratch[j].push(value, field, &params.dialect);
            } else {
                self.scratch[j].push_na();
            }
        }
        self.used_nrows += 1;
    }

    /// Keeps only the first `nrows` rows of the current chunk, dropping
    /// promotions seen in the discarded rows.
    pub(crate) fn truncate(&mut self, nrows: usize) {
        if nrows >= self.used_nrows {
            return;
        }
        self.scratch.iter_mut().for_each(|s| s.truncate(nrows));
        self.bumps.retain(|b| b.row < nrows);
        self.used_nrows = nrows;
    }

    /// Claims this chunk's place in the string data of every column.
    ///
    /// `offsets[j]` is the number of bytes already claimed in column `j` by
    /// earlier chunks; it is advanced past this chunk's bytes.
    pub(crate) fn order_buffer(&mut self, offsets: &mut [usize]) {
        for (j, scratch) in self.scratch.iter().enumerate() {
            if let Scratch::Str { data, .. } = scratch {
                self.str_starts[j] = offsets[j];
                offsets[j] += data.len();
            }
        }
    }

    /// Copies the current chunk into its output windows, one per column.
    pub(crate) fn push_buffers(&mut self, dests: Vec<DestSlice<'_>>) -> Result<()> {
        let started = Instant::now();
        for (j, (dest, scratch)) in dests.into_iter().zip(&self.scratch).enumerate() {
            match (dest, scratch) {
                (DestSlice::Skip, _) => {}
                (DestSlice::Bool(d), Scratch::Bool(s)) => copy_rows(d, s, j)?,
                (DestSlice::Int32(d), Scratch::Int32(s)) => copy_rows(d, s, j)?,
                (DestSlice::Int64(d), Scratch::Int64(s)) => copy_rows(d, s, j)?,
                (DestSlice::Float64(d), Scratch::Float64(s)) => copy_rows(d, s, j)?,
                (DestSlice::Str { ends, data, offset }, Scratch::Str { data: sd, ends: se }) => {
                    if offset != self.str_starts[j] {
                        return Err(ColumnarError::precondition(format!(
                            "column {j}: string data placed at {offset}, claimed at {}",
                            self.str_starts[j]
                        )));
                    }
                    copy_rows(data, sd, j)?;
                    let shift = offset as i64;
                    if ends.len() != se.len() {
                        return Err(ColumnarError::precondition(format!(
                            "column {j}: chunk holds {} rows but its destination has {}",
                            se.len(),
                            ends.len()
                        )));
                    }
                    for (d, &e) in ends.iter_mut().zip(se) {
                        *d = if e < 0 { e - shift } else { e + shift };
                    }
                }
                _ => {
                    return Err(ColumnarError::precondition(format!(
                        "column {j}: destination type does not match the parsed type"
                    )))
                }
            }
        }
        self.time_push += started.elapsed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fread::options::QuoteRule;

    fn dialect() -> Dialect {
        Dialect {
            sep: Some(b','),
            quote: b'"',
            quote_rule: QuoteRule::Doubled,
            strip_white: true,
            lf_present: true,
        }
    }

    fn shape(ncols: usize) -> LineShape {
        LineShape {
            ncols,
            fill: false,
            skip_blank_lines: false,
        }
    }

    fn whole(input: &[u8]) -> ChunkCoordinates {
        ChunkCoordinates {
            start: 0,
            end: input.len(),
            true_start: true,
            true_end: true,
        }
    }

    #[test]
    fn test_read_chunk_records_local_bump() {
        let input = b"1,a\n2,b\n2.5,c\n";
        let na = NaStrings::new(&["NA".to_string()], false);
        let ledger = TypeLedger::new(vec![ParseType::Int32, ParseType::Str]);
        let targets = [Some(ParseType::Int32), Some(ParseType::Str)];
        let params = ChunkParams {
            input,
            dialect: dialect(),
            na: &na,
            shape: shape(2),
            targets: &targets,
            ledger: &ledger,
        };
        let mut ctx = FreadLocalParseContext::new(&params);
        let out = ctx.read_chunk(&whole(input)).unwrap().unwrap();
        assert_eq!(out.end, input.len());
        assert_eq!(ctx.used_nrows(), 3);
        assert_eq!(ctx.bumps().len(), 1);
        assert_eq!(ctx.bumps()[0].to, ParseType::Float64);
        assert_eq!(ctx.bumps()[0].row, 2);
        assert_eq!(ctx.bumps()[0].text, b"2.5".to_vec());
        assert_eq!(ctx.string_size(1), 3);
    }

    #[test]
    fn test_guessed_start_mismatch_returns_none() {
        let input = b"1,2\n3\n4,5\n";
        let na = NaStrings::default();
        let ledger = TypeLedger::new(vec![ParseType::Int32; 2]);
        let targets = [Some(ParseType::Int32); 2];
        let params = ChunkParams {
            input,
            dialect: dialect(),
            na: &na,
            shape: shape(2),
            targets: &targets,
            ledger: &ledger,
        };
        let mut ctx = FreadLocalParseContext::new(&params);
        let guessed = ChunkCoordinates {
            true_start: false,
            ..whole(input)
        };
        assert!(ctx.read_chunk(&guessed).unwrap().is_none());
        let err = ctx.read_chunk(&whole(input)).unwrap_err();
        assert!(matches!(err, ColumnarError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_push_buffers_shifts_string_ends() {
        let input = b"x\n\ny\n";
        let na = NaStrings::default();
        let ledger = TypeLedger::new(vec![ParseType::Str]);
        let targets = [Some(ParseType::Str)];
        let params = ChunkParams {
            input,
            dialect: Dialect {
                sep: None,
                ..dialect()
            },
            na: &na,
            shape: shape(1),
            targets: &targets,
            ledger: &ledger,
        };
        let mut ctx = FreadLocalParseContext::new(&params);
        ctx.read_chunk(&whole(input)).unwrap().unwrap();
        assert_eq!(ctx.used_nrows(), 3);

        let mut offsets = vec![5];
        ctx.order_buffer(&mut offsets);
        assert_eq!(offsets, vec![7]);

        let mut ends = vec![0i64; 3];
        let mut data = vec![0u8; 2];
        let dest = DestSlice::Str {
            ends: &mut ends,
            data: &mut data,
            offset: 5,
        };
        ctx.push_buffers(vec![dest]).unwrap();
        assert_eq!(data, b"xy".to_vec());
        assert_eq!(ends, vec![6, -7, 7]);
    }
}
