//! The read driver.
//!
//! A read runs through fixed phases: initialization, format detection, type
//! detection, allocation, a parallel pass over the data, and further passes
//! over columns whose type was promoted by an earlier pass. Each parallel pass
//! handles chunks in batches:
//!
//! 1. every chunk of the batch is parsed in parallel into worker scratch;
//! 2. the chunks are reconciled serially in input order: a chunk that did not
//!    start where its predecessor ended is parsed again from the right place,
//!    rows and string bytes are assigned, the allocation grows if needed, and
//!    type promotions are committed to the shared ledger;
//! 3. every chunk copies its scratch into its own window of the output in
//!    parallel.

use super::chunk::{ChunkCoordinates, ChunkOrganizer, LineShape};
use super::columns::{ColumnData, DestSlice, ReaderColumns, TypeLedger};
use super::context::{ChunkParams, FreadLocalParseContext};
use super::observer::{FreadObserver, FreadReport, Phase, TypeBump};
use super::options::{QuoteRule, ReadOptions, DEFAULT_QUOTE};
use super::parsers::{NaStrings, ParseType};
use super::tokenizer::{line_number, Dialect};
use crate::error::{ColumnarError, Result};
use crate::frame::ColumnSet;
use crate::storage::Buffer;
use rayon::prelude::*;
use std::io;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Minimum number of rows added when the allocation grows.
const MIN_GROWTH_ROWS: usize = 1024;

/// Result of a successful read.
#[derive(Debug)]
pub struct FreadOutput {
    /// The columns read.
    pub frame: ColumnSet,
    /// Diagnostics of the read.
    pub report: FreadReport,
}

/// Reads delimited text held in memory.
pub fn fread(input: &[u8], opts: &ReadOptions) -> Result<FreadOutput> {
    FreadReader::new(input, opts).read()
}

/// Reads a delimited text file through a read-only memory map.
pub fn fread_file(path: &Path, opts: &ReadOptions) -> Result<FreadOutput> {
    let buffer = Buffer::map_file(path, None)?;
    debug!(path = %path.display(), size = buffer.size(), "mapped input file");
    fread(buffer.as_bytes(), opts)
}

/// Detects the format of one input and reads it into columns.
#[derive(Debug)]
pub struct FreadReader<'a> {
    pub(super) input: &'a [u8],
    pub(super) opts: &'a ReadOptions,
    /// Start of the data section (after the byte order mark, skipped lines
    /// and the header, as they are discovered).
    pub(super) sof: usize,
    /// End of the data section.
    pub(super) eof: usize,
    pub(super) dialect: Dialect,
    pub(super) na: NaStrings,
    pub(super) fill: bool,
    pub(super) header: Option<bool>,
    pub(super) ncols: usize,
    pub(super) columns: ReaderColumns,
    pub(super) first_jump_end: usize,
    pub(super) mean_line_len: f64,
    pub(super) alloc_nrows: usize,
    pub(super) max_nrows: usize,
    pub(super) nthreads: usize,
    pub(super) observer: FreadObserver,
}

impl<'a> FreadReader<'a> {
    /// Creates a reader over `input`.
    pub fn new(input: &'a [u8], opts: &'a ReadOptions) -> Self {
        Self {
            input,
            opts,
            sof: 0,
            eof: input.len(),
            dialect: Dialect {
                sep: None,
                quote: DEFAULT_QUOTE,
                quote_rule: QuoteRule::Doubled,
                strip_white: true,
                lf_present: true,
            },
            na: NaStrings::default(),
            fill: false,
            header: None,
            ncols: 0,
            columns: ReaderColumns::default(),
            first_jump_end: 0,
            mean_line_len: 0.0,
            alloc_nrows: 0,
            max_nrows: usize::MAX,
            nthreads: 1,
            observer: FreadObserver::new(),
        }
    }

    /// Emits a progress message.
    pub(super) fn trace(&self, message: &str) {
        debug!("{message}");
        if self.opts.verbose {
            if let Some(logger) = &self.opts.logger {
                logger.log(message);
            }
        }
    }

    /// Emits a warning; warnings also end up in the report.
    pub(super) fn warn(&mut self, message: String) {
        warn!("{message}");
        if let Some(logger) = &self.opts.logger {
            logger.warn(&message);
        }
        self.observer.warning(message);
    }

    fn check_abort(&self) -> Result<()> {
        match &self.opts.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(ColumnarError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Runs every phase and returns the finished columns.
    pub fn read(mut self) -> Result<FreadOutput> {
        self.observer.input_size = self.input.len();
        self.initialize();
        self.observer.mark(Phase::Initialize);
        if self.is_empty_input() {
            self.trace("Input is empty or holds only whitespace");
            self.observer.mark(Phase::Finalize);
            return Ok(FreadOutput {
                frame: ColumnSet::default(),
                report: self.observer.report(),
            });
        }
        self.check_abort()?;

        self.detect_format()?;
        self.observer.mark(Phase::DetectFormat);
        self.detect_types()?;
        self.parse_column_names()?;
        self.apply_overrides()?;
        self.observer.mark(Phase::DetectTypes);

        for col in self.columns.iter_mut() {
            col.present_in_buffer = col.present_in_output;
        }
        self.columns.allocate(self.alloc_nrows)?;
        self.observer.rows_allocated = self.alloc_nrows;
        self.observer.cols_allocated = self.columns.n_outputs();
        self.observer.allocation_size = self.columns.total_alloc_size();
        self.trace(&format!(
            "Allocated {} rows x {} columns: {}",
            self.alloc_nrows,
            self.columns.n_outputs(),
            self.columns.print_types()
        ));
        self.observer.mark(Phase::Allocate);

        let ledger = TypeLedger::new(self.columns.types());
        let mut limit = self.max_nrows;
        let mut alloc = self.alloc_nrows;
        let mut pass = 0;
        let nrows = loop {
            let nrows = self.read_pass(&ledger, limit, alloc)?;
            self.observer.mark(if pass == 0 { Phase::Read } else { Phase::Reread });
            let bumped = ledger.take_bumped();
            let types = ledger.snapshot();
            let mut nreread = 0;
            for (j, col) in self.columns.iter_mut().enumerate() {
                let reread = col.present_in_output && bumped.contains(&j);
                col.present_in_buffer = reread;
                if reread {
                    col.ptype = types[j];
                    col.data = Some(ColumnData::new(col.ptype, nrows));
                    nreread += 1;
                }
            }
            if nreread == 0 {
                break nrows;
            }
            self.trace(&format!(
                "{nreread} column(s) need to be read again because their types have changed"
            ));
            self.observer.reread_columns += nreread;
            self.observer.reread_passes += 1;
            limit = nrows;
            alloc = nrows;
            pass += 1;
        };

        for col in self.columns.iter_mut() {
            if let Some(data) = col.data.as_mut() {
                data.resize(nrows)?;
            }
        }
        let columns = std::mem::take(&mut self.columns);
        let (names, columns) = columns.into_output();
        let frame = ColumnSet::new(names, columns)?;
        self.observer.rows_read = frame.nrows();
        self.observer.cols_read = frame.ncols();
        self.observer.mark(Phase::Finalize);
        let report = self.observer.report();
        debug!(rows = report.rows_read, cols = report.cols_read, "read finished");
        if self.opts.verbose {
            if let Some(logger) = &self.opts.logger {
                for line in report.to_string().lines() {
                    logger.log(line);
                }
            }
        }
        Ok(FreadOutput { frame, report })
    }

    /// One parallel pass over the data section, storing the columns marked
    /// present in the buffer. Returns the number of rows read.
    fn read_pass(&mut self, ledger: &TypeLedger, limit: usize, mut alloc: usize) -> Result<usize> {
        self.check_abort()?;
        let input = self.input;
        let data = &input[..self.eof];
        let targets: Vec<Option<ParseType>> = self
            .columns
            .iter()
            .map(|c| c.present_in_buffer.then_some(c.ptype))
            .collect();
        let shape = LineShape {
            ncols: self.ncols,
            fill: self.fill,
            skip_blank_lines: self.opts.skip_blank_lines,
        };
        let params = ChunkParams {
            input: data,
            dialect: self.dialect,
            na: &self.na,
            shape,
            targets: &targets,
            ledger,
        };
        let mut org = ChunkOrganizer::new(
            self.sof,
            self.eof,
            self.opts.chunk_size,
            self.mean_line_len,
            self.nthreads,
        );
        if org.nthreads() != self.nthreads {
            debug!(
                requested = self.nthreads,
                used = org.nthreads(),
                "thread count reduced because the input is small"
            );
        }
        self.observer.nthreads = org.nthreads();
        self.observer.nchunks = org.nchunks();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(org.nthreads())
            .build()
            .map_err(io::Error::other)?;

        let batch = org.nthreads() * 2;
        let mut contexts: Vec<FreadLocalParseContext<'_>> =
            (0..batch).map(|_| FreadLocalParseContext::new(&params)).collect();
        let ncols = targets.len();
        let mut str_offsets = vec![0usize; ncols];
        let mut nrows = 0usize;
        let mut first = 0usize;
        let abort = self.opts.abort.as_deref();

        while first < org.nchunks() && nrows < limit {
            self.check_abort()?;
            let count = batch.min(org.nchunks() - first);
            let known_start = org.last_end();

            let org_ref = &org;
            let parsed: Vec<Result<(ChunkCoordinates, Option<ChunkCoordinates>)>> = pool.install(|| {
                contexts[..count]
                    .par_iter_mut()
                    .enumerate()
                    .map(|(k, ctx)| {
                        if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                            return Err(ColumnarError::Cancelled);
                        }
                        let requested = org_ref.compute_chunk_boundaries(
                            first + k,
                            (k == 0).then_some(known_start),
                            data,
                            params.dialect,
                            shape,
                        );
                        let actual = ctx.read_chunk(&requested)?;
                        Ok((requested, actual))
                    })
                    .collect()
            });

            let batch_row0 = nrows;
            let batch_str_start = str_offsets.clone();
            let mut done = 0;
            for (k, outcome) in parsed.into_iter().enumerate() {
                let (mut requested, actual) = outcome?;
                let i = first + k;
                let ctx = &mut contexts[k];
                let ordered = match actual {
                    Some(actual) => org.is_ordered(&actual, &mut requested),
                    None => false,
                };
                if !ordered {
                    requested.start = org.last_end();
                    requested.true_start = true;
                    let actual = ctx.read_chunk(&requested)?.ok_or_else(|| {
                        ColumnarError::precondition(format!(
                            "chunk {i} could not be read from a known record start"
                        ))
                    })?;
                    if !org.is_ordered(&actual, &mut requested) {
                        return Err(ColumnarError::precondition(format!(
                            "chunk {i} is out of order after being read again"
                        )));
                    }
                }

                let mut used = ctx.used_nrows();
                if nrows + used > limit {
                    used = limit - nrows;
                    ctx.truncate(used);
                }
                let end_row = nrows + used;
                if end_row > alloc {
                    let new_alloc = if i + 1 == org.nchunks() {
                        end_row
                    } else {
                        let projected = end_row as f64 * org.nchunks() as f64 / (i + 1) as f64 * 1.2;
                        (projected as usize)
                            .max(alloc + MIN_GROWTH_ROWS)
                            .max(end_row)
                    }
                    .min(limit)
                    .max(end_row);
                    self.trace(&format!(
                        "  Too few rows allocated; growing from {alloc} to {new_alloc} rows (after chunk {i} of {})",
                        org.nchunks()
                    ));
                    self.columns.allocate(new_alloc)?;
                    self.observer.allocation_grown += 1;
                    alloc = new_alloc;
                }
                ctx.order_buffer(&mut str_offsets);
                for bump in ctx.bumps() {
                    let Some(from) = ledger.commit(bump.column, bump.to) else {
                        continue;
                    };
                    let name = self
                        .columns
                        .iter()
                        .nth(bump.column)
                        .map(|c| c.name.clone())
                        .unwrap_or_default();
                    let event = TypeBump {
                        column: bump.column,
                        name,
                        from,
                        to: bump.to,
                        field: String::from_utf8_lossy(&bump.text).into_owned(),
                        line: line_number(input, bump.offset, self.dialect.lf_present),
                    };
                    self.trace(&event.to_string());
                    self.observer.type_bump_info(event);
                }
                nrows = end_row;
                done = k + 1;
                if nrows >= limit {
                    break;
                }
            }

            self.columns.reserve_strings(&str_offsets);
            let dests = self.columns.dest_slices(alloc)?;
            let mut rest: Vec<DestSlice<'_>> = dests
                .into_iter()
                .zip(&batch_str_start)
                .map(|(d, &bytes)| d.split_front(batch_row0, bytes).1)
                .collect();
            let mut windows = Vec::with_capacity(done);
            for ctx in &contexts[..done] {
                let mut mine = Vec::with_capacity(ncols);
                let mut next = Vec::with_capacity(ncols);
                for (j, d) in rest.into_iter().enumerate() {
                    let (a, b) = d.split_front(ctx.used_nrows(), ctx.string_size(j));
                    mine.push(a);
                    next.push(b);
                }
                rest = next;
                windows.push(mine);
            }
            pool.install(|| {
                contexts[..done]
                    .par_iter_mut()
                    .zip(windows)
                    .try_for_each(|(ctx, window)| ctx.push_buffers(window))
            })?;

            first += count;
        }

        for ctx in &contexts {
            self.observer.time_read += ctx.time_read();
            self.observer.time_push += ctx.time_push();
        }
        Ok(nrows)
    }
}
