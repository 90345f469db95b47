//! Splitting the data section into self-correcting chunks.
//!
//! Chunk boundaries are guesses: a worker jumps to an approximate byte offset
//! and looks for the start of a line that tokenizes consistently. After the
//! parallel parse, [`ChunkOrganizer::is_ordered`] checks every chunk against
//! the true end of its predecessor, in input order, and reports the correct
//! start for any chunk that must be read again.

use super::tokenizer::{Dialect, Tokenizer};

/// Default lower bound on the chunk size in bytes.
pub const MIN_CHUNK_SIZE: usize = 65536;

/// Number of lines that must tokenize consistently after a guessed start.
const LINES_TO_CHECK: usize = 5;

/// Number of candidate line starts tried before giving up on a guess.
const MAX_START_ATTEMPTS: usize = 30;

/// A byte range of the input assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkCoordinates {
    /// First byte of the chunk.
    pub start: usize,
    /// Advisory end when requested; actual end after reading.
    pub end: usize,
    /// True if `start` is known to be the beginning of a record.
    pub true_start: bool,
    /// True if `end` is the end of the data section.
    pub true_end: bool,
}

/// Line-shape expectations used to validate a guessed chunk start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineShape {
    pub ncols: usize,
    pub fill: bool,
    pub skip_blank_lines: bool,
}

impl LineShape {
    fn accepts(&self, nfields: usize) -> bool {
        nfields == self.ncols
            || (self.fill && nfields <= self.ncols)
            || (nfields == 0 && self.skip_blank_lines)
    }
}

/// Computes chunk boundaries and tracks the ordered end of the data read so far.
#[derive(Debug)]
pub struct ChunkOrganizer {
    input_start: usize,
    input_end: usize,
    chunk_size: usize,
    nchunks: usize,
    nthreads: usize,
    last_end: usize,
}

impl ChunkOrganizer {
    /// Plans chunks over `[input_start, input_end)`.
    ///
    /// Without an explicit `chunk_size`, chunks hold roughly 1000 lines and at
    /// least [`MIN_CHUNK_SIZE`] bytes. The thread count is reduced when there
    /// are fewer chunks than threads.
    pub fn new(
        input_start: usize,
        input_end: usize,
        chunk_size: Option<usize>,
        mean_line_len: f64,
        nthreads: usize,
    ) -> Self {
        let size = input_end.saturating_sub(input_start);
        let (chunk_size, nchunks) = match chunk_size {
            Some(cs) => {
                let cs = cs.max(1);
                (cs, (size / cs).max(1))
            }
            None => {
                let cs = ((1000.0 * mean_line_len) as usize).max(MIN_CHUNK_SIZE);
                let n = (size / cs).max(1);
                (size / n, n)
            }
        };
        Self {
            input_start,
            input_end,
            chunk_size: chunk_size.max(1),
            nchunks,
            nthreads: nthreads.clamp(1, nchunks),
            last_end: input_start,
        }
    }

    /// Number of chunks.
    pub fn nchunks(&self) -> usize {
        self.nchunks
    }

    /// Number of threads worth using for this many chunks.
    pub fn nthreads(&self) -> usize {
        self.nthreads
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// End of the last chunk accepted in order.
    pub fn last_end(&self) -> usize {
        self.last_end
    }

    /// Advisory coordinates for chunk `i`, before any start correction.
    pub fn chunk_bounds(&self, i: usize) -> ChunkCoordinates {
        let start = self.input_start + i * self.chunk_size;
        let last = i + 1 >= self.nchunks;
        ChunkCoordinates {
            start: start.min(self.input_end),
            end: if last {
                self.input_end
            } else {
                (start + self.chunk_size).min(self.input_end)
            },
            true_start: i == 0,
            true_end: last,
        }
    }

    /// Coordinates for chunk `i`. `known_start` is the true start when the
    /// predecessor has already been read in order; otherwise the guessed
    /// start is moved to the next plausible line start.
    pub(crate) fn compute_chunk_boundaries(
        &self,
        i: usize,
        known_start: Option<usize>,
        input: &[u8],
        dialect: Dialect,
        shape: LineShape,
    ) -> ChunkCoordinates {
        let mut cc = self.chunk_bounds(i);
        match known_start {
            Some(start) => {
                cc.start = start;
                cc.true_start = true;
            }
            None if !cc.true_start => {
                next_good_line_start(&mut cc, input, dialect, shape, self.input_end);
            }
            None => {}
        }
        cc
    }

    /// Checks that `actual` starts exactly where the previous ordered chunk
    /// ended. On success the ordered end advances to `actual.end`; otherwise
    /// `requested` is rewritten to start at the true position.
    pub fn is_ordered(&mut self, actual: &ChunkCoordinates, requested: &mut ChunkCoordinates) -> bool {
        if actual.start == self.last_end {
            self.last_end = actual.end;
            true
        } else {
            requested.start = self.last_end;
            requested.true_start = true;
            false
        }
    }
}

/// Moves `cc.start` to the first line start at or after it from which the
/// next few lines tokenize into the expected number of fields. Returns false
/// if no such line was found, leaving `cc` unchanged.
pub(crate) fn next_good_line_start(
    cc: &mut ChunkCoordinates,
    input: &[u8],
    dialect: Dialect,
    shape: LineShape,
    input_end: usize,
) -> bool {
    let data = &input[..input_end];
    let mut tok = Tokenizer::at(data, dialect, cc.start);
    let at_line_start = cc.start == 0 || matches!(data.get(cc.start - 1), Some(b'\n' | b'\r'));
    if !at_line_start {
        tok.skip_to_next_line();
    }
    for _ in 0..MAX_START_ATTEMPTS {
        let candidate = tok.pos();
        if candidate >= input_end {
            return false;
        }
        let mut ok = true;
        for _ in 0..LINES_TO_CHECK {
            if tok.is_eof() {
                break;
            }
            match tok.count_fields() {
                Some(n) if shape.accepts(n) => {}
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            cc.start = candidate;
            return true;
        }
        tok.set_pos(candidate);
        tok.skip_to_next_line();
    }
    false
}
