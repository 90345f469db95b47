//! Parallel chunked reader for delimited text.
//!
//! A read detects the separator, quote rule, header and column types from a
//! sample of the input, then splits the data into chunks that are parsed by
//! worker threads. Columns whose type turns out too narrow after the sample
//! are promoted and read again.
//!
//! - [`fread`] / [`fread_file`]: one-call entry points
//! - [`FreadReader`]: the phase driver
//! - [`FreadLocalParseContext`]: per-worker chunk parsing
//! - [`ChunkOrganizer`]: chunk boundaries and ordering
//! - [`FreadObserver`] / [`FreadReport`]: timings and diagnostics

pub mod chunk;
mod columns;
pub mod context;
mod detect;
pub mod observer;
pub mod options;
pub mod parsers;
pub mod reader;
mod tokenizer;

pub use chunk::{ChunkCoordinates, ChunkOrganizer, MIN_CHUNK_SIZE};
pub use context::FreadLocalParseContext;
pub use observer::{FreadObserver, FreadReport, Phase, TypeBump};
pub use options::{
    ColumnSelector, ColumnTypeOverride, Logger, OverrideTarget, QuoteRule, ReadOptions,
    DEFAULT_NA_STRINGS, DEFAULT_QUOTE,
};
pub use parsers::ParseType;
pub use reader::{fread, fread_file, FreadOutput, FreadReader};
