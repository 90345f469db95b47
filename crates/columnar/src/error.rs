//! Error and Result types for column storage and CSV ingestion.

use crate::column::SType;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for columnar operations.
pub type Result<T> = std::result::Result<T, ColumnarError>;

/// The error type for buffer, column and reader operations.
#[derive(Debug, Error)]
pub enum ColumnarError {
    /// A declared byte size disagrees with the actual size of a buffer or file.
    #[error("Size mismatch for {context}: expected {expected} bytes, actual size is {actual} bytes")]
    SizeMismatch {
        /// What was being sized (file name, external buffer, replacement buffer).
        context: String,
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// A growth-only operation was asked to reduce the row count.
    #[error("Cannot shrink a column from {current} to {requested} rows")]
    IllegalShrink {
        /// Current row count.
        current: usize,
        /// Requested row count.
        requested: usize,
    },

    /// Caller or internal bug: the operation is not legal in the current state.
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// No separator / quote rule combination tokenizes the input consistently.
    #[error("Unable to tokenize input: {0}")]
    ParseAmbiguity(String),

    /// Malformed input found while reading.
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number in the input.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The stored types cannot be converted into each other.
    #[error("Cannot cast column of type {from} into {to}")]
    UnsupportedCast {
        /// Source storage type.
        from: SType,
        /// Target storage type.
        to: SType,
    },

    /// The caller requested the read to stop.
    #[error("Read cancelled by caller")]
    Cancelled,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl ColumnarError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionViolation(msg.into())
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
