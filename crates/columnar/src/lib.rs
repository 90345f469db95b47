//! Alopex Columnar - column storage and CSV ingestion
//!
//! This crate provides fixed-width column storage over owned, external or
//! memory-mapped buffers, and a parallel reader that turns delimited text into
//! typed columns.
//!
//! # Components
//!
//! - [`Buffer`]: owned, borrowed or file-mapped byte storage
//! - [`RowIndex`]: lazy row selection over a column's data
//! - [`FixedWidthColumn`]: typed fixed-width column with NA handling
//! - [`Column`] / [`ColumnSet`]: dynamically typed columns and named sets
//! - [`fread`]: parallel chunked reader for delimited text
//!
//! # Example
//!
//! ```rust
//! use alopex_columnar::{fread, Column, ReadOptions};
//!
//! let out = fread(b"id,score\n1,0.5\n2,NA\n", &ReadOptions::default())?;
//! assert_eq!(out.frame.names(), &["id".to_string(), "score".to_string()]);
//! match out.frame.column(1) {
//!     Some(Column::Float64(c)) => assert_eq!(c.na_count(), 1),
//!     other => panic!("unexpected column {other:?}"),
//! }
//! # Ok::<(), alopex_columnar::ColumnarError>(())
//! ```

#![deny(missing_docs)]

pub mod column;
pub mod error;
pub mod frame;
pub mod fread;
pub mod storage;

pub use column::{Bool8, Column, FixedWidthColumn, FwElement, SType, StringColumn};
pub use error::{ColumnarError, Result};
pub use frame::ColumnSet;
pub use fread::{fread, fread_file, FreadOutput, FreadReport, ParseType, ReadOptions};
pub use storage::{Buffer, RowIndex};
