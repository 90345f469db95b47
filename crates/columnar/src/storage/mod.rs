//! Physical storage primitives: memory buffers and row views over them.

pub mod buffer;
pub mod rowindex;

pub use buffer::{Buffer, BufferKind, ReleaseFn};
pub use rowindex::RowIndex;
