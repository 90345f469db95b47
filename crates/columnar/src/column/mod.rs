//! Typed columns.
//!
//! - [`FixedWidthColumn`]: generic fixed-width storage with lazy row views
//! - [`StringColumn`]: variable-width strings produced by the reader
//! - [`Column`]: dynamically typed wrapper used for casts and row-binding

pub mod element;
pub mod fixed;
pub mod stats;
pub mod string;

pub use element::{Bool8, ExternalObject, FwElement, ObjRef, SType, Wide};
pub use fixed::FixedWidthColumn;
pub use stats::Stats;
pub use string::StringColumn;

use crate::error::{ColumnarError, Result};
use std::any::Any;

/// A column of any storage type.
#[derive(Debug)]
pub enum Column {
    /// Structural placeholder of the given row count with no data; all NA.
    Void(usize),
    /// Boolean column.
    Bool(FixedWidthColumn<Bool8>),
    /// 8-bit integer column.
    Int8(FixedWidthColumn<i8>),
    /// 16-bit integer column.
    Int16(FixedWidthColumn<i16>),
    /// 32-bit integer column.
    Int32(FixedWidthColumn<i32>),
    /// 64-bit integer column.
    Int64(FixedWidthColumn<i64>),
    /// 32-bit float column.
    Float32(FixedWidthColumn<f32>),
    /// 64-bit float column.
    Float64(FixedWidthColumn<f64>),
    /// String column.
    Str(StringColumn),
    /// Object reference column.
    Obj(FixedWidthColumn<ObjRef>),
}

/// Runs `$body` with `$c` bound to the inner fixed-width column, or evaluates
/// `$other` for the void and string variants.
macro_rules! with_fixed {
    ($col:expr, $c:ident => $body:expr, $rest:pat => $other:expr) => {
        match $col {
            Column::Bool($c) => $body,
            Column::Int8($c) => $body,
            Column::Int16($c) => $body,
            Column::Int32($c) => $body,
            Column::Int64($c) => $body,
            Column::Float32($c) => $body,
            Column::Float64($c) => $body,
            Column::Obj($c) => $body,
            $rest => $other,
        }
    };
}

impl Column {
    /// Creates an all-NA column of the given type.
    pub fn new_na(stype: SType, nrows: usize) -> Self {
        match stype {
            SType::Void => Self::Void(nrows),
            SType::Bool => Self::Bool(FixedWidthColumn::new_na(nrows)),
            SType::Int8 => Self::Int8(FixedWidthColumn::new_na(nrows)),
            SType::Int16 => Self::Int16(FixedWidthColumn::new_na(nrows)),
            SType::Int32 => Self::Int32(FixedWidthColumn::new_na(nrows)),
            SType::Int64 => Self::Int64(FixedWidthColumn::new_na(nrows)),
            SType::Float32 => Self::Float32(FixedWidthColumn::new_na(nrows)),
            SType::Float64 => Self::Float64(FixedWidthColumn::new_na(nrows)),
            SType::Str => Self::Str(StringColumn::new_na(nrows)),
            SType::Obj => Self::Obj(FixedWidthColumn::new_na(nrows)),
        }
    }

    /// Storage type.
    pub fn stype(&self) -> SType {
        with_fixed!(self, c => c.stype(), other => match other {
            Column::Str(_) => SType::Str,
            _ => SType::Void,
        })
    }

    /// Number of logical rows.
    pub fn nrows(&self) -> usize {
        with_fixed!(self, c => c.nrows(), other => match other {
            Column::Void(n) => *n,
            Column::Str(s) => s.nrows(),
            _ => 0,
        })
    }

    /// Number of NA rows.
    pub fn na_count(&self) -> usize {
        with_fixed!(self, c => c.na_count(), other => match other {
            Column::Void(n) => *n,
            Column::Str(s) => s.na_count(),
            _ => 0,
        })
    }

    /// Borrows the inner column if it stores `T`.
    pub fn as_fixed<T: FwElement>(&self) -> Option<&FixedWidthColumn<T>> {
        with_fixed!(self, c => (c as &dyn Any).downcast_ref::<FixedWidthColumn<T>>(), _ => None)
    }

    /// Borrows the inner string column.
    pub fn as_str(&self) -> Option<&StringColumn> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Materializes any row index.
    pub fn reify(&mut self) -> Result<()> {
        with_fixed!(self, c => c.reify(), _ => Ok(()))
    }

    /// Returns true if values of `from` can be converted into `to`.
    ///
    /// Placeholders convert into anything. Numeric types convert among each
    /// other and into strings. Object references convert only into themselves.
    pub fn can_cast(from: SType, to: SType) -> bool {
        from == to
            || from == SType::Void
            || (from.is_numeric() && (to.is_numeric() || to == SType::Str))
    }

    /// Converts into a column of type `to`, preserving NA values.
    pub fn cast(self, to: SType) -> Result<Column> {
        let from = self.stype();
        if from == to {
            return Ok(self);
        }
        if !Self::can_cast(from, to) {
            return Err(ColumnarError::UnsupportedCast { from, to });
        }
        if let Column::Void(n) = self {
            return Ok(Self::new_na(to, n));
        }
        Ok(match to {
            SType::Bool => Self::Bool(self.into_typed()?),
            SType::Int8 => Self::Int8(self.into_typed()?),
            SType::Int16 => Self::Int16(self.into_typed()?),
            SType::Int32 => Self::Int32(self.into_typed()?),
            SType::Int64 => Self::Int64(self.into_typed()?),
            SType::Float32 => Self::Float32(self.into_typed()?),
            SType::Float64 => Self::Float64(self.into_typed()?),
            SType::Str => Self::Str(with_fixed!(&self, c => StringColumn::cast_from(c.iter()), _ => {
                return Err(ColumnarError::UnsupportedCast { from, to });
            })),
            SType::Void | SType::Obj => return Err(ColumnarError::UnsupportedCast { from, to }),
        })
    }

    /// Converts into a reified fixed-width column of type `T`.
    pub fn into_typed<T: FwElement>(self) -> Result<FixedWidthColumn<T>> {
        let from = self.stype();
        if !Self::can_cast(from, T::STYPE) || T::STYPE == SType::Str {
            return Err(ColumnarError::UnsupportedCast { from, to: T::STYPE });
        }
        match T::from_column(self) {
            Ok(mut col) => {
                col.reify()?;
                Ok(col)
            }
            Err(Column::Void(n)) => Ok(FixedWidthColumn::new_na(n)),
            Err(other) => with_fixed!(&other, c => Ok(cast_fixed::<T>(c)), _ => {
                Err(ColumnarError::UnsupportedCast { from, to: T::STYPE })
            }),
        }
    }

    /// Concatenates `primary` and `others` row-wise.
    ///
    /// The result type is the widest stored type among the non-placeholder
    /// inputs; a result made only of placeholders is itself a placeholder.
    pub fn rbind(primary: Column, others: Vec<Column>) -> Result<Column> {
        let new_nrows = primary.nrows() + others.iter().map(Column::nrows).sum::<usize>();
        let target = std::iter::once(&primary)
            .chain(others.iter())
            .map(Column::stype)
            .filter(|&t| t != SType::Void)
            .max();
        let Some(target) = target else {
            return Ok(Column::Void(new_nrows));
        };
        let self_is_empty = primary.stype() == SType::Void;
        let mut base = primary.cast(target)?;
        match &mut base {
            Column::Str(s) => s.rbind(others, new_nrows, self_is_empty)?,
            col => with_fixed!(col, c => c.rbind(others, new_nrows, self_is_empty)?, _ => {
                return Err(ColumnarError::precondition("rbind target must be materialized"));
            }),
        }
        Ok(base)
    }
}

fn cast_fixed<T: FwElement>(src: &dyn Any) -> FixedWidthColumn<T> {
    macro_rules! try_cast {
        ($($t:ty),*) => {
            $(
                if let Some(c) = src.downcast_ref::<FixedWidthColumn<$t>>() {
                    return FixedWidthColumn::<T>::cast_from(c);
                }
            )*
        };
    }
    try_cast!(Bool8, i8, i16, i32, i64, f32, f64);
    FixedWidthColumn::new_na(0)
}

impl<T: FwElement> From<FixedWidthColumn<T>> for Column {
    fn from(col: FixedWidthColumn<T>) -> Self {
        T::into_column(col)
    }
}

impl From<StringColumn> for Column {
    fn from(col: StringColumn) -> Self {
        Column::Str(col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_preserves_na() {
        let col: Column = FixedWidthColumn::<i32>::from_values(&[1, i32::NA, 3]).into();
        let cast = col.cast(SType::Float64).unwrap();
        let values = cast.as_fixed::<f64>().unwrap().to_vec();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 3.0);
    }

    #[test]
    fn test_cast_to_string() {
        let col: Column = FixedWidthColumn::<Bool8>::from_values(&[Bool8::TRUE, Bool8::NA]).into();
        let s = col.cast(SType::Str).unwrap();
        assert_eq!(s.as_str().unwrap().to_vec(), vec![Some("true".to_string()), None]);
    }

    #[test]
    fn test_unsupported_cast() {
        let col: Column = FixedWidthColumn::<ObjRef>::new(2).into();
        assert!(matches!(
            col.cast(SType::Int32),
            Err(ColumnarError::UnsupportedCast {
                from: SType::Obj,
                to: SType::Int32
            })
        ));
        let col: Column = StringColumn::new_na(1).into();
        assert!(col.cast(SType::Int64).is_err());
    }

    #[test]
    fn test_rbind_only_placeholders() {
        let out = Column::rbind(Column::Void(2), vec![Column::Void(3)]).unwrap();
        assert!(matches!(out, Column::Void(5)));
    }
}
