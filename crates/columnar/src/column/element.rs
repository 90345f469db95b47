//! Element types storable in a fixed-width column.
//!
//! Each element type defines its NA sentinel and two capability hooks,
//! [`FwElement::on_value_replicated`] and [`FwElement::on_value_overwritten`],
//! which the generic column code calls whenever a value gains or loses a slot.
//! The hooks are no-ops for numeric types; [`ObjRef`] uses them to keep the
//! external reference counts of the objects it points to exact.

use super::{Column, FixedWidthColumn};
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Storage type tag of a column.
///
/// Numeric variants are ordered from narrowest to widest; row-binding picks the
/// widest type among its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SType {
    /// Placeholder column with no materialized data.
    Void,
    /// Boolean stored as one byte (0, 1 or NA).
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Variable-width UTF-8 string.
    Str,
    /// Reference to an externally owned object.
    Obj,
}

impl SType {
    /// Width of one element in bytes, or 0 for types without fixed width.
    pub fn elemsize(self) -> usize {
        match self {
            Self::Void | Self::Str => 0,
            Self::Bool | Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
            Self::Obj => std::mem::size_of::<ObjRef>(),
        }
    }

    /// True for boolean, integer and float types.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Float32
                | Self::Float64
        )
    }

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool8",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Str => "str",
            Self::Obj => "obj",
        }
    }
}

impl fmt::Display for SType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Intermediate value used when casting between numeric element types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wide {
    /// Missing value.
    Na,
    /// Any integer or boolean value.
    Int(i64),
    /// Any floating-point value.
    Float(f64),
}

/// A fixed-width value that can live in a column buffer.
///
/// # Safety
///
/// Implementors must be plain data: every bit pattern (in particular all
/// zeroes) is a valid value, the alignment is at most 8 bytes, and there is no
/// drop glue. Column buffers reinterpret raw bytes as `Self`.
pub unsafe trait FwElement: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Storage type tag.
    const STYPE: SType;
    /// The NA sentinel.
    const NA: Self;
    /// True if values carry an external reference count.
    const REFCOUNTED: bool = false;

    /// Returns true if this value is the NA sentinel.
    fn is_na(self) -> bool;

    /// Called when `count` new copies of this value are written into a column.
    #[inline]
    fn on_value_replicated(self, _count: usize) {}

    /// Called when a slot holding this value is overwritten or discarded.
    #[inline]
    fn on_value_overwritten(self) {}

    /// Converts to the cast intermediate.
    fn to_wide(self) -> Wide;

    /// Converts from the cast intermediate; out-of-range values become NA.
    fn from_wide(value: Wide) -> Self;

    /// Wraps a typed column into the dynamic [`Column`] enum.
    fn into_column(col: FixedWidthColumn<Self>) -> Column;

    /// Extracts a typed column, handing the input back if the variant differs.
    fn from_column(col: Column) -> Result<FixedWidthColumn<Self>, Column>;
}

macro_rules! int_element {
    ($t:ty, $variant:ident) => {
        // SAFETY: primitive integers are plain data.
        unsafe impl FwElement for $t {
            const STYPE: SType = SType::$variant;
            const NA: Self = <$t>::MIN;

            #[inline]
            fn is_na(self) -> bool {
                self == <$t>::MIN
            }

            fn to_wide(self) -> Wide {
                if self.is_na() {
                    Wide::Na
                } else {
                    Wide::Int(self as i64)
                }
            }

            fn from_wide(value: Wide) -> Self {
                match value {
                    Wide::Int(v) => <$t>::try_from(v).unwrap_or(Self::NA),
                    Wide::Float(f)
                        if f.is_finite() && f > <$t>::MIN as f64 && f <= <$t>::MAX as f64 =>
                    {
                        f as $t
                    }
                    _ => Self::NA,
                }
            }

            fn into_column(col: FixedWidthColumn<Self>) -> Column {
                Column::$variant(col)
            }

            fn from_column(col: Column) -> Result<FixedWidthColumn<Self>, Column> {
                match col {
                    Column::$variant(c) => Ok(c),
                    other => Err(other),
                }
            }
        }
    };
}

macro_rules! float_element {
    ($t:ty, $variant:ident) => {
        // SAFETY: primitive floats are plain data.
        unsafe impl FwElement for $t {
            const STYPE: SType = SType::$variant;
            const NA: Self = <$t>::NAN;

            #[inline]
            fn is_na(self) -> bool {
                self.is_nan()
            }

            fn to_wide(self) -> Wide {
                if self.is_na() {
                    Wide::Na
                } else {
                    Wide::Float(self as f64)
                }
            }

            fn from_wide(value: Wide) -> Self {
                match value {
                    Wide::Int(v) => v as $t,
                    Wide::Float(f) => f as $t,
                    Wide::Na => Self::NA,
                }
            }

            fn into_column(col: FixedWidthColumn<Self>) -> Column {
                Column::$variant(col)
            }

            fn from_column(col: Column) -> Result<FixedWidthColumn<Self>, Column> {
                match col {
                    Column::$variant(c) => Ok(c),
                    other => Err(other),
                }
            }
        }
    };
}

int_element!(i8, Int8);
int_element!(i16, Int16);
int_element!(i32, Int32);
int_element!(i64, Int64);
float_element!(f32, Float32);
float_element!(f64, Float64);

/// One-byte boolean with an NA state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Bool8(pub i8);

impl Bool8 {
    /// False.
    pub const FALSE: Self = Self(0);
    /// True.
    pub const TRUE: Self = Self(1);

    /// Returns the boolean value, or `None` for NA.
    pub fn get(self) -> Option<bool> {
        match self.0 {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }
}

impl From<bool> for Bool8 {
    fn from(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }
}

impl fmt::Debug for Bool8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("NA"),
        }
    }
}

// SAFETY: transparent wrapper around `i8`.
unsafe impl FwElement for Bool8 {
    const STYPE: SType = SType::Bool;
    const NA: Self = Self(i8::MIN);

    #[inline]
    fn is_na(self) -> bool {
        self.0 == i8::MIN
    }

    fn to_wide(self) -> Wide {
        match self.get() {
            Some(v) => Wide::Int(v as i64),
            None => Wide::Na,
        }
    }

    fn from_wide(value: Wide) -> Self {
        match value {
            Wide::Int(v) => Self::from(v != 0),
            Wide::Float(f) => Self::from(f != 0.0),
            Wide::Na => Self::NA,
        }
    }

    fn into_column(col: FixedWidthColumn<Self>) -> Column {
        Column::Bool(col)
    }

    fn from_column(col: Column) -> Result<FixedWidthColumn<Self>, Column> {
        match col {
            Column::Bool(c) => Ok(c),
            other => Err(other),
        }
    }
}

/// An object owned outside the column engine and shared by reference.
pub struct ExternalObject {
    value: Box<dyn Any + Send + Sync>,
}

impl ExternalObject {
    /// Wraps `value` into a shareable object handle.
    pub fn new<T: Any + Send + Sync>(value: T) -> Arc<Self> {
        Arc::new(Self {
            value: Box::new(value),
        })
    }

    /// Returns the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ExternalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalObject").finish_non_exhaustive()
    }
}

/// A counted reference to an [`ExternalObject`], stored as a raw pointer.
///
/// Every slot of an object column holding a non-null `ObjRef` owns one strong
/// count of the referenced `Arc`. The column releases those counts when values
/// are overwritten, resized away, or when the column is dropped.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ObjRef(Option<NonNull<ExternalObject>>);

// SAFETY: `ExternalObject` is `Send + Sync`, and counts are adjusted atomically.
unsafe impl Send for ObjRef {}
// SAFETY: see above.
unsafe impl Sync for ObjRef {}

impl ObjRef {
    /// The null reference, used as NA.
    pub const NULL: Self = Self(None);

    /// Creates a reference to the object behind `obj` without taking a count.
    ///
    /// # Safety
    ///
    /// The object must stay alive (through `obj` or another handle) until the
    /// reference has been written into a column, which then holds its own count.
    pub unsafe fn from_arc(obj: &Arc<ExternalObject>) -> Self {
        Self(NonNull::new(Arc::as_ptr(obj) as *mut ExternalObject))
    }

    /// Returns true for the null reference.
    pub fn is_null(self) -> bool {
        self.0.is_none()
    }

    /// Raw pointer to the referenced object (null for NA).
    pub fn as_ptr(self) -> *const ExternalObject {
        self.0
            .map_or(std::ptr::null(), |p| p.as_ptr() as *const ExternalObject)
    }

    /// Produces a new owned handle.
    ///
    /// # Safety
    ///
    /// The reference must currently be backed by at least one live count.
    pub(crate) unsafe fn to_arc(self) -> Option<Arc<ExternalObject>> {
        self.0.map(|p| {
            Arc::increment_strong_count(p.as_ptr());
            Arc::from_raw(p.as_ptr())
        })
    }
}

impl Default for ObjRef {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(p) => write!(f, "ObjRef({:p})", p.as_ptr()),
            None => f.write_str("ObjRef(NA)"),
        }
    }
}

// SAFETY: an `Option<NonNull<_>>` is a nullable pointer; all-zero is `None`.
unsafe impl FwElement for ObjRef {
    const STYPE: SType = SType::Obj;
    const NA: Self = Self::NULL;
    const REFCOUNTED: bool = true;

    #[inline]
    fn is_na(self) -> bool {
        self.is_null()
    }

    fn on_value_replicated(self, count: usize) {
        if let Some(p) = self.0 {
            for _ in 0..count {
                // SAFETY: a reference only reaches a column slot while a live
                // count keeps the object alive.
                unsafe { Arc::increment_strong_count(p.as_ptr()) };
            }
        }
    }

    fn on_value_overwritten(self) {
        if let Some(p) = self.0 {
            // SAFETY: the slot being discarded owned exactly one count.
            unsafe { Arc::decrement_strong_count(p.as_ptr()) };
        }
    }

    fn to_wide(self) -> Wide {
        Wide::Na
    }

    fn from_wide(_value: Wide) -> Self {
        Self::NULL
    }

    fn into_column(col: FixedWidthColumn<Self>) -> Column {
        Column::Obj(col)
    }

    fn from_column(col: Column) -> Result<FixedWidthColumn<Self>, Column> {
        match col {
            Column::Obj(c) => Ok(c),
            other => Err(other),
        }
    }
}
