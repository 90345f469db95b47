//! Field value parsers and the column type ladder.

use super::tokenizer::Field;
use crate::column::SType;
use std::fmt;

/// Column types the reader can infer, from narrowest to widest.
///
/// Every field that fits a type also fits [`ParseType::Str`]; numeric types
/// nest (`Int32` inside `Int64` inside `Float64`), but booleans written as
/// words do not fit any numeric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParseType {
    /// `0`, `1`, `true`, `false`, `True`, `False`, `TRUE`, `FALSE`.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// Any text.
    Str,
}

impl ParseType {
    /// Display name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool8",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float64 => "Float64",
            Self::Str => "Str",
        }
    }

    /// Storage type of the resulting column.
    pub fn stype(self) -> SType {
        match self {
            Self::Bool => SType::Bool,
            Self::Int32 => SType::Int32,
            Self::Int64 => SType::Int64,
            Self::Float64 => SType::Float64,
            Self::Str => SType::Str,
        }
    }

    /// Next wider type.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Bool => Some(Self::Int32),
            Self::Int32 => Some(Self::Int64),
            Self::Int64 => Some(Self::Float64),
            Self::Float64 => Some(Self::Str),
            Self::Str => None,
        }
    }
}

impl fmt::Display for ParseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed field value; the variant matches the type it was parsed as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Na,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Str,
}

/// NA string matching.
#[derive(Debug, Clone, Default)]
pub(crate) struct NaStrings {
    strings: Vec<Vec<u8>>,
    numbers_may_be_nas: bool,
}

impl NaStrings {
    pub(crate) fn new(strings: &[String], numbers_may_be_nas: bool) -> Self {
        let numeric = strings.iter().any(|s| parse_f64(s.as_bytes()).is_some());
        Self {
            strings: strings.iter().map(|s| s.as_bytes().to_vec()).collect(),
            numbers_may_be_nas: numbers_may_be_nas || numeric,
        }
    }

    pub(crate) fn numbers_may_be_nas(&self) -> bool {
        self.numbers_may_be_nas
    }

    fn matches(&self, field: &Field<'_>) -> bool {
        !field.quoted && self.strings.iter().any(|s| s.as_slice() == field.raw)
    }
}

pub(crate) fn parse_bool(s: &[u8]) -> Option<bool> {
    match s {
        b"1" | b"true" | b"True" | b"TRUE" => Some(true),
        b"0" | b"false" | b"False" | b"FALSE" => Some(false),
        _ => None,
    }
}

/// Parses an optionally signed decimal integer. The NA sentinel `i64::MIN`
/// is rejected.
pub(crate) fn parse_i64(s: &[u8]) -> Option<i64> {
    let (negative, digits) = match s.first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() {
        return None;
    }
    let mut acc: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        acc = acc.checked_mul(10)?.checked_add((b - b'0') as i64)?;
    }
    Some(if negative { -acc } else { acc })
}

pub(crate) fn parse_i32(s: &[u8]) -> Option<i32> {
    i32::try_from(parse_i64(s)?)
        .ok()
        .filter(|&v| v != i32::MIN)
}

pub(crate) fn parse_f64(s: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(s).ok()?;
    let first = *s.first()?;
    // Reject forms such as "inf" or "nan" that do not start like a number.
    if !(first.is_ascii_digit() || matches!(first, b'-' | b'+' | b'.')) {
        return match text {
            "NaN" | "Inf" | "inf" => text.parse().ok(),
            _ => None,
        };
    }
    text.parse().ok()
}

/// Parses `field` as `ptype`. Returns `None` if the value does not fit.
pub(crate) fn parse_field(ptype: ParseType, field: &Field<'_>, na: &NaStrings) -> Option<Value> {
    if !field.quoted && field.raw.is_empty() {
        return Some(Value::Na);
    }
    if (na.numbers_may_be_nas || ptype == ParseType::Str) && na.matches(field) {
        return Some(Value::Na);
    }
    let text = field.raw;
    let parsed = match ptype {
        ParseType::Bool => parse_bool(text).map(Value::Bool),
        ParseType::Int32 => parse_i32(text).map(Value::Int32),
        ParseType::Int64 => parse_i64(text).map(Value::Int64),
        ParseType::Float64 => parse_f64(text).map(Value::Float64),
        ParseType::Str => Some(Value::Str),
    };
    parsed.or_else(|| na.matches(field).then_some(Value::Na))
}

/// Parses `field` starting at `ptype`, widening until it fits.
pub(crate) fn parse_widening(ptype: ParseType, field: &Field<'_>, na: &NaStrings) -> (ParseType, Value) {
    let mut t = ptype;
    loop {
        if let Some(v) = parse_field(t, field, na) {
            return (t, v);
        }
        match t.next() {
            Some(next) => t = next,
            None => return (ParseType::Str, Value::Str),
        }
    }
}
