//! Reader configuration.

use super::parsers::ParseType;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Default quote character.
pub const DEFAULT_QUOTE: u8 = b'"';

/// Default strings read as NA.
pub const DEFAULT_NA_STRINGS: &[&str] = &["NA"];

/// How quoted fields and embedded quotes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuoteRule {
    /// Fields may be quoted; embedded quotes are doubled (`"a ""b"""`).
    Doubled = 0,
    /// Fields may be quoted; embedded quotes are backslash-escaped (`"a \"b\""`).
    Escaped = 1,
    /// Fields may be quoted; embedded quotes appear verbatim and a quote ends
    /// the field only when followed by a separator or line end. Line breaks
    /// cannot appear inside such fields.
    Verbatim = 2,
    /// No quoting; quote characters are ordinary data.
    None = 3,
}

impl QuoteRule {
    /// All rules, in order of preference.
    pub const ALL: [QuoteRule; 4] = [Self::Doubled, Self::Escaped, Self::Verbatim, Self::None];

    /// Numeric code of the rule (0 to 3).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The next less strict rule.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Doubled => Some(Self::Escaped),
            Self::Escaped => Some(Self::Verbatim),
            Self::Verbatim => Some(Self::None),
            Self::None => None,
        }
    }
}

/// Identifies a column by position or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// Zero-based column position.
    Index(usize),
    /// Column name (after header detection).
    Name(String),
}

/// What to do with a selected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTarget {
    /// Read the column as the given type. Only widening is allowed.
    Type(ParseType),
    /// Leave the column out of the result.
    Drop,
}

/// A user override of a detected column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypeOverride {
    /// The column to override.
    pub column: ColumnSelector,
    /// The requested treatment.
    pub target: OverrideTarget,
}

impl ColumnTypeOverride {
    /// Reads column `index` as `ptype`.
    pub fn index(index: usize, ptype: ParseType) -> Self {
        Self {
            column: ColumnSelector::Index(index),
            target: OverrideTarget::Type(ptype),
        }
    }

    /// Reads the column called `name` as `ptype`.
    pub fn name(name: impl Into<String>, ptype: ParseType) -> Self {
        Self {
            column: ColumnSelector::Name(name.into()),
            target: OverrideTarget::Type(ptype),
        }
    }

    /// Drops the column selected by `column`.
    pub fn drop(column: ColumnSelector) -> Self {
        Self {
            column,
            target: OverrideTarget::Drop,
        }
    }
}

/// Caller-supplied sink for progress and diagnostic messages.
pub trait Logger: Send + Sync {
    /// Receives one trace line. Only called when `verbose` is set.
    fn log(&self, message: &str);

    /// Receives one warning. Called regardless of `verbose`.
    fn warn(&self, message: &str) {
        self.log(message);
    }
}

/// Options for [`crate::fread::fread`].
#[derive(Clone)]
pub struct ReadOptions {
    /// Field separator; detected among `,` `|` `;` `\t` and space when `None`.
    pub sep: Option<u8>,
    /// Quote character.
    pub quote: u8,
    /// Quoting convention; detected when `None`.
    pub quote_rule: Option<QuoteRule>,
    /// Whether the first row holds column names; detected when `None`.
    pub header: Option<bool>,
    /// Unquoted field values read as NA in every column.
    pub na_strings: Vec<String>,
    /// Check NA strings before numeric parsing. Enabled automatically when any
    /// NA string is itself a number.
    pub numbers_may_be_nas: bool,
    /// Ignore empty lines instead of reading them as NA rows.
    pub skip_blank_lines: bool,
    /// Pad lines with too few fields with NA.
    pub fill: bool,
    /// Strip unquoted spaces and tabs around fields.
    pub strip_white: bool,
    /// Maximum number of data rows to read.
    pub max_nrows: Option<usize>,
    /// Type overrides and dropped columns.
    pub column_types: Vec<ColumnTypeOverride>,
    /// Worker thread count; the current rayon pool size when `None`.
    pub nthreads: Option<usize>,
    /// Target chunk size in bytes; chosen from the line length when `None`.
    pub chunk_size: Option<usize>,
    /// Forward trace messages and the final report to `logger`.
    pub verbose: bool,
    /// Message sink.
    pub logger: Option<Arc<dyn Logger>>,
    /// Once set, no further chunks are started and the read fails with
    /// [`crate::ColumnarError::Cancelled`].
    pub abort: Option<Arc<AtomicBool>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sep: None,
            quote: DEFAULT_QUOTE,
            quote_rule: None,
            header: None,
            na_strings: DEFAULT_NA_STRINGS.iter().map(|s| s.to_string()).collect(),
            numbers_may_be_nas: false,
            skip_blank_lines: false,
            fill: false,
            strip_white: true,
            max_nrows: None,
            column_types: Vec::new(),
            nthreads: None,
            chunk_size: None,
            verbose: false,
            logger: None,
            abort: None,
        }
    }
}

impl ReadOptions {
    /// Creates options with an explicit separator and header setting.
    pub fn new(sep: Option<u8>, header: Option<bool>) -> Self {
        Self {
            sep,
            header,
            ..Self::default()
        }
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("sep", &self.sep.map(char::from))
            .field("quote", &char::from(self.quote))
            .field("quote_rule", &self.quote_rule)
            .field("header", &self.header)
            .field("na_strings", &self.na_strings)
            .field("numbers_may_be_nas", &self.numbers_may_be_nas)
            .field("skip_blank_lines", &self.skip_blank_lines)
            .field("fill", &self.fill)
            .field("strip_white", &self.strip_white)
            .field("max_nrows", &self.max_nrows)
            .field("column_types", &self.column_types)
            .field("nthreads", &self.nthreads)
            .field("chunk_size", &self.chunk_size)
            .field("verbose", &self.verbose)
            .field("logger", &self.logger.is_some())
            .field("abort", &self.abort.is_some())
            .finish()
    }
}
