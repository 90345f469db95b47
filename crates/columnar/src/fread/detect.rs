//! Format and column type detection.
//!
//! Detection looks only at a sample of the input: the first lines decide the
//! separator, the quote rule and the field count, then up to 101 evenly
//! spaced jump points of 100 lines each decide the initial column types,
//! whether the first row is a header, and how many rows to allocate.

use super::chunk::{next_good_line_start, ChunkCoordinates, LineShape};
use super::columns::{ReaderColumn, ReaderColumns};
use super::options::{ColumnSelector, OverrideTarget, QuoteRule};
use super::parsers::{parse_widening, NaStrings, ParseType};
use super::reader::FreadReader;
use super::tokenizer::{detect_lf, line_number, line_snippet, Dialect, Line, Tokenizer};
use crate::error::{ColumnarError, Result};

/// Lines examined at every jump point.
const JUMPLINES: usize = 100;

/// Separator candidates, in order of preference.
const SEPARATORS: &[u8] = b",|;\t ";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A run of consecutive lines with the same field count.
#[derive(Debug, Clone, Copy)]
struct LineGroup {
    nfields: usize,
    nlines: usize,
    /// Running maximum of field counts up to and including this group.
    nmax: usize,
}

/// Counts fields on up to [`JUMPLINES`] lines from `start`. Returns `None` if
/// some line cannot be tokenized, otherwise the groups and the end position.
fn scan_groups(input: &[u8], dialect: Dialect, start: usize) -> Option<(Vec<LineGroup>, usize)> {
    let mut tok = Tokenizer::at(input, dialect, start);
    let mut groups: Vec<LineGroup> = Vec::new();
    let mut nmax = 0;
    let mut lines = 0;
    while !tok.is_eof() && lines < JUMPLINES {
        let n = tok.count_fields()?;
        lines += 1;
        nmax = nmax.max(n);
        match groups.last_mut() {
            Some(g) if g.nfields == n => {
                g.nlines += 1;
                g.nmax = nmax;
            }
            _ => groups.push(LineGroup {
                nfields: n,
                nlines: 1,
                nmax,
            }),
        }
    }
    Some((groups, tok.pos()))
}

#[derive(Debug, Clone, Copy)]
struct Winner {
    sep: u8,
    quote_rule: QuoteRule,
    nlines: usize,
    nfields: usize,
    nmax: usize,
}

fn is_blank_rest(input: &[u8]) -> bool {
    input.iter().all(u8::is_ascii_whitespace)
}

impl FreadReader<'_> {
    /// Resolves options that do not need the data: thread count, byte order
    /// mark, line endings and NA strings.
    pub(super) fn initialize(&mut self) {
        let available = rayon::current_num_threads().max(1);
        self.nthreads = self.opts.nthreads.unwrap_or(available).clamp(1, available);
        if self.input.starts_with(UTF8_BOM) {
            self.sof = UTF8_BOM.len();
            self.trace("UTF-8 byte order mark removed");
        }
        self.eof = self.input.len();
        self.dialect.lf_present = detect_lf(&self.input[self.sof..]);
        if !self.dialect.lf_present {
            self.trace("No \\n found before the first 100 \\r; lone \\r is a line ending");
        }
        self.dialect.quote = self.opts.quote;
        self.dialect.strip_white = self.opts.strip_white;
        self.na = NaStrings::new(&self.opts.na_strings, self.opts.numbers_may_be_nas);
        if self.na.numbers_may_be_nas() && !self.opts.numbers_may_be_nas {
            self.trace("An NA string is numeric; NA strings are checked before numbers");
        }
        self.max_nrows = self.opts.max_nrows.unwrap_or(usize::MAX);
        self.fill = self.opts.fill;
        self.header = self.opts.header;
        self.trace(&format!(
            "Using {} threads (requested {:?}, available {available})",
            self.nthreads, self.opts.nthreads
        ));
    }

    /// Returns true if the input holds nothing but whitespace.
    pub(super) fn is_empty_input(&self) -> bool {
        is_blank_rest(&self.input[self.sof..self.eof])
    }

    /// Picks the separator and quote rule that give the longest run of lines
    /// with a consistent field count, then moves the start of the data to the
    /// first line of that run.
    pub(super) fn detect_format(&mut self) -> Result<()> {
        let input = self.input;
        let data = &input[..self.eof];
        let seps: Vec<u8> = match self.opts.sep {
            Some(sep) => vec![sep],
            None => SEPARATORS.to_vec(),
        };
        let rules: Vec<QuoteRule> = match self.opts.quote_rule {
            Some(rule) => vec![rule],
            None => QuoteRule::ALL.to_vec(),
        };

        let mut best: Option<Winner> = None;
        let mut first_jump_end: Option<usize> = None;
        for &sep in &seps {
            for &rule in &rules {
                let dialect = Dialect {
                    sep: Some(sep),
                    quote_rule: rule,
                    ..self.dialect
                };
                let Some((groups, end)) = scan_groups(data, dialect, self.sof) else {
                    continue;
                };
                first_jump_end.get_or_insert(end);
                let mut updated = false;
                for (i, g) in groups.iter().enumerate() {
                    let followed_by_blank = groups.get(i + 1).map_or(true, |next| next.nfields == 0);
                    let (top_lines, top_fields, top_sep) = best.map_or((0, 1, None), |w| (w.nlines, w.nfields, Some(w.sep)));
                    let wins = g.nfields > 1
                        && (g.nlines > 1 || followed_by_blank)
                        && (g.nlines > top_lines
                            || (g.nlines == top_lines
                                && g.nfields > top_fields
                                && Some(sep) != top_sep
                                && sep != b' '));
                    if wins {
                        best = Some(Winner {
                            sep,
                            quote_rule: rule,
                            nlines: g.nlines,
                            nfields: g.nfields,
                            nmax: g.nmax,
                        });
                        first_jump_end = Some(end);
                        updated = true;
                    }
                }
                if updated {
                    if let Some(w) = best {
                        self.trace(&format!(
                            "  sep={:?} with {} lines of {} fields using quote rule {}",
                            char::from(w.sep),
                            w.nlines,
                            w.nfields,
                            w.quote_rule.code()
                        ));
                    }
                }
            }
        }

        let (ncols, nmax) = match best {
            Some(w) => {
                self.dialect.sep = Some(w.sep);
                self.dialect.quote_rule = w.quote_rule;
                (w.nfields, w.nmax)
            }
            None => {
                self.dialect.sep = None;
                let single = rules.iter().find_map(|&rule| {
                    let dialect = Dialect {
                        sep: None,
                        quote_rule: rule,
                        ..self.dialect
                    };
                    scan_groups(data, dialect, self.sof).map(|(_, end)| (rule, end))
                });
                let Some((rule, end)) = single else {
                    return Err(ColumnarError::ParseAmbiguity(format!(
                        "no separator and quote rule combination tokenizes the first {JUMPLINES} lines starting <<{}>>",
                        line_snippet(data, self.sof)
                    )));
                };
                self.dialect.quote_rule = rule;
                first_jump_end = Some(first_jump_end.unwrap_or(end));
                self.trace("  No separator yields a consistent field count; reading a single column");
                (1, 1)
            }
        };

        if self.dialect.sep == Some(b' ') && !self.fill {
            self.trace("  sep=' ' detected, setting fill to true");
            self.fill = true;
        }

        if self.fill {
            self.ncols = nmax.max(ncols);
        } else {
            self.ncols = ncols;
            let mut tok = Tokenizer::at(data, self.dialect, self.sof);
            let mut prev_start = None;
            let mut lines = 0;
            while !tok.is_eof() && lines < JUMPLINES {
                lines += 1;
                let line_start = tok.pos();
                match tok.count_fields() {
                    Some(n) if n == ncols => {
                        self.sof = line_start;
                        break;
                    }
                    Some(n) => prev_start = (n > 0).then_some((line_start, n)),
                    None => break,
                }
            }
            if let Some((prev, n)) = prev_start {
                if n > 1 && prev < self.sof {
                    let line = line_number(data, self.sof, self.dialect.lf_present);
                    self.warn(format!(
                        "Starting data input on line {line} <<{}>> with {ncols} fields and discarding line {} <<{}>> before it because it has a different number of fields ({n}).",
                        line_snippet(data, self.sof),
                        line - 1,
                        line_snippet(data, prev)
                    ));
                }
            }
        }
        self.first_jump_end = first_jump_end.unwrap_or(self.sof).max(self.sof);

        self.columns = ReaderColumns::new(
            (0..self.ncols)
                .map(|j| ReaderColumn::new(format!("V{}", j + 1)))
                .collect(),
        );
        self.trace(&format!(
            "  Detected {} columns on line {}; quote rule {}{}",
            self.ncols,
            line_number(data, self.sof, self.dialect.lf_present),
            self.dialect.quote_rule.code(),
            if self.fill { ", fill enabled" } else { "" }
        ));
        Ok(())
    }

    fn shape(&self) -> LineShape {
        LineShape {
            ncols: self.ncols,
            fill: self.fill,
            skip_blank_lines: self.opts.skip_blank_lines,
        }
    }

    /// Samples lines at evenly spaced jump points to choose initial column
    /// types, decide the header and estimate the row count. Also fixes the end
    /// of the data section at the last consistent line.
    pub(super) fn detect_types(&mut self) -> Result<()> {
        let input = self.input;
        let data = &input[..self.eof];
        let ncols = self.ncols;
        let shape = self.shape();
        let mut types = vec![ParseType::Bool; ncols];

        let jump0_size = self.first_jump_end - self.sof;
        let size = self.eof - self.sof;
        let mut njumps = 0;
        if jump0_size > 0 {
            if jump0_size * 200 < size {
                njumps = 100;
            } else if jump0_size * 20 < size {
                njumps = 10;
            }
        }
        njumps += 1;
        self.trace(&format!(
            "  Number of sampling jump points = {njumps} ({size} bytes, first jump {jump0_size} bytes)"
        ));

        let mut sample_lines = 0usize;
        let mut sum_len = 0.0f64;
        let mut sum_len_sq = 0.0f64;
        let mut min_len = usize::MAX;
        let mut max_len = 0usize;
        let mut last_row_end = self.sof;
        let mut row2_pending = false;
        let mut last_jump_ok = false;
        let mut tail = self.sof;

        for j in 0..njumps {
            let last = j + 1 == njumps;
            let mut start = if j == 0 {
                self.sof
            } else if last {
                self.eof.saturating_sub(jump0_size / 2)
            } else {
                self.sof + j * (size / (njumps - 1))
            };
            start = start.max(last_row_end);
            while matches!(data.get(start), Some(b'\n' | b'\r')) {
                start += 1;
            }
            if start >= self.eof {
                break;
            }
            if j > 0 {
                let mut cc = ChunkCoordinates {
                    start,
                    end: self.eof,
                    ..Default::default()
                };
                if !next_good_line_start(&mut cc, data, self.dialect, shape, self.eof) {
                    continue;
                }
                start = cc.start;
            }

            let mut tok = Tokenizer::at(data, self.dialect, start);
            let mut fields = Vec::with_capacity(ncols);
            let mut jline = 0;
            let mut skip = false;
            let mut bumped = false;
            while !tok.is_eof() && (jline < JUMPLINES || last) {
                let line_start = tok.pos();
                if is_blank_rest(&data[line_start..]) {
                    break;
                }
                let line = match tok.read_line(&mut fields) {
                    Some(line) => line,
                    None => {
                        let next_rule = self.dialect.quote_rule.next();
                        match next_rule {
                            Some(rule) if self.opts.quote_rule.is_none() => {
                                self.trace(&format!(
                                    "  Bumping quote rule from {} to {} due to line {} <<{}>>",
                                    self.dialect.quote_rule.code(),
                                    rule.code(),
                                    line_number(data, line_start, self.dialect.lf_present),
                                    line_snippet(data, line_start)
                                ));
                                self.dialect.quote_rule = rule;
                                tok = Tokenizer::at(data, self.dialect, line_start);
                                bumped = true;
                                continue;
                            }
                            _ if j == 0 => {
                                return Err(ColumnarError::parse(
                                    line_number(data, line_start, self.dialect.lf_present),
                                    format!("Unable to tokenize <<{}>>", line_snippet(data, line_start)),
                                ));
                            }
                            _ => {
                                skip = true;
                                break;
                            }
                        }
                    }
                };
                if line == Line::Blank && ncols > 1 {
                    if self.opts.skip_blank_lines {
                        continue;
                    }
                    if !self.fill {
                        break;
                    }
                    sample_lines += 1;
                    last_row_end = tok.pos();
                    continue;
                }
                jline += 1;
                let n = fields.len();
                if n < ncols && !self.fill && !(n == 0 && ncols == 1) {
                    return Err(ColumnarError::parse(
                        line_number(data, line_start, self.dialect.lf_present),
                        format!(
                            "Too few fields when detecting types; set fill to pad with NA. Expecting {ncols} fields but found {n}: <<{}>>",
                            line_snippet(data, line_start)
                        ),
                    ));
                }
                if n > ncols {
                    if j == 0 {
                        return Err(ColumnarError::parse(
                            line_number(data, line_start, self.dialect.lf_present),
                            format!(
                                "Line starting <<{}>> has more than the expected {ncols} fields",
                                line_snippet(data, line_start)
                            ),
                        ));
                    }
                    self.trace(&format!(
                        "  Not using sample from jump {j}; the true line start could not be established"
                    ));
                    skip = true;
                    break;
                }

                for (c, field) in fields.iter().enumerate() {
                    let mut name_was_string = false;
                    if row2_pending && self.header != Some(false) {
                        name_was_string = types[c] == ParseType::Str;
                        types[c] = ParseType::Bool;
                    }
                    let (t, _) = parse_widening(types[c], field, &self.na);
                    if t != types[c] {
                        types[c] = t;
                        bumped = true;
                    }
                    if self.header.is_none() && name_was_string && types[c] != ParseType::Str {
                        self.header = Some(true);
                        self.trace(&format!(
                            "  Header detected because column {} holds a string on row 1 and {} on row 2",
                            c + 1,
                            types[c]
                        ));
                    }
                }
                if row2_pending {
                    if self.header != Some(false) {
                        for t in types.iter_mut().skip(n) {
                            *t = ParseType::Bool;
                        }
                    }
                    row2_pending = false;
                } else if sample_lines == 0 {
                    row2_pending = true;
                }

                last_row_end = tok.pos();
                let len = last_row_end - line_start;
                sample_lines += 1;
                sum_len += len as f64;
                sum_len_sq += (len as f64).powi(2);
                min_len = min_len.min(len);
                max_len = max_len.max(len);
            }
            if skip {
                continue;
            }
            if last {
                last_jump_ok = true;
                tail = tok.pos();
            }
            if bumped || j == 0 || last {
                let printed: String = types
                    .iter()
                    .map(|t| match t {
                        ParseType::Bool => 'b',
                        ParseType::Int32 => 'i',
                        ParseType::Int64 => 'I',
                        ParseType::Float64 => 'F',
                        ParseType::Str => 's',
                    })
                    .collect();
                self.trace(&format!(
                    "  Type codes (jump {j:03}): {printed}  Quote rule {}",
                    self.dialect.quote_rule.code()
                ));
            }
        }

        if last_jump_ok {
            let rest = &data[tail.min(self.eof)..];
            if let Some(k) = rest.iter().position(|b| !b.is_ascii_whitespace()) {
                let at = tail + k;
                self.warn(format!(
                    "Found the last consistent line but text exists afterwards (discarded): <<{}>>",
                    line_snippet(data, at)
                ));
            }
        } else {
            last_row_end = self.eof;
        }
        self.eof = last_row_end;

        let header = match self.header {
            Some(h) => h,
            None => {
                let h = types.iter().all(|&t| t == ParseType::Str);
                self.trace(&format!(
                    "  Header detected to be {h} because {}",
                    if h {
                        "every column is of string type"
                    } else {
                        "some columns hold only non-string data, even in the first row"
                    }
                ));
                h
            }
        };
        self.header = Some(header);

        self.alloc_nrows = 1;
        if sample_lines <= 1 {
            if header {
                types.iter_mut().for_each(|t| *t = ParseType::Bool);
                self.alloc_nrows = 0;
            }
            self.mean_line_len = sum_len;
        } else {
            let bytes_read = (last_row_end - self.sof) as f64;
            let n = sample_lines as f64;
            self.mean_line_len = sum_len / n;
            let est = (bytes_read / self.mean_line_len).ceil().max(1.0);
            let sd = ((sum_len_sq - sum_len * sum_len / n) / (n - 1.0)).max(0.0).sqrt();
            let denom = (self.mean_line_len - 2.0 * sd).max(min_len as f64).max(1.0);
            let alloc = ((bytes_read / denom) as usize).max((1.1 * est) as usize);
            self.alloc_nrows = alloc.min((2.0 * est) as usize);
            self.trace(&format!(
                "  Sampled {sample_lines} rows at {njumps} jump points; line length mean={:.2} sd={sd:.2} min={min_len} max={max_len}; estimated {est} rows, allocating {}",
                self.mean_line_len, self.alloc_nrows
            ));
            if njumps == 1 {
                self.alloc_nrows = sample_lines - usize::from(header);
                self.trace(&format!(
                    "  All rows were sampled; the row count is exactly {}",
                    self.alloc_nrows
                ));
            }
        }
        if self.max_nrows < self.alloc_nrows {
            self.trace(&format!("  Allocation limited to max_nrows={}", self.max_nrows));
            self.alloc_nrows = self.max_nrows;
        }
        self.observer.lines_sampled = sample_lines;

        for (col, t) in self.columns.iter_mut().zip(types) {
            col.ptype = t;
        }
        Ok(())
    }

    /// Reads column names from the header row, if there is one, and moves
    /// the start of the data past it.
    pub(super) fn parse_column_names(&mut self) -> Result<()> {
        if self.header != Some(true) {
            return Ok(());
        }
        let input = self.input;
        let data = &input[..self.eof.max(self.sof)];
        let mut tok = Tokenizer::at(data, self.dialect, self.sof);
        let mut fields = Vec::new();
        if tok.read_line(&mut fields).is_none() {
            return Err(ColumnarError::parse(
                line_number(data, self.sof, self.dialect.lf_present),
                format!("Unable to tokenize the header <<{}>>", line_snippet(data, self.sof)),
            ));
        }
        let dialect = self.dialect;
        for (j, col) in self.columns.iter_mut().enumerate() {
            let name = fields
                .get(j)
                .map(|f| String::from_utf8_lossy(&f.text(&dialect)).into_owned())
                .unwrap_or_default();
            col.name = if name.is_empty() {
                format!("V{}", j + 1)
            } else {
                name
            };
        }
        self.sof = tok.pos();
        if self.eof < self.sof {
            self.eof = self.sof;
        }
        Ok(())
    }

    /// Applies the caller's type overrides and dropped columns.
    pub(super) fn apply_overrides(&mut self) -> Result<()> {
        let mut n_types = 0;
        let mut n_dropped = 0;
        let opts = self.opts;
        for ov in &opts.column_types {
            let j = match &ov.column {
                ColumnSelector::Index(i) if *i < self.columns.len() => *i,
                ColumnSelector::Name(name) => match self.columns.iter().position(|c| &c.name == name) {
                    Some(j) => j,
                    None => {
                        return Err(ColumnarError::precondition(format!(
                            "type override names unknown column \"{name}\""
                        )))
                    }
                },
                ColumnSelector::Index(i) => {
                    return Err(ColumnarError::precondition(format!(
                        "type override for column {} but the input has {} columns",
                        i + 1,
                        self.columns.len()
                    )))
                }
            };
            let line = line_number(self.input, self.sof, self.dialect.lf_present);
            let Some(col) = self.columns.iter_mut().nth(j) else {
                continue;
            };
            match ov.target {
                OverrideTarget::Drop => {
                    col.present_in_output = false;
                    col.present_in_buffer = false;
                    n_dropped += 1;
                }
                OverrideTarget::Type(t) if t < col.ptype => {
                    return Err(ColumnarError::parse(
                        line,
                        format!(
                            "Attempt to override column {} \"{}\" of inherent type '{}' down to '{}' which will lose accuracy. Only overrides to a wider type are permitted.",
                            j + 1,
                            col.name,
                            col.ptype,
                            t
                        ),
                    ));
                }
                OverrideTarget::Type(t) => {
                    if t != col.ptype {
                        n_types += 1;
                    }
                    col.ptype = t;
                }
            }
        }
        if n_types + n_dropped > 0 {
            let types = self.columns.print_types();
            self.trace(&format!(
                "  After {n_types} type and {n_dropped} drop user overrides: {types}"
            ));
        }
        Ok(())
    }
}
