//! Field and line scanner.

use super::options::QuoteRule;
use memchr::{memchr, memchr2, memchr3};
use std::borrow::Cow;

/// How the input is split into fields and lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dialect {
    /// `None` for single-column input, where a field runs to the line end.
    pub sep: Option<u8>,
    pub quote: u8,
    pub quote_rule: QuoteRule,
    pub strip_white: bool,
    /// When no `\n` exists in the input, a lone `\r` ends a line.
    pub lf_present: bool,
}

/// One field of a line. `raw` excludes surrounding quotes but still contains
/// any escape sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Field<'a> {
    pub raw: &'a [u8],
    pub quoted: bool,
    pub escaped: bool,
    /// Input offset where the field starts.
    pub start: usize,
}

impl<'a> Field<'a> {
    /// Field contents with escape sequences resolved.
    pub(crate) fn text(&self, dialect: &Dialect) -> Cow<'a, [u8]> {
        if !self.escaped {
            return Cow::Borrowed(self.raw);
        }
        let mut out = Vec::with_capacity(self.raw.len());
        let mut i = 0;
        while i < self.raw.len() {
            let b = self.raw[i];
            match dialect.quote_rule {
                QuoteRule::Doubled if b == dialect.quote && self.raw.get(i + 1) == Some(&b) => {
                    out.push(b);
                    i += 2;
                }
                QuoteRule::Escaped if b == b'\\' && i + 1 < self.raw.len() => {
                    out.push(self.raw[i + 1]);
                    i += 2;
                }
                _ => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        Cow::Owned(out)
    }
}

/// Outcome of reading one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line {
    /// An empty (or all-blank) line.
    Blank,
    /// A line with at least one field.
    Fields,
}

/// Cursor over the input.
#[derive(Debug, Clone)]
pub(crate) struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    pub dialect: Dialect,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(input: &'a [u8], dialect: Dialect) -> Self {
        Self {
            input,
            pos: 0,
            dialect,
        }
    }

    pub(crate) fn at(input: &'a [u8], dialect: Dialect, pos: usize) -> Self {
        Self { input, pos, dialect }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Length of the line ending at `pos`, or 0 if there is none.
    #[inline]
    pub(crate) fn eol_len(&self, pos: usize) -> usize {
        match self.input.get(pos) {
            Some(b'\n') => 1,
            Some(b'\r') => match self.input.get(pos + 1) {
                Some(b'\n') => 2,
                _ if !self.dialect.lf_present => 1,
                _ => 0,
            },
            _ => 0,
        }
    }

    pub(crate) fn at_eol(&self) -> bool {
        self.eol_len(self.pos) > 0
    }

    /// Consumes a line ending if present.
    pub(crate) fn skip_eol(&mut self) -> bool {
        let n = self.eol_len(self.pos);
        self.pos += n;
        n > 0
    }

    #[inline]
    fn is_white(&self, b: u8) -> bool {
        self.dialect.strip_white && (b == b' ' || b == b'\t') && Some(b) != self.dialect.sep
    }

    pub(crate) fn skip_white(&mut self) {
        while let Some(b) = self.peek() {
            if !self.is_white(b) {
                break;
            }
            self.pos += 1;
        }
    }

    fn at_sep(&self) -> bool {
        self.dialect.sep.is_some() && self.peek() == self.dialect.sep
    }

    fn at_field_end(&self) -> bool {
        self.is_eof() || self.at_sep() || self.at_eol()
    }

    /// Moves to the start of the next line, ignoring quoting.
    pub(crate) fn skip_to_next_line(&mut self) {
        while self.pos < self.input.len() {
            match memchr2(b'\n', b'\r', &self.input[self.pos..]) {
                Some(i) => {
                    self.pos += i;
                    if self.skip_eol() {
                        return;
                    }
                    self.pos += 1;
                }
                None => self.pos = self.input.len(),
            }
        }
    }

    /// Scans one field starting at the cursor. Leaves the cursor on the
    /// following separator, line end or end of input. Returns `None` if the
    /// field is malformed under the current quote rule.
    pub(crate) fn parse_field(&mut self) -> Option<Field<'a>> {
        let start = self.pos;
        let quote = self.dialect.quote;
        if self.dialect.quote_rule != QuoteRule::None && self.peek() == Some(quote) {
            let content_start = start + 1;
            let (content_end, escaped) = self.find_closing_quote(content_start)?;
            self.pos = content_end + 1;
            self.skip_white();
            if !self.at_field_end() {
                return None;
            }
            return Some(Field {
                raw: &self.input[content_start..content_end],
                quoted: true,
                escaped,
                start,
            });
        }

        let mut p = start;
        loop {
            let rest = &self.input[p..];
            let hit = match self.dialect.sep {
                Some(sep) => memchr3(sep, b'\n', b'\r', rest),
                None => memchr2(b'\n', b'\r', rest),
            };
            match hit {
                None => {
                    p = self.input.len();
                    break;
                }
                Some(i) => {
                    p += i;
                    if self.input[p] == b'\r' && self.eol_len(p) == 0 {
                        p += 1;
                        continue;
                    }
                    break;
                }
            }
        }
        self.pos = p;
        let mut end = p;
        while end > start && self.is_white(self.input[end - 1]) {
            end -= 1;
        }
        Some(Field {
            raw: &self.input[start..end],
            quoted: false,
            escaped: false,
            start,
        })
    }

    /// Finds the quote that closes a field whose contents begin at `from`.
    fn find_closing_quote(&self, from: usize) -> Option<(usize, bool)> {
        let quote = self.dialect.quote;
        let input = self.input;
        let mut p = from;
        let mut escaped = false;
        match self.dialect.quote_rule {
            QuoteRule::Doubled => loop {
                p += memchr(quote, &input[p..])?;
                if input.get(p + 1) == Some(&quote) {
                    p += 2;
                    escaped = true;
                    continue;
                }
                return Some((p, escaped));
            },
            QuoteRule::Escaped => loop {
                p += memchr2(quote, b'\\', &input[p..])?;
                if input[p] == b'\\' {
                    if p + 1 >= input.len() {
                        return None;
                    }
                    p += 2;
                    escaped = true;
                    continue;
                }
                return Some((p, escaped));
            },
            QuoteRule::Verbatim => loop {
                p += memchr3(quote, b'\n', b'\r', &input[p..])?;
                if input[p] != quote {
                    if self.eol_len(p) > 0 {
                        return None;
                    }
                    p += 1;
                    continue;
                }
                let mut k = p + 1;
                while k < input.len() && self.is_white(input[k]) {
                    k += 1;
                }
                if k >= input.len() || Some(input[k]) == self.dialect.sep || self.eol_len(k) > 0 {
                    return Some((p, false));
                }
                p += 1;
            },
            QuoteRule::None => None,
        }
    }

    /// Consumes a separator. Returns false when the line turns out to end
    /// here (trailing spaces with a space separator); the line ending is
    /// consumed in that case.
    fn skip_sep(&mut self) -> bool {
        self.pos += 1;
        if self.dialect.sep == Some(b' ') {
            while self.peek() == Some(b' ') {
                self.pos += 1;
            }
            if self.is_eof() || self.skip_eol() {
                return false;
            }
        }
        true
    }

    fn skip_line_start(&mut self) {
        if self.dialect.sep == Some(b' ') {
            while self.peek() == Some(b' ') {
                self.pos += 1;
            }
        }
        self.skip_white();
    }

    /// Reads one line into `out` (cleared first) and consumes its line ending.
    /// Returns `None` if some field cannot be tokenized.
    pub(crate) fn read_line(&mut self, out: &mut Vec<Field<'a>>) -> Option<Line> {
        out.clear();
        self.skip_line_start();
        if self.is_eof() {
            return Some(Line::Blank);
        }
        if self.skip_eol() {
            return Some(Line::Blank);
        }
        loop {
            self.skip_white();
            let field = self.parse_field()?;
            out.push(field);
            if self.at_sep() {
                if !self.skip_sep() {
                    break;
                }
                continue;
            }
            if self.is_eof() || self.skip_eol() {
                break;
            }
            return None;
        }
        Some(Line::Fields)
    }

    /// Counts the fields of the current line and moves to the next one.
    /// Returns 0 for a blank line and `None` if the line cannot be tokenized.
    pub(crate) fn count_fields(&mut self) -> Option<usize> {
        self.skip_line_start();
        if self.is_eof() || self.skip_eol() {
            return Some(0);
        }
        let mut n = 0;
        loop {
            self.skip_white();
            self.parse_field()?;
            n += 1;
            if self.at_sep() {
                if !self.skip_sep() {
                    break;
                }
                continue;
            }
            if self.is_eof() || self.skip_eol() {
                break;
            }
            return None;
        }
        Some(n)
    }
}

/// 1-based number of the line containing `offset`.
pub(crate) fn line_number(input: &[u8], offset: usize, lf_present: bool) -> usize {
    let eol = if lf_present { b'\n' } else { b'\r' };
    1 + memchr::memchr_iter(eol, &input[..offset.min(input.len())]).count()
}

/// Text of the line starting at `start`, without its line ending, cut to at
/// most 100 bytes for use in messages.
pub(crate) fn line_snippet(input: &[u8], start: usize) -> String {
    let start = start.min(input.len());
    let rest = &input[start..];
    let end = memchr2(b'\n', b'\r', rest).unwrap_or(rest.len()).min(100);
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

/// Returns true if a `\n` occurs before the first 100 `\r` characters.
pub(crate) fn detect_lf(input: &[u8]) -> bool {
    let mut cr = 0;
    for &b in input {
        match b {
            b'\n' => return true,
            b'\r' => {
                cr += 1;
                if cr >= 100 {
                    return false;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect(sep: u8, quote_rule: QuoteRule) -> Dialect {
        Dialect {
            sep: Some(sep),
            quote: b'"',
            quote_rule,
            strip_white: true,
            lf_present: true,
        }
    }

    fn fields(input: &[u8], d: Dialect) -> Option<Vec<Vec<u8>>> {
        let mut tok = Tokenizer::new(input, d);
        let mut out = Vec::new();
        tok.read_line(&mut out)?;
        Some(out.iter().map(|f| f.text(&d).into_owned()).collect())
    }

    #[test]
    fn test_doubled_quotes() {
        let d = dialect(b',', QuoteRule::Doubled);
        let got = fields(b"a,\"b \"\"x\"\", c\",d\n", d).unwrap();
        assert_eq!(got, vec![b"a".to_vec(), b"b \"x\", c".to_vec(), b"d".to_vec()]);
        assert!(fields(b"\"a\"b,c\n", d).is_none());
    }

    #[test]
    fn test_escaped_quotes() {
        let d = dialect(b',', QuoteRule::Escaped);
        let got = fields(b"\"a \\\"q\\\"\",b\n", d).unwrap();
        assert_eq!(got, vec![b"a \"q\"".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_verbatim_quotes() {
        let d = dialect(b',', QuoteRule::Verbatim);
        let got = fields(b"\"say \"hi\"\",x\n", d).unwrap();
        assert_eq!(got, vec![b"say \"hi\"".to_vec(), b"x".to_vec()]);
        assert!(fields(b"\"multi\nline\",x\n", d).is_none());
    }

    #[test]
    fn test_no_quoting() {
        let d = dialect(b',', QuoteRule::None);
        let got = fields(b"\"a,b\"\n", d).unwrap();
        assert_eq!(got, vec![b"\"a".to_vec(), b"b\"".to_vec()]);
    }

    #[test]
    fn test_quoted_newline_and_crlf() {
        let d = dialect(b',', QuoteRule::Doubled);
        let mut tok = Tokenizer::new(b"\"x\ny\",1\r\n2,3", d);
        assert_eq!(tok.count_fields(), Some(2));
        assert_eq!(tok.count_fields(), Some(2));
        assert!(tok.is_eof());
    }

    #[test]
    fn test_space_separator_collapses() {
        let d = dialect(b' ', QuoteRule::Doubled);
        let mut tok = Tokenizer::new(b"  a   b  c   \nd e f\n", d);
        assert_eq!(tok.count_fields(), Some(3));
        assert_eq!(tok.count_fields(), Some(3));
        assert_eq!(tok.count_fields(), Some(0));
    }

    #[test]
    fn test_white_stripping_and_empty_fields() {
        let d = dialect(b',', QuoteRule::Doubled);
        let got = fields(b" a ,, b\t\n", d).unwrap();
        assert_eq!(got, vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]);
    }

    #[test]
    fn test_lone_cr_line_endings() {
        assert!(!detect_lf(b"a,b\r1,2\r"));
        assert!(detect_lf(b"a,b\r\n1,2\r\n"));
        let mut d = dialect(b',', QuoteRule::Doubled);
        d.lf_present = false;
        let mut tok = Tokenizer::new(b"a,b\r1,2\r", d);
        assert_eq!(tok.count_fields(), Some(2));
        assert_eq!(tok.count_fields(), Some(2));
        assert!(tok.is_eof());
    }

    #[test]
    fn test_line_numbers_and_snippets() {
        let input = b"a,b\n1,2\n3,4\n";
        assert_eq!(line_number(input, 0, true), 1);
        assert_eq!(line_number(input, 4, true), 2);
        assert_eq!(line_number(input, 9, true), 3);
        assert_eq!(line_number(b"a\rb\rc", 4, false), 3);
        assert_eq!(line_snippet(input, 4), "1,2");
        assert_eq!(line_snippet(input, input.len()), "");
    }

    #[test]
    fn test_single_column_mode() {
        let d = Dialect {
            sep: None,
            ..dialect(b',', QuoteRule::Doubled)
        };
        let got = fields(b"a,b;c\n", d).unwrap();
        assert_eq!(got, vec![b"a,b;c".to_vec()]);
    }
}
