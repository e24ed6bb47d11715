//! Balanced-delimiter scanner for TypeScript-flavored corpus text.
//!
//! Tracks escape state, quoted strings, template literals with `${...}`
//! interpolation and block/line comments, so callers never have to
//! first-match a delimiter with a regex.
//!
//! Notes
//! - All offsets are byte offsets; only ASCII bytes are ever compared, so
//!   UTF-8 continuation bytes can never be mistaken for a delimiter.
//! - Template literals come in two flavors. `Strict` closes on the first
//!   unescaped backtick (real TypeScript). `Lenient` only closes on a
//!   backtick that is structurally followed by the end of an entry, which
//!   keeps example code with raw backticks inside one field value. The
//!   entry's layout (key column, indent of the enclosing object) decides
//!   what counts as "the next entry" when the follower sits on a later
//!   line.

use crate::core::error::{LexError, ParseFault};

/// Where an entry sits, used to judge lenient closers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLayout {
    pub key_column: usize,
    /// The key is the first token on its line
    pub own_line: bool,
    /// Indent of the line holding the enclosing object's '{'
    pub object_indent: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMode {
    Strict,
    Lenient(EntryLayout),
}

#[derive(Debug, Clone, Copy)]
pub struct Lexer<'a> {
    bytes: &'a [u8],
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn byte(&self, pos: usize) -> Option<u8> {
        self.bytes.get(pos).copied()
    }

    /// Skip whitespace and comments. Errors only on an unterminated `/*`.
    pub fn skip_trivia(&self, mut pos: usize) -> Result<usize, LexError> {
        loop {
            match self.byte(pos) {
                Some(b) if b.is_ascii_whitespace() => pos += 1,
                Some(b'/') if self.byte(pos + 1) == Some(b'/') => {
                    pos = self.line_end(pos);
                }
                Some(b'/') if self.byte(pos + 1) == Some(b'*') => {
                    pos = self.skip_block_comment(pos)?;
                }
                _ => return Ok(pos),
            }
        }
    }

    /// Skip spaces and tabs only.
    pub fn skip_inline_space(&self, mut pos: usize) -> usize {
        while matches!(self.byte(pos), Some(b' ' | b'\t')) {
            pos += 1;
        }
        pos
    }

    /// Offset of the next '\n' at or after `pos` (or EOF).
    pub fn line_end(&self, pos: usize) -> usize {
        match memchr::memchr(b'\n', &self.bytes[pos.min(self.len())..]) {
            Some(off) => pos + off,
            None => self.len(),
        }
    }

    /// Offset just past the newline sequence at `pos`, if there is one.
    pub fn past_newline(&self, pos: usize) -> Option<usize> {
        match (self.byte(pos), self.byte(pos + 1)) {
            (Some(b'\r'), Some(b'\n')) => Some(pos + 2),
            (Some(b'\n'), _) => Some(pos + 1),
            _ => None,
        }
    }

    fn line_start(&self, pos: usize) -> usize {
        let end = pos.min(self.len());
        memchr::memrchr(b'\n', &self.bytes[..end]).map_or(0, |nl| nl + 1)
    }

    /// Byte column of `pos` within its line.
    pub fn column(&self, pos: usize) -> usize {
        pos - self.line_start(pos)
    }

    /// Leading spaces and tabs on the line holding `pos`.
    pub fn indent_of(&self, pos: usize) -> usize {
        let start = self.line_start(pos);
        self.skip_inline_space(start) - start
    }

    /// Layout of the entry whose key is at `key` inside the object
    /// opened at `open`.
    pub fn entry_layout(&self, open: usize, key: usize) -> EntryLayout {
        let start = self.line_start(key);
        EntryLayout {
            key_column: key - start,
            own_line: self.skip_inline_space(start) == key,
            object_indent: self.indent_of(open),
        }
    }

    fn skip_block_comment(&self, start: usize) -> Result<usize, LexError> {
        let body = &self.bytes[start + 2..];
        match memchr::memmem::find(body, b"*/") {
            Some(off) => Ok(start + 2 + off + 2),
            None => Err(LexError::new(ParseFault::UnterminatedComment, start)),
        }
    }

    /// Scan a '...' or "..." literal starting at its opening quote.
    /// Returns the offset just past the closing quote.
    pub fn scan_quoted(&self, start: usize) -> Result<usize, LexError> {
        let quote = self.bytes[start];
        let mut i = start + 1;
        loop {
            match self.byte(i) {
                None | Some(b'\n') => {
                    return Err(LexError::new(ParseFault::UnterminatedString, start));
                }
                Some(b'\\') => i += 2,
                Some(b) if b == quote => return Ok(i + 1),
                Some(_) => i += 1,
            }
        }
    }

    /// Scan a template literal starting at its opening backtick.
    /// Returns the offset just past the closing backtick.
    ///
    /// A lenient scan that runs off the end of input is retried strictly,
    /// so a well-formed literal never fails only because its closing
    /// backtick sits in an unusual position.
    pub fn scan_template(&self, start: usize, mode: TemplateMode) -> Result<usize, LexError> {
        match self.scan_template_inner(start, mode) {
            Err(e) if mode != TemplateMode::Strict => self
                .scan_template_inner(start, TemplateMode::Strict)
                .map_err(|_| e),
            other => other,
        }
    }

    fn scan_template_inner(&self, start: usize, mode: TemplateMode) -> Result<usize, LexError> {
        let mut i = start + 1;
        loop {
            match self.byte(i) {
                None => return Err(LexError::new(ParseFault::UnterminatedTemplate, start)),
                Some(b'\\') => i += 2,
                Some(b'$') if self.byte(i + 1) == Some(b'{') => {
                    i = self.scan_interpolation(i)?;
                }
                Some(b'`') => match mode {
                    TemplateMode::Strict => return Ok(i + 1),
                    TemplateMode::Lenient(layout) if self.closes_entry(i + 1, layout) => {
                        return Ok(i + 1);
                    }
                    TemplateMode::Lenient(_) => i += 1,
                },
                Some(_) => i += 1,
            }
        }
    }

    /// Scan `${ ... }` starting at the '$'. Code inside is balanced on
    /// braces; nested templates are strict.
    fn scan_interpolation(&self, start: usize) -> Result<usize, LexError> {
        let mut depth = 0usize;
        let mut i = start + 2;
        loop {
            match self.byte(i) {
                None => return Err(LexError::new(ParseFault::UnterminatedInterpolation, start)),
                Some(b'{') => {
                    depth += 1;
                    i += 1;
                }
                Some(b'}') => {
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                    depth -= 1;
                    i += 1;
                }
                Some(b'"' | b'\'') => i = self.scan_quoted(i)?,
                Some(b'`') => i = self.scan_template(i, TemplateMode::Strict)?,
                Some(b'/') if matches!(self.byte(i + 1), Some(b'*')) => {
                    i = self.skip_block_comment(i)?;
                }
                Some(_) => i += 1,
            }
        }
    }

    /// Whether a backtick ending just before `pos` ends an entry value:
    /// followed by `,` and then a new key / closer / end of line that
    /// leads to one, or directly by a closer.
    fn closes_entry(&self, pos: usize, layout: EntryLayout) -> bool {
        let j = self.skip_inline_space(pos);
        match self.byte(j) {
            None => true,
            Some(b'}' | b']') => true,
            Some(b'\r' | b'\n') => match self.next_significant(j) {
                None => true,
                Some(i) => self.closes_record(i, layout),
            },
            Some(b',') => {
                let k = self.skip_inline_space(j + 1);
                match self.byte(k) {
                    None => true,
                    Some(b'}' | b']') => true,
                    Some(b'/') if self.byte(k + 1) == Some(b'/') => {
                        self.next_line_starts_entry(self.line_end(k), layout)
                    }
                    Some(b'\r' | b'\n') => self.next_line_starts_entry(k, layout),
                    Some(_) => self.starts_key(k),
                }
            }
            Some(_) => false,
        }
    }

    /// First non-blank byte after the line break at `pos` (skipping blank
    /// lines), or None at EOF.
    fn next_significant(&self, pos: usize) -> Option<usize> {
        let mut i = pos;
        while let Some(b) = self.byte(i) {
            if !b.is_ascii_whitespace() {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// A line-leading `}` or `]` at `pos` that can close the record: at
    /// the object's own indent when keys sit on their own lines, and
    /// followed by punctuation or end of line.
    fn closes_record(&self, pos: usize, layout: EntryLayout) -> bool {
        if !matches!(self.byte(pos), Some(b'}' | b']')) {
            return false;
        }
        if layout.own_line && self.column(pos) != layout.object_indent {
            return false;
        }
        let j = self.skip_inline_space(pos + 1);
        matches!(
            self.byte(j),
            None | Some(b',' | b';' | b')' | b']' | b'}' | b'\r' | b'\n')
        )
    }

    fn next_line_starts_entry(&self, pos: usize, layout: EntryLayout) -> bool {
        match self.next_significant(pos) {
            None => true,
            Some(i) if self.byte(i) == Some(b'/') && self.byte(i + 1) == Some(b'/') => {
                self.next_line_starts_entry(self.line_end(i), layout)
            }
            Some(i) => {
                self.closes_record(i, layout) || (self.starts_key(i) && self.key_aligned(i, layout))
            }
        }
    }

    /// Sibling keys share the column of an own-line key; after an inline
    /// key they may only sit further left.
    fn key_aligned(&self, pos: usize, layout: EntryLayout) -> bool {
        let column = self.column(pos);
        if layout.own_line {
            column == layout.key_column
        } else {
            column <= layout.key_column
        }
    }

    /// `ident:` / `"quoted":` / `'quoted':` at `pos`.
    pub fn starts_key(&self, pos: usize) -> bool {
        match self.read_key(pos) {
            Some((_, end)) => {
                let j = self.skip_inline_space(end);
                self.byte(j) == Some(b':')
            }
            None => false,
        }
    }

    /// Read an object key token at `pos`. Returns (decoded name, end).
    pub fn read_key(&self, pos: usize) -> Option<(String, usize)> {
        match self.byte(pos)? {
            q @ (b'"' | b'\'') => {
                let mut i = pos + 1;
                loop {
                    match self.byte(i)? {
                        b'\n' => return None,
                        b'\\' => i += 2,
                        b if b == q => break,
                        _ => i += 1,
                    }
                }
                let raw = std::str::from_utf8(&self.bytes[pos + 1..i]).ok()?;
                Some((raw.to_string(), i + 1))
            }
            b if is_ident_byte(b) => {
                let mut i = pos;
                while self.byte(i).is_some_and(is_ident_byte) {
                    i += 1;
                }
                let raw = std::str::from_utf8(&self.bytes[pos..i]).ok()?;
                Some((raw.to_string(), i))
            }
            _ => None,
        }
    }
}

#[inline]
pub fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_end(src: &str, mode: TemplateMode) -> Result<usize, LexError> {
        let start = src.find('`').expect("backtick");
        Lexer::new(src).scan_template(start, mode)
    }

    /// Lenient end of the first template, laid out as the first key of an
    /// object whose '{' sits at `indent`.
    fn lenient_end(src: &str, indent: usize) -> Result<usize, LexError> {
        let lx = Lexer::new(src);
        let key = lx.skip_trivia(0).unwrap();
        let key = if lx.byte(key) == Some(b'{') {
            lx.skip_trivia(key + 1).unwrap()
        } else {
            key
        };
        let layout = EntryLayout {
            object_indent: indent,
            ..lx.entry_layout(0, key)
        };
        template_end(src, TemplateMode::Lenient(layout))
    }

    #[test]
    fn strict_template_stops_at_first_backtick() {
        let src = "`a`b`";
        assert_eq!(template_end(src, TemplateMode::Strict), Ok(3));
    }

    #[test]
    fn lenient_template_skips_embedded_code() {
        let src = "x: `const s = `hi`;`,\ny: 1\n";
        let end = lenient_end(src, 0).unwrap();
        assert_eq!(&src[3..end], "`const s = `hi`;`");
    }

    #[test]
    fn escaped_backtick_never_closes() {
        let src = "`a\\`b`";
        assert_eq!(template_end(src, TemplateMode::Strict), Ok(src.len()));
    }

    #[test]
    fn interpolation_hides_nested_templates() {
        let src = "`a ${ ok ? `x` : `y` } b`";
        assert_eq!(template_end(src, TemplateMode::Strict), Ok(src.len()));
    }

    #[test]
    fn lenient_accepts_inline_next_key() {
        let src = "{ a: `x`, b: 2 }";
        let end = lenient_end(src, 0).unwrap();
        assert_eq!(&src[5..end], "`x`");
    }

    #[test]
    fn lenient_falls_back_to_strict() {
        // closer never looks structural, strict scan still succeeds
        let src = "`abc`.trim()";
        let layout = EntryLayout {
            key_column: 0,
            own_line: true,
            object_indent: 0,
        };
        assert_eq!(template_end(src, TemplateMode::Lenient(layout)), Ok(5));
    }

    #[test]
    fn brace_followed_by_backtick_is_code() {
        let src = "    example: `function greet(name) {\n  return `Hello ${name}`\n}`,\n    syntax: `s`,\n";
        let end = lenient_end(src, 2).unwrap();
        assert_eq!(
            &src[13..end],
            "`function greet(name) {\n  return `Hello ${name}`\n}`"
        );
    }

    #[test]
    fn nested_object_keys_are_not_siblings() {
        let src = "    example: `const o = {\n  a: `x`,\n  b: 2\n};`,\n    syntax: `s`,\n";
        let end = lenient_end(src, 2).unwrap();
        assert_eq!(&src[13..end], "`const o = {\n  a: `x`,\n  b: 2\n};`");
    }

    #[test]
    fn record_closer_ends_the_last_entry() {
        let src = "    example: `x = `y``\n  },\n";
        let end = lenient_end(src, 2).unwrap();
        assert_eq!(&src[13..end], "`x = `y``");
    }

    #[test]
    fn code_closer_off_the_record_indent_is_content() {
        let src = "    example: `const f = () => `a`\n};\nf();`,\n    syntax: `s`,\n";
        let end = lenient_end(src, 2).unwrap();
        assert_eq!(&src[13..end], "`const f = () => `a`\n};\nf();`");
    }

    #[test]
    fn entry_layout_reports_leading_keys() {
        let lx = Lexer::new("  { a: 1,\n    b: 2 }");
        assert_eq!(
            lx.entry_layout(2, 4),
            EntryLayout {
                key_column: 4,
                own_line: false,
                object_indent: 2,
            }
        );
        assert_eq!(
            lx.entry_layout(2, 14),
            EntryLayout {
                key_column: 4,
                own_line: true,
                object_indent: 2,
            }
        );
    }

    #[test]
    fn unterminated_string_reports_opening_offset() {
        let lx = Lexer::new("  'abc\n'");
        let err = lx.scan_quoted(2).unwrap_err();
        assert_eq!(err.fault, ParseFault::UnterminatedString);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn trivia_skips_comments() {
        let lx = Lexer::new("  // c\n /* d */ x");
        assert_eq!(lx.skip_trivia(0), Ok(16));
        let lx = Lexer::new("/* open");
        assert!(lx.skip_trivia(0).is_err());
    }
}
