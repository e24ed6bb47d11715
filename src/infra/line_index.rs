//! Newline index for turning byte offsets into human positions.
//!
//! - Single memchr pass over bytes records every '\n'.
//! - 1-based lines and columns for reports and diagnostics.
//! - Columns count chars, not bytes, so multi-byte text lines up.
//! - Binary search for byte→line mapping.

#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte positions of every '\n' in the buffer.
    nl_positions: Vec<usize>,
    /// Total byte length of the buffer.
    len: usize,
}

impl LineIndex {
    pub fn build(bytes: &[u8]) -> Self {
        let nl_positions = memchr::memchr_iter(b'\n', bytes).collect();
        Self {
            nl_positions,
            len: bytes.len(),
        }
    }

    /// Empty buffer => 0 lines; else (#'\n' + 1).
    pub fn line_count(&self) -> usize {
        if self.len == 0 {
            0
        } else {
            self.nl_positions.len() + 1
        }
    }

    /// 1-based line covering `byte`. A '\n' belongs to the line it ends.
    pub fn line_of_byte(&self, byte: usize) -> usize {
        match self.nl_positions.binary_search(&byte) {
            Ok(pos) => pos + 1,
            Err(pos) => pos + 1,
        }
    }

    /// Byte offset where the line containing `byte` starts.
    pub fn line_start(&self, byte: usize) -> usize {
        let line = self.line_of_byte(byte);
        if line == 1 {
            0
        } else {
            self.nl_positions[line - 2] + 1
        }
    }

    /// (line, column), both 1-based; column counts chars.
    pub fn position(&self, text: &str, byte: usize) -> (usize, usize) {
        let byte = byte.min(text.len());
        let start = self.line_start(byte);
        let column = text
            .get(start..byte)
            .map(|s| s.chars().count())
            .unwrap_or(byte - start)
            + 1;
        (self.line_of_byte(byte), column)
    }
}
