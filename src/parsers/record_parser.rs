//! Object-literal structure on top of the lexer.
//!
//! Finds topic records (outermost array-element objects carrying an id
//! key with a literal value) and indexes their top-level entries as byte
//! spans. Nothing here allocates a copy of the text.

use std::ops::Range;

use crate::core::error::{LexError, ParseFault};
use crate::parsers::lexer::{EntryLayout, Lexer, TemplateMode};

/// Coarse shape of an entry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Template,
    String,
    Array,
    Object,
    Other,
}

/// One `key: value` entry at the top level of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNode {
    pub name: String,
    pub key: Range<usize>,
    pub value: Range<usize>,
    pub kind: ValueKind,
    /// Offset just past the trailing comma, if the entry has one.
    pub comma_end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNode {
    pub span: Range<usize>,
    pub entries: Vec<EntryNode>,
}

impl ObjectNode {
    pub fn entry(&self, name: &str) -> Option<&EntryNode> {
        self.entries.iter().find(|e| e.name == name)
    }
}

pub struct RecordParser<'a> {
    lx: Lexer<'a>,
}

impl<'a> RecordParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lx: Lexer::new(text),
        }
    }

    /// Walk the whole text and return every record object, in order.
    /// `is_record` decides whether an array-element object qualifies;
    /// qualifying objects are not descended into.
    pub fn find_records<F>(&self, is_record: F) -> Result<Vec<ObjectNode>, LexError>
    where
        F: Fn(&ObjectNode) -> bool,
    {
        let lx = &self.lx;
        let mut records = Vec::new();
        let mut stack: Vec<(u8, usize)> = Vec::new();
        let mut i = 0usize;

        loop {
            i = lx.skip_trivia(i)?;
            let Some(b) = lx.byte(i) else { break };
            match b {
                b'"' | b'\'' => i = lx.scan_quoted(i)?,
                b'`' => i = lx.scan_template(i, TemplateMode::Strict)?,
                b'[' | b'(' => {
                    stack.push((b, i));
                    i += 1;
                }
                b'{' => {
                    if matches!(stack.last(), Some((b'[', _))) {
                        let obj = self.parse_object(i)?;
                        if is_record(&obj) {
                            i = obj.span.end;
                            records.push(obj);
                            continue;
                        }
                    }
                    stack.push((b, i));
                    i += 1;
                }
                b']' | b')' | b'}' => {
                    match stack.pop() {
                        Some((open, _)) if closer_for(open) == b => {}
                        Some((open, _)) => {
                            return Err(LexError::new(
                                ParseFault::Mismatched {
                                    open: open as char,
                                    close: b as char,
                                },
                                i,
                            ));
                        }
                        None => {
                            return Err(LexError::new(
                                ParseFault::Unexpected { found: b as char },
                                i,
                            ));
                        }
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }

        if let Some((open, at)) = stack.pop() {
            return Err(LexError::new(
                ParseFault::Unclosed {
                    open: open as char,
                },
                at,
            ));
        }
        Ok(records)
    }

    /// Parse an object literal whose '{' is at `open`.
    pub fn parse_object(&self, open: usize) -> Result<ObjectNode, LexError> {
        let lx = &self.lx;
        let mut entries = Vec::new();
        let mut i = open + 1;

        loop {
            i = lx.skip_trivia(i)?;
            match lx.byte(i) {
                None => {
                    return Err(LexError::new(ParseFault::Unclosed { open: '{' }, open));
                }
                Some(b'}') => {
                    return Ok(ObjectNode {
                        span: open..i + 1,
                        entries,
                    });
                }
                Some(b',') => i += 1,
                Some(b']' | b')') => {
                    return Err(LexError::new(
                        ParseFault::Mismatched {
                            open: '{',
                            close: lx.byte(i).unwrap_or(b'?') as char,
                        },
                        i,
                    ));
                }
                Some(_) => {
                    let keyed = lx.read_key(i).and_then(|(name, key_end)| {
                        let colon = lx.skip_inline_space(key_end);
                        (lx.byte(colon) == Some(b':')).then_some((name, key_end, colon))
                    });

                    match keyed {
                        Some((name, key_end, colon)) => {
                            let value_start = lx.skip_trivia(colon + 1)?;
                            let layout = lx.entry_layout(open, i);
                            let (value_end, kind, stop) = self.scan_entry_value(value_start, layout)?;
                            let comma_end = (lx.byte(stop) == Some(b',')).then_some(stop + 1);
                            entries.push(EntryNode {
                                name,
                                key: i..key_end,
                                value: value_start..value_end,
                                kind,
                                comma_end,
                            });
                            i = stop;
                        }
                        None => {
                            // spread, shorthand, method or statement: skip it
                            let (_, stop) = self.scan_expression(i, i)?;
                            i = if stop == i { i + 1 } else { stop };
                        }
                    }
                }
            }
        }
    }

    /// Scan an entry value. Returns (end of value, kind, terminator offset).
    fn scan_entry_value(
        &self,
        start: usize,
        layout: EntryLayout,
    ) -> Result<(usize, ValueKind, usize), LexError> {
        let lx = &self.lx;
        let (first_end, kind) = match lx.byte(start) {
            Some(b'`') => (lx.scan_template(start, TemplateMode::Lenient(layout))?, ValueKind::Template),
            Some(b'"' | b'\'') => (lx.scan_quoted(start)?, ValueKind::String),
            Some(b'{') => (self.parse_object(start)?.span.end, ValueKind::Object),
            Some(b'[') => (self.scan_balanced(start)?, ValueKind::Array),
            _ => {
                let (end, stop) = self.scan_expression(start, start)?;
                return Ok((end, ValueKind::Other, stop));
            }
        };

        let (end, stop) = self.scan_expression(first_end, first_end)?;
        let kind = if end == first_end {
            kind
        } else {
            ValueKind::Other
        };
        Ok((end, kind, stop))
    }

    /// Scan expression tokens from `pos` until a depth-0 `,`, `}`, `]` or
    /// `)`. Returns (end of last significant token, terminator offset).
    fn scan_expression(&self, pos: usize, last: usize) -> Result<(usize, usize), LexError> {
        let lx = &self.lx;
        let mut i = pos;
        let mut last = last;

        loop {
            i = lx.skip_trivia(i)?;
            match lx.byte(i) {
                None | Some(b',' | b'}' | b']' | b')') => return Ok((last, i.min(lx.len()))),
                Some(b'"' | b'\'') => i = lx.scan_quoted(i)?,
                Some(b'`') => i = lx.scan_template(i, TemplateMode::Strict)?,
                Some(b'{') => i = self.parse_object(i)?.span.end,
                Some(b'[' | b'(') => i = self.scan_balanced(i)?,
                Some(_) => i += 1,
            }
            last = i;
        }
    }

    /// Scan a bracketed group starting at '[' or '(' to just past its
    /// matching closer. Objects inside are parsed as objects.
    fn scan_balanced(&self, open: usize) -> Result<usize, LexError> {
        let lx = &self.lx;
        let opener = lx.byte(open).unwrap_or(b'[');
        let closer = closer_for(opener);
        let mut i = open + 1;

        loop {
            let (_, stop) = self.scan_expression(i, i)?;
            match lx.byte(stop) {
                None => {
                    return Err(LexError::new(
                        ParseFault::Unclosed {
                            open: opener as char,
                        },
                        open,
                    ));
                }
                Some(b',') => i = stop + 1,
                Some(b) if b == closer => return Ok(stop + 1),
                Some(b) => {
                    return Err(LexError::new(
                        ParseFault::Mismatched {
                            open: opener as char,
                            close: b as char,
                        },
                        stop,
                    ));
                }
            }
        }
    }
}

fn closer_for(open: u8) -> u8 {
    match open {
        b'[' => b']',
        b'(' => b')',
        _ => b'}',
    }
}
