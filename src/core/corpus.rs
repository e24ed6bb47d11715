//! Corpus model: the raw text plus the topic records indexed inside it.
//!
//! The text is kept verbatim and records/fields are byte spans into it,
//! so `serialize(parse(text)) == text` holds by construction and any edit
//! touches only the bytes it names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::core::error::{CorpusParseError, LexError};
use crate::infra::line_index::LineIndex;
use crate::parsers::lexer::Lexer;
use crate::parsers::record_parser::{EntryNode, ObjectNode, RecordParser, ValueKind};

/// Which keys carry record identity and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordKeys {
    pub id: String,
    pub category: String,
}

impl Default for RecordKeys {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            category: "category".to_string(),
        }
    }
}

/// Byte range plus the 1-based position of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A `name: value` entry at the top level of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Raw key token, quotes included.
    pub key: Span,
    pub value: Span,
    /// Key start through value end.
    pub entry: Span,
    pub kind: ValueKind,
    /// Bytes to delete to drop the entry cleanly (line-aware).
    pub removal: Range<usize>,
    /// Leading whitespace when the entry starts its own line.
    pub indent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    pub id: String,
    pub category: Option<String>,
    pub span: Span,
    pub fields: Vec<Field>,
}

impl TopicRecord {
    pub fn fields_named<'r>(&'r self, name: &'r str) -> impl Iterator<Item = &'r Field> + 'r {
        self.fields.iter().filter(move |f| f.name == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.fields_named(name).count()
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }
}

pub const UNCATEGORIZED: &str = "uncategorized";

/// A topic id that occurs more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateId {
    pub id: String,
    pub lines: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    text: String,
    keys: RecordKeys,
    records: Vec<TopicRecord>,
}

impl Corpus {
    /// Parse with the default `id` / `category` keys.
    pub fn parse(text: impl Into<String>) -> Result<Self, CorpusParseError> {
        Self::parse_with(text, &RecordKeys::default())
    }

    pub fn parse_with(text: impl Into<String>, keys: &RecordKeys) -> Result<Self, CorpusParseError> {
        let text = text.into();
        let index = LineIndex::build(text.as_bytes());

        let objects = RecordParser::new(&text)
            .find_records(|obj| literal_entry(obj, &keys.id).is_some())
            .map_err(|e| parse_error(&text, &index, e))?;

        let records = objects
            .iter()
            .map(|obj| build_record(&text, &index, keys, obj))
            .collect();

        Ok(Self {
            text,
            keys: keys.clone(),
            records,
        })
    }

    /// The corpus text, byte for byte.
    pub fn serialize(&self) -> String {
        self.text.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn keys(&self) -> &RecordKeys {
        &self.keys
    }

    pub fn records(&self) -> &[TopicRecord] {
        &self.records
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Raw source text of a span.
    pub fn slice(&self, span: &Span) -> &str {
        &self.text[span.range()]
    }

    /// Ids occurring more than once, in first-appearance order.
    pub fn duplicate_ids(&self) -> Vec<DuplicateId> {
        let mut seen: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for r in &self.records {
            seen.entry(r.id.as_str()).or_default().push(r.span.line);
        }
        seen.into_iter()
            .filter(|(_, lines)| lines.len() > 1)
            .map(|(id, lines)| DuplicateId {
                id: id.to_string(),
                lines,
            })
            .collect()
    }

    /// Decoded content of a string/template value; None for other kinds.
    pub fn field_text(&self, field: &Field) -> Option<String> {
        let raw = self.slice(&field.value);
        match field.kind {
            ValueKind::Template => Some(decode_template(&raw[1..raw.len() - 1])),
            ValueKind::String => Some(decode_quoted(&raw[1..raw.len() - 1])),
            _ => None,
        }
    }
}

/// Contract-level entry point: text → corpus.
pub fn parse(raw: &str) -> Result<Corpus, CorpusParseError> {
    Corpus::parse(raw)
}

/// Contract-level entry point: corpus → text.
pub fn serialize(corpus: &Corpus) -> String {
    corpus.serialize()
}

/// Visible text of template content: drops the escape markers in front of
/// '`', '$' and '\'. Other escape sequences are kept as written.
pub fn decode_template(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && matches!(next, '`' | '$' | '\\')
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

fn decode_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn literal_entry<'o>(obj: &'o ObjectNode, key: &str) -> Option<&'o EntryNode> {
    obj.entry(key)
        .filter(|e| matches!(e.kind, ValueKind::String | ValueKind::Template))
}

fn literal_text(text: &str, entry: &EntryNode) -> String {
    let raw = &text[entry.value.clone()];
    let inner = &raw[1..raw.len() - 1];
    match entry.kind {
        ValueKind::Template => decode_template(inner),
        _ => decode_quoted(inner),
    }
}

fn span_of(text: &str, index: &LineIndex, range: Range<usize>) -> Span {
    let (line, column) = index.position(text, range.start);
    Span {
        start: range.start,
        end: range.end,
        line,
        column,
    }
}

fn build_record(text: &str, index: &LineIndex, keys: &RecordKeys, obj: &ObjectNode) -> TopicRecord {
    let id = literal_entry(obj, &keys.id)
        .map(|e| literal_text(text, e))
        .unwrap_or_default();
    let category = literal_entry(obj, &keys.category).map(|e| literal_text(text, e));

    let fields = obj
        .entries
        .iter()
        .map(|e| {
            let (removal, indent) = removal_range(text, e);
            Field {
                name: e.name.clone(),
                key: span_of(text, index, e.key.clone()),
                value: span_of(text, index, e.value.clone()),
                entry: span_of(text, index, e.key.start..e.value.end),
                kind: e.kind,
                removal,
                indent,
            }
        })
        .collect();

    TopicRecord {
        id,
        category,
        span: span_of(text, index, obj.span.clone()),
        fields,
    }
}

/// Bytes covering an entry for deletion. An entry alone on its line(s)
/// takes the whole line(s) with it, trailing comment included; an inline
/// entry takes its comma and the spaces after it.
fn removal_range(text: &str, entry: &EntryNode) -> (Range<usize>, Option<String>) {
    let lx = Lexer::new(text);
    let line_start = text[..entry.key.start].rfind('\n').map_or(0, |p| p + 1);
    let lead = &text[line_start..entry.key.start];
    let own_line = lead.chars().all(|c| c == ' ' || c == '\t');

    let tail = entry.comma_end.unwrap_or(entry.value.end);
    let mut after = lx.skip_inline_space(tail);
    if own_line && lx.byte(after) == Some(b'/') && lx.byte(after + 1) == Some(b'/') {
        after = lx.line_end(after);
    }

    if own_line {
        if let Some(next) = lx.past_newline(after) {
            return (line_start..next, Some(lead.to_string()));
        }
        if after >= text.len() {
            return (line_start..after, Some(lead.to_string()));
        }
    }

    let indent = own_line.then(|| lead.to_string());
    (entry.key.start..lx.skip_inline_space(tail), indent)
}

pub(crate) fn parse_error(text: &str, index: &LineIndex, e: LexError) -> CorpusParseError {
    let (line, column) = index.position(text, e.offset);
    let width = text[e.offset.min(text.len())..]
        .chars()
        .next()
        .map_or(0, char::len_utf8);
    CorpusParseError {
        fault: e.fault,
        offset: e.offset,
        line,
        column,
        src: text.to_string(),
        span: (e.offset, width).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ParseFault;

    const SAMPLE: &str = r#"import { Topic } from "./types";

export const dsaTopics: Topic[] = [
  {
    id: "arrays",
    category: "Data Structures",
    example: `const xs = [1, 2, 3];`,
    syntax: `let arr = [];`,
  },
  {
    id: 'stack',
    category: `Data Structures`,
    example: `push/pop`, // LIFO
    quizQuestions: [{ question: "q?", options: ["a", "b"] }]
  },
];
"#;

    #[test]
    fn parse_then_serialize_is_identity() {
        let corpus = Corpus::parse(SAMPLE).unwrap();
        assert_eq!(serialize(&corpus), SAMPLE);
        assert_eq!(corpus.ids(), ["arrays", "stack"]);
        assert_eq!(corpus.records()[1].category.as_deref(), Some("Data Structures"));
    }

    #[test]
    fn fields_carry_positions() {
        let corpus = Corpus::parse(SAMPLE).unwrap();
        let syntax = corpus.records()[0].fields_named("syntax").next().unwrap();
        assert_eq!(syntax.key.line, 8);
        assert_eq!(syntax.key.column, 5);
        assert_eq!(corpus.slice(&syntax.value), "`let arr = [];`");
        assert_eq!(corpus.field_text(syntax).as_deref(), Some("let arr = [];"));
        assert_eq!(syntax.indent.as_deref(), Some("    "));
    }

    #[test]
    fn removal_covers_whole_line_and_comment() {
        let corpus = Corpus::parse(SAMPLE).unwrap();
        let example = corpus.records()[1].fields_named("example").next().unwrap();
        assert_eq!(
            &SAMPLE[example.removal.clone()],
            "    example: `push/pop`, // LIFO\n"
        );
    }

    #[test]
    fn inline_removal_keeps_neighbours() {
        let text = "[{ id: 'a', alt: 1, b: 2 }]";
        let corpus = Corpus::parse(text).unwrap();
        let alt = corpus.records()[0].fields_named("alt").next().unwrap();
        assert_eq!(&text[alt.removal.clone()], "alt: 1, ");
        assert_eq!(alt.indent, None);
    }

    #[test]
    fn duplicate_ids_are_reported_not_dropped() {
        let text = "[\n{ id: 'a' },\n{ id: 'b' },\n{ id: 'a' },\n]";
        let corpus = Corpus::parse(text).unwrap();
        assert_eq!(corpus.records().len(), 3);
        assert_eq!(
            corpus.duplicate_ids(),
            vec![DuplicateId {
                id: "a".into(),
                lines: vec![2, 4],
            }]
        );
    }

    #[test]
    fn parse_error_points_at_the_opening_delimiter() {
        let text = "[\n  { id: 'a', body: `never closed\n";
        let err = Corpus::parse(text).unwrap_err();
        assert_eq!(err.fault, ParseFault::UnterminatedTemplate);
        assert_eq!((err.line, err.column), (2, 20));
    }

    #[test]
    fn decoding_strips_only_delimiter_escapes() {
        assert_eq!(decode_template(r"a \` b \${c} \n \\"), r"a ` b ${c} \n \");
        assert_eq!(decode_quoted(r#"it\'s \"x\"\n"#), "it's \"x\"\n");
    }

    #[test]
    fn example_code_with_braces_and_nested_keys_parses() {
        let text = "export const topics = [\n  {\n    id: \"fn\",\n    example: `function greet(name) {\n  return `Hello ${name}`\n}`,\n    syntax: `s`,\n  },\n  {\n    id: \"obj\",\n    example: `const o = {\n  a: `x`,\n  b: 2\n};`,\n    syntax: `s`,\n  },\n];\n";
        let corpus = Corpus::parse(text).unwrap();
        assert_eq!(corpus.ids(), ["fn", "obj"]);
        assert_eq!(corpus.serialize(), text);
        for record in corpus.records() {
            let names: Vec<_> = record.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, ["id", "example", "syntax"]);
        }
        let example = corpus.records()[1].fields_named("example").next().unwrap();
        assert_eq!(corpus.slice(&example.value), "`const o = {\n  a: `x`,\n  b: 2\n};`");
    }
}
