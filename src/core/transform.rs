//! Transform engine: pure, idempotent corpus rewrites.
//!
//! Every transform collects byte splices against the current text, applies
//! them back to front, and re-parses the result. Zero matches is a normal
//! outcome (`changed_count == 0`), never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

use crate::core::corpus::{Corpus, Field, TopicRecord};
use crate::core::error::TransformError;
use crate::core::locate::find_topic;
use crate::parsers::record_parser::ValueKind;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static regex"));

/// Value for a newly inserted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", content = "text", rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain text, written as an escaped template literal.
    Template(String),
    /// A TypeScript expression, written as-is.
    Raw(String),
}

impl FieldValue {
    pub fn render(&self) -> String {
        match self {
            FieldValue::Template(text) => format!("`{}`", escape_template(text)),
            FieldValue::Raw(expr) => expr.clone(),
        }
    }
}

/// Which occurrence `deduplicate_field` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    #[default]
    First,
    Last,
    /// Longest value; ties keep the earliest
    Longest,
}

/// Result of one transform.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub corpus: Corpus,
    pub changed_count: usize,
    pub topics_affected: Vec<String>,
    /// Occurrences deliberately left alone, with the reason.
    pub skipped: Vec<String>,
}

impl TransformOutcome {
    fn unchanged(corpus: &Corpus) -> Self {
        Self {
            corpus: corpus.clone(),
            changed_count: 0,
            topics_affected: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// One replacement of `range` by `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Splice {
    range: Range<usize>,
    text: String,
}

impl Splice {
    fn delete(range: Range<usize>) -> Self {
        Self {
            range,
            text: String::new(),
        }
    }

    fn insert(at: usize, text: String) -> Self {
        Self { range: at..at, text }
    }
}

/// Apply non-overlapping splices, back to front.
fn apply_splices(text: &str, mut splices: Vec<Splice>) -> String {
    splices.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    let mut out = text.to_string();
    let mut floor = usize::MAX;
    for s in splices {
        debug_assert!(s.range.end <= floor, "overlapping splices");
        floor = s.range.start;
        out.replace_range(s.range, &s.text);
    }
    out
}

/// Apply splices, re-parse and check that the id multiset survived.
fn rebuild(
    corpus: &Corpus,
    splices: Vec<Splice>,
    changed_count: usize,
    topics_affected: Vec<String>,
    skipped: Vec<String>,
) -> Result<TransformOutcome, TransformError> {
    if splices.is_empty() {
        return Ok(TransformOutcome {
            skipped,
            ..TransformOutcome::unchanged(corpus)
        });
    }

    let text = apply_splices(corpus.as_str(), splices);
    let next = Corpus::parse_with(text, corpus.keys())
        .map_err(|e| TransformError::Reparse(Box::new(e)))?;

    let (missing, added) = id_difference(corpus, &next);
    if !missing.is_empty() || !added.is_empty() {
        return Err(TransformError::RecordsChanged { missing, added });
    }

    Ok(TransformOutcome {
        corpus: next,
        changed_count,
        topics_affected,
        skipped,
    })
}

/// Ids lost and gained between two corpora, counting multiplicity.
pub fn id_difference(before: &Corpus, after: &Corpus) -> (Vec<String>, Vec<String>) {
    let mut counts: BTreeMap<&str, isize> = BTreeMap::new();
    for id in before.ids() {
        *counts.entry(id).or_default() += 1;
    }
    for id in after.ids() {
        *counts.entry(id).or_default() -= 1;
    }
    let missing = counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(id, _)| id.to_string())
        .collect();
    let added = counts
        .iter()
        .filter(|(_, n)| **n < 0)
        .map(|(id, _)| id.to_string())
        .collect();
    (missing, added)
}

fn render_key(name: &str) -> String {
    if IDENT.is_match(name) {
        name.to_string()
    } else {
        format!("{name:?}")
    }
}

fn check_field_name(name: &str) -> Result<(), TransformError> {
    if name.is_empty() || name.contains(['\n', '\r', '"', '\'', '`']) {
        return Err(TransformError::InvalidArgument(format!(
            "`{name}` is not a usable field name"
        )));
    }
    Ok(())
}

/// Newline sequence used by the line that starts at `at`.
fn newline_at(text: &str, at: usize) -> &'static str {
    let end = text[at..].find('\n').map_or(text.len(), |p| at + p);
    if end > at && text.as_bytes()[end - 1] == b'\r' {
        "\r\n"
    } else {
        "\n"
    }
}

/// Insert `field: value` immediately before `anchor` in topic `topic_id`.
/// Does nothing when the field is already present.
pub fn insert_field(
    corpus: &Corpus,
    topic_id: &str,
    field: &str,
    value: &FieldValue,
    anchor: &str,
) -> Result<TransformOutcome, TransformError> {
    check_field_name(field)?;
    let record = find_topic(corpus, topic_id)?;

    if record.has(field) {
        debug!(topic = topic_id, field, "field already present; insert is a no-op");
        return Ok(TransformOutcome::unchanged(corpus));
    }

    let anchor_field = record
        .fields_named(anchor)
        .next()
        .ok_or_else(|| TransformError::AnchorNotFound {
            topic: topic_id.to_string(),
            anchor: anchor.to_string(),
        })?;

    let entry = format!("{}: {}", render_key(field), value.render());
    let splice = match &anchor_field.indent {
        Some(indent) => {
            let line_start = anchor_field.key.start - indent.len();
            let nl = newline_at(corpus.as_str(), line_start);
            Splice::insert(line_start, format!("{indent}{entry},{nl}"))
        }
        None => Splice::insert(anchor_field.key.start, format!("{entry}, ")),
    };

    rebuild(corpus, vec![splice], 1, vec![record.id.clone()], Vec::new())
}

fn keep_index(fields: &[&Field], keep: KeepPolicy) -> usize {
    match keep {
        KeepPolicy::First => 0,
        KeepPolicy::Last => fields.len() - 1,
        KeepPolicy::Longest => {
            let mut best = 0;
            for (i, f) in fields.iter().enumerate() {
                if f.value.len() > fields[best].value.len() {
                    best = i;
                }
            }
            best
        }
    }
}

fn dedupe_splices(record: &TopicRecord, field: &str, keep: KeepPolicy) -> Vec<Splice> {
    let fields: Vec<&Field> = record.fields_named(field).collect();
    if fields.len() <= 1 {
        return Vec::new();
    }
    let kept = keep_index(&fields, keep);
    fields
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != kept)
        .map(|(_, f)| Splice::delete(f.removal.clone()))
        .collect()
}

/// Drop all but one occurrence of `field` in topic `topic_id`.
pub fn deduplicate_field(
    corpus: &Corpus,
    topic_id: &str,
    field: &str,
    keep: KeepPolicy,
) -> Result<TransformOutcome, TransformError> {
    let record = find_topic(corpus, topic_id)?;
    let splices = dedupe_splices(record, field, keep);
    let removed = splices.len();
    let affected = if removed > 0 {
        vec![record.id.clone()]
    } else {
        Vec::new()
    };
    rebuild(corpus, splices, removed, affected, Vec::new())
}

/// `deduplicate_field` over every record.
pub fn deduplicate_field_everywhere(
    corpus: &Corpus,
    field: &str,
    keep: KeepPolicy,
) -> Result<TransformOutcome, TransformError> {
    let mut splices = Vec::new();
    let mut affected = Vec::new();
    for record in corpus.records() {
        let found = dedupe_splices(record, field, keep);
        if !found.is_empty() {
            affected.push(record.id.clone());
            splices.extend(found);
        }
    }
    let removed = splices.len();
    rebuild(corpus, splices, removed, affected, Vec::new())
}

/// Delete every record-level field whose name ends with `suffix`.
/// The id and category keys always stay.
pub fn remove_fields_by_suffix(corpus: &Corpus, suffix: &str) -> Result<TransformOutcome, TransformError> {
    if suffix.is_empty() {
        return Err(TransformError::InvalidArgument(
            "suffix must not be empty".to_string(),
        ));
    }

    let keys = corpus.keys();
    let mut splices = Vec::new();
    let mut affected = Vec::new();
    let mut skipped = Vec::new();
    for record in corpus.records() {
        let before = splices.len();
        for f in record.fields.iter().filter(|f| f.name.ends_with(suffix)) {
            if f.name == keys.id || f.name == keys.category {
                skipped.push(format!("{}: `{}` is a record key", record.id, f.name));
                continue;
            }
            splices.push(Splice::delete(f.removal.clone()));
        }
        if splices.len() > before {
            affected.push(record.id.clone());
        }
    }
    let removed = splices.len();
    rebuild(corpus, splices, removed, affected, skipped)
}

/// Escape raw backticks and `${` markers in template content. Characters
/// already preceded by an odd run of backslashes are left alone, which
/// makes the function idempotent.
pub fn escape_template(content: &str) -> Cow<'_, str> {
    let needs = content.contains('`') || content.contains("${");
    if !needs {
        return Cow::Borrowed(content);
    }

    let mut out = String::with_capacity(content.len() + 8);
    let mut backslashes = 0usize;
    for (i, c) in content.char_indices() {
        let escaped = backslashes % 2 == 1;
        match c {
            '\\' => {
                backslashes += 1;
                out.push(c);
                continue;
            }
            '`' if !escaped => out.push_str("\\`"),
            '$' if !escaped && content[i + 1..].starts_with('{') => out.push_str("\\$"),
            _ => out.push(c),
        }
        backslashes = 0;
    }

    if out == content {
        Cow::Borrowed(content)
    } else {
        Cow::Owned(out)
    }
}

/// Escape nested delimiters inside every template value of `field`.
pub fn escape_nested_delimiters(corpus: &Corpus, field: &str) -> Result<TransformOutcome, TransformError> {
    let mut splices = Vec::new();
    let mut affected: Vec<String> = Vec::new();
    let mut skipped = Vec::new();

    for record in corpus.records() {
        for f in record.fields_named(field) {
            if f.kind != ValueKind::Template {
                if f.kind != ValueKind::String {
                    skipped.push(format!(
                        "{}.{} at line {} is not a template literal",
                        record.id, f.name, f.value.line
                    ));
                }
                continue;
            }
            let inner = f.value.start + 1..f.value.end - 1;
            if let Cow::Owned(escaped) = escape_template(&corpus.as_str()[inner.clone()]) {
                splices.push(Splice {
                    range: inner,
                    text: escaped,
                });
                if affected.last() != Some(&record.id) {
                    affected.push(record.id.clone());
                }
            }
        }
    }

    let changed = splices.len();
    rebuild(corpus, splices, changed, affected, skipped)
}

/// Rename record-level keys `from` → `to`, optionally in one topic only.
/// Records that already hold `to` are skipped so no duplicate appears.
pub fn rename_field(
    corpus: &Corpus,
    from: &str,
    to: &str,
    topic: Option<&str>,
) -> Result<TransformOutcome, TransformError> {
    check_field_name(to)?;
    if from == to {
        return Err(TransformError::InvalidArgument(format!(
            "cannot rename `{from}` to itself"
        )));
    }
    if from == corpus.keys().id {
        return Err(TransformError::InvalidArgument(format!(
            "`{from}` holds topic ids and cannot be renamed"
        )));
    }

    let records: Vec<&TopicRecord> = match topic {
        Some(id) => vec![find_topic(corpus, id)?],
        None => corpus.records().iter().collect(),
    };

    let mut splices = Vec::new();
    let mut affected = Vec::new();
    let mut skipped = Vec::new();
    for record in records {
        if !record.has(from) {
            continue;
        }
        if record.has(to) {
            skipped.push(format!("{}: already has `{to}`", record.id));
            continue;
        }
        for f in record.fields_named(from) {
            let raw = corpus.slice(&f.key);
            let key = match raw.chars().next() {
                Some(q @ ('"' | '\'')) => format!("{q}{to}{q}"),
                _ => render_key(to),
            };
            splices.push(Splice {
                range: f.key.range(),
                text: key,
            });
        }
        affected.push(record.id.clone());
    }

    let changed = splices.len();
    rebuild(corpus, splices, changed, affected, skipped)
}

/// A transform named by data, as selected on the command line or in a
/// repair plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Transform {
    InsertField {
        topic: String,
        field: String,
        value: FieldValue,
        anchor: String,
    },
    DedupeField {
        #[serde(default)]
        topic: Option<String>,
        field: String,
        #[serde(default)]
        keep: KeepPolicy,
    },
    RemoveSuffix {
        suffix: String,
    },
    EscapeDelimiters {
        field: String,
    },
    RenameField {
        from: String,
        to: String,
        #[serde(default)]
        topic: Option<String>,
    },
}

impl Transform {
    pub fn apply(&self, corpus: &Corpus) -> Result<TransformOutcome, TransformError> {
        match self {
            Transform::InsertField {
                topic,
                field,
                value,
                anchor,
            } => insert_field(corpus, topic, field, value, anchor),
            Transform::DedupeField {
                topic: Some(topic),
                field,
                keep,
            } => deduplicate_field(corpus, topic, field, *keep),
            Transform::DedupeField {
                topic: None,
                field,
                keep,
            } => deduplicate_field_everywhere(corpus, field, *keep),
            Transform::RemoveSuffix { suffix } => remove_fields_by_suffix(corpus, suffix),
            Transform::EscapeDelimiters { field } => escape_nested_delimiters(corpus, field),
            Transform::RenameField { from, to, topic } => {
                rename_field(corpus, from, to, topic.as_deref())
            }
        }
    }

    /// Short human label, e.g. `insert-field syntax → x`.
    pub fn label(&self) -> String {
        match self {
            Transform::InsertField { topic, field, anchor, .. } => {
                format!("insert-field {field} before {anchor} in {topic}")
            }
            Transform::DedupeField { topic, field, keep } => format!(
                "dedupe-field {field} (keep {}) in {}",
                match keep {
                    KeepPolicy::First => "first",
                    KeepPolicy::Last => "last",
                    KeepPolicy::Longest => "longest",
                },
                topic.as_deref().unwrap_or("all topics")
            ),
            Transform::RemoveSuffix { suffix } => format!("remove-suffix {suffix}"),
            Transform::EscapeDelimiters { field } => format!("escape-delimiters {field}"),
            Transform::RenameField { from, to, topic } => format!(
                "rename-field {from} -> {to} in {}",
                topic.as_deref().unwrap_or("all topics")
            ),
        }
    }
}
