//! Field locator: topic id + field name → span.
//!
//! Lookups are bounded by the record's own span and only see its
//! top-level keys; nested quiz objects never answer for the record.

use serde::Serialize;

use crate::core::corpus::{Corpus, Field, Span, TopicRecord};
use crate::core::error::LocateMiss;
use crate::parsers::record_parser::ValueKind;

/// A located field occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpan {
    pub topic: String,
    pub field: String,
    pub key: Span,
    pub value: Span,
    pub entry: Span,
    pub kind: ValueKind,
    /// 0-based occurrence index within the record
    pub occurrence: usize,
    /// occurrences of this name in the record
    pub total: usize,
}

impl FieldSpan {
    fn new(record: &TopicRecord, field: &Field, occurrence: usize, total: usize) -> Self {
        Self {
            topic: record.id.clone(),
            field: field.name.clone(),
            key: field.key,
            value: field.value,
            entry: field.entry,
            kind: field.kind,
            occurrence,
            total,
        }
    }

    pub fn value_text<'c>(&self, corpus: &'c Corpus) -> &'c str {
        corpus.slice(&self.value)
    }
}

/// The single record with `id`. Duplicated ids are ambiguous.
pub fn find_topic<'c>(corpus: &'c Corpus, id: &str) -> Result<&'c TopicRecord, LocateMiss> {
    let mut matches = corpus.records().iter().filter(|r| r.id == id);
    let first = matches.next().ok_or_else(|| LocateMiss::TopicNotFound {
        topic: id.to_string(),
    })?;
    let extra = matches.count();
    if extra > 0 {
        return Err(LocateMiss::AmbiguousTopic {
            topic: id.to_string(),
            count: extra + 1,
        });
    }
    Ok(first)
}

/// First occurrence of `field` in topic `topic_id`.
pub fn locate(corpus: &Corpus, topic_id: &str, field: &str) -> Result<FieldSpan, LocateMiss> {
    locate_all(corpus, topic_id, field)?
        .into_iter()
        .next()
        .ok_or_else(|| LocateMiss::FieldNotFound {
            topic: topic_id.to_string(),
            field: field.to_string(),
        })
}

/// Every occurrence of `field` in topic `topic_id`, in text order.
/// An existing topic without the field yields an empty list.
pub fn locate_all(corpus: &Corpus, topic_id: &str, field: &str) -> Result<Vec<FieldSpan>, LocateMiss> {
    let record = find_topic(corpus, topic_id)?;
    let total = record.count(field);
    Ok(record
        .fields_named(field)
        .enumerate()
        .map(|(i, f)| FieldSpan::new(record, f, i, total))
        .collect())
}
