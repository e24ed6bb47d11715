//! Diagnostic scanner: required-field presence per topic.
//!
//! Per-topic results are the single source of truth; the summary is a
//! fold over them and never recounts the corpus.

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::corpus::{Corpus, DuplicateId, TopicRecord};

/// Required field names: a default list plus per-category overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields {
    default: Vec<String>,
    by_category: IndexMap<String, Vec<String>>,
}

impl RequiredFields {
    pub fn new<I, S>(default: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default: default.into_iter().map(Into::into).collect(),
            by_category: IndexMap::new(),
        }
    }

    /// Replace the list for one category.
    pub fn with_category<I, S>(mut self, category: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_category
            .insert(category.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn for_category(&self, category: Option<&str>) -> &[String] {
        category
            .and_then(|c| self.by_category.get(c))
            .unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Present,
    Missing,
    Duplicated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPresence {
    pub field: String,
    pub count: usize,
    pub status: FieldStatus,
}

impl FieldPresence {
    fn new(field: &str, count: usize) -> Self {
        let status = match count {
            0 => FieldStatus::Missing,
            1 => FieldStatus::Present,
            _ => FieldStatus::Duplicated,
        };
        Self {
            field: field.to_string(),
            count,
            status,
        }
    }
}

/// Scan result for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicScan {
    pub id: String,
    pub category: String,
    pub line: usize,
    pub complete: bool,
    pub fields: Vec<FieldPresence>,
}

impl TopicScan {
    fn new(record: &TopicRecord, required: &[String]) -> Self {
        let fields: Vec<_> = required
            .iter()
            .map(|name| FieldPresence::new(name, record.count(name)))
            .collect();
        let complete = fields.iter().all(|f| f.status == FieldStatus::Present);
        Self {
            id: record.id.clone(),
            category: record.category_or_default().to_string(),
            line: record.span.line,
            complete,
            fields,
        }
    }

    pub fn missing(&self) -> impl Iterator<Item = &FieldPresence> {
        self.fields
            .iter()
            .filter(|f| f.status == FieldStatus::Missing)
    }

    pub fn duplicated(&self) -> impl Iterator<Item = &FieldPresence> {
        self.fields
            .iter()
            .filter(|f| f.status == FieldStatus::Duplicated)
    }

    pub fn presence(&self, field: &str) -> Option<&FieldPresence> {
        self.fields.iter().find(|f| f.field == field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTally {
    pub topics: usize,
    pub complete: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub topics: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub topics_with_duplicates: usize,
    pub missing_by_field: IndexMap<String, usize>,
    pub duplicated_by_field: IndexMap<String, usize>,
    pub categories: IndexMap<String, CategoryTally>,
}

impl ScanSummary {
    /// The only way a summary is computed.
    pub fn from_topics(topics: &[TopicScan]) -> Self {
        topics.iter().fold(Self::default(), |mut acc, t| {
            acc.topics += 1;
            let tally = acc.categories.entry(t.category.clone()).or_default();
            tally.topics += 1;
            if t.complete {
                acc.complete += 1;
                tally.complete += 1;
            } else {
                acc.incomplete += 1;
            }
            if t.duplicated().next().is_some() {
                acc.topics_with_duplicates += 1;
            }
            for f in t.missing() {
                *acc.missing_by_field.entry(f.field.clone()).or_default() += 1;
            }
            for f in t.duplicated() {
                *acc.duplicated_by_field.entry(f.field.clone()).or_default() += 1;
            }
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub topics: Vec<TopicScan>,
    pub summary: ScanSummary,
    pub duplicate_ids: Vec<DuplicateId>,
}

impl ScanReport {
    pub fn topic(&self, id: &str) -> Option<&TopicScan> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn is_clean(&self) -> bool {
        self.summary.incomplete == 0 && self.duplicate_ids.is_empty()
    }
}

/// Scan every record for the required fields, in corpus order.
pub fn scan(corpus: &Corpus, required: &RequiredFields) -> ScanReport {
    let topics: Vec<TopicScan> = corpus
        .records()
        .iter()
        .map(|r| TopicScan::new(r, required.for_category(r.category.as_deref())))
        .collect();
    let summary = ScanSummary::from_topics(&topics);

    ScanReport {
        topics,
        summary,
        duplicate_ids: corpus.duplicate_ids(),
    }
}
