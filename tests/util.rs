//! Shared test utilities for integration tests
//!
//! Provides the topic corpus fixture and helpers for placing it in a
//! scratch directory.

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::path::PathBuf;

/// The lesson corpus: `array-push` lacks `syntax`, `array-pop` has two
/// `example` fields, `template-literals` embeds raw backticks, and the
/// first two carry a `syntax_alt` field.
pub const TOPICS: &str = include_str!("fixtures/topics.ts");

/// Required fields used throughout the tests.
pub const REQUIRED: [&str; 3] = ["example", "syntax", "voiceExplanation"];

/// Scratch directory holding `topics.ts` with `text`.
pub fn corpus_dir(text: &str) -> (assert_fs::TempDir, PathBuf) {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("topics.ts");
    file.write_str(text).expect("write corpus");
    let path = file.path().to_path_buf();
    (tmp, path)
}

/// Scratch directory holding the lesson corpus.
pub fn topics_dir() -> (assert_fs::TempDir, PathBuf) {
    corpus_dir(TOPICS)
}

/// Text of the record starting at `id: "<id>"`, through its closing `},`.
pub fn record_text<'a>(text: &'a str, id: &str) -> &'a str {
    let needle = format!("id: \"{id}\"");
    let at = text.find(&needle).expect("record id present");
    let start = text[..at].rfind('{').expect("record open");
    let end = at + text[at..].find("\n  },").expect("record close") + "\n  },".len();
    &text[start..end]
}
