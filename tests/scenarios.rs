//! End-to-end repair scenarios over the lesson corpus, through the library.

mod util;

use topicmend::core::corpus::{Corpus, decode_template};
use topicmend::core::locate::{locate, locate_all};
use topicmend::core::scan::{FieldStatus, RequiredFields, scan};
use topicmend::core::transform::{
    FieldValue, KeepPolicy, deduplicate_field, escape_nested_delimiters, insert_field,
    remove_fields_by_suffix,
};
use topicmend::parsers::record_parser::ValueKind;
use util::{REQUIRED, TOPICS, record_text};

fn required() -> RequiredFields {
    RequiredFields::new(REQUIRED)
}

#[test]
fn fixture_parses_into_three_records() {
    let corpus = Corpus::parse(TOPICS).unwrap();
    assert_eq!(corpus.ids(), ["array-push", "array-pop", "template-literals"]);
    assert_eq!(corpus.serialize(), TOPICS);
    assert!(corpus.duplicate_ids().is_empty());
}

#[test]
fn missing_field_is_inserted_and_rescan_is_complete() {
    let corpus = Corpus::parse(TOPICS).unwrap();
    let before = scan(&corpus, &required());
    let push = before.topic("array-push").unwrap();
    assert!(!push.complete);
    assert_eq!(
        push.presence("syntax").unwrap().status,
        FieldStatus::Missing
    );

    let value = FieldValue::Template("array.push(element1, ..., elementN)".into());
    let out = insert_field(&corpus, "array-push", "syntax", &value, "voiceExplanation").unwrap();
    assert_eq!(out.changed_count, 1);
    assert_eq!(out.topics_affected, ["array-push"]);

    let after = scan(&out.corpus, &required());
    assert!(after.topic("array-push").unwrap().complete);

    let syntax = locate(&out.corpus, "array-push", "syntax").unwrap();
    let voice = locate(&out.corpus, "array-push", "voiceExplanation").unwrap();
    assert_eq!(syntax.key.line + 1, voice.key.line);

    // other records untouched
    for id in ["array-pop", "template-literals"] {
        assert_eq!(record_text(out.corpus.as_str(), id), record_text(TOPICS, id));
    }
}

#[test]
fn duplicate_example_keeps_the_first_occurrence() {
    let corpus = Corpus::parse(TOPICS).unwrap();
    let first = locate(&corpus, "array-pop", "example").unwrap();
    let first_text = first.value_text(&corpus).to_string();
    assert_eq!(first.total, 2);

    let out = deduplicate_field(&corpus, "array-pop", "example", KeepPolicy::First).unwrap();
    assert_eq!(out.changed_count, 1);

    let remaining = locate_all(&out.corpus, "array-pop", "example").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].value_text(&out.corpus), first_text);

    let rescan = scan(&out.corpus, &required());
    assert_eq!(
        rescan.topic("array-pop").unwrap().presence("example").unwrap().count,
        1
    );
    assert!(!out.corpus.as_str().contains("while (stack.length > 0)"));
}

#[test]
fn duplicate_example_keep_longest_takes_the_long_body() {
    let corpus = Corpus::parse(TOPICS).unwrap();
    let all = locate_all(&corpus, "array-pop", "example").unwrap();
    assert!(all[0].value_text(&corpus).len() < 60);
    assert!(all[1].value_text(&corpus).len() > 500);

    let out = deduplicate_field(&corpus, "array-pop", "example", KeepPolicy::Longest).unwrap();
    assert_eq!(out.changed_count, 1);
    let kept = locate(&out.corpus, "array-pop", "example").unwrap();
    assert_eq!(kept.total, 1);
    assert!(kept.value_text(&out.corpus).contains("function drain(items)"));
    assert!(!out.corpus.as_str().contains("const last = stack.pop();"));
}

#[test]
fn embedded_backticks_do_not_mislead_the_locator() {
    let corpus = Corpus::parse(TOPICS).unwrap();

    let example = locate(&corpus, "template-literals", "example").unwrap();
    assert_eq!(
        example.value_text(&corpus),
        "`const greeting = `Hello, ${name}!`;`"
    );
    let syntax = locate(&corpus, "template-literals", "syntax").unwrap();
    assert_eq!(syntax.value_text(&corpus), "`text ${expression} text`");
    assert_eq!(syntax.kind, ValueKind::Template);

    // the quiz entry's `syntax` is nested and does not count
    assert_eq!(syntax.total, 1);
}

#[test]
fn escaping_makes_the_value_safe_without_changing_visible_text() {
    let corpus = Corpus::parse(TOPICS).unwrap();
    let before = locate(&corpus, "template-literals", "example").unwrap();
    let raw = before.value_text(&corpus);
    let visible = decode_template(&raw[1..raw.len() - 1]);

    let out = escape_nested_delimiters(&corpus, "example").unwrap();
    assert_eq!(out.topics_affected, ["template-literals"]);

    let after = locate(&out.corpus, "template-literals", "example").unwrap();
    let escaped = after.value_text(&out.corpus);
    assert_eq!(escaped, r"`const greeting = \`Hello, \${name}!\`;`");
    assert_eq!(decode_template(&escaped[1..escaped.len() - 1]), visible);

    let again = escape_nested_delimiters(&out.corpus, "example").unwrap();
    assert_eq!(again.changed_count, 0);
    assert_eq!(again.corpus.as_str(), out.corpus.as_str());
}

#[test]
fn suffix_removal_touches_only_matching_topics() {
    let corpus = Corpus::parse(TOPICS).unwrap();
    let out = remove_fields_by_suffix(&corpus, "_alt").unwrap();

    assert_eq!(out.changed_count, 2);
    assert_eq!(out.topics_affected, ["array-push", "array-pop"]);
    assert_eq!(out.corpus.ids(), corpus.ids());
    assert!(!out.corpus.as_str().contains("syntax_alt"));
    assert_eq!(
        record_text(out.corpus.as_str(), "template-literals"),
        record_text(TOPICS, "template-literals")
    );

    // whole lines go, neighbours stay
    assert!(out.corpus.as_str().contains(
        "arr.push(3);`,\n    voiceExplanation: `Push appends to the end and returns the new length.`,"
    ));
}
