//! Report emitter: pure formatting of scan and run results.
//!
//! Output is deterministic for a given input; callers decide where the
//! string goes (stdout or a `--report` file).

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tabled::{Table, Tabled};

use crate::core::corpus::Corpus;
use crate::core::locate::FieldSpan;
use crate::core::pipeline::{OpStatus, RunSummary};
use crate::core::scan::{ScanReport, TopicScan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Per-topic pass/fail lines grouped by category
    #[default]
    Text,
    /// Category summary table
    Table,
    /// Machine-readable JSON
    Json,
}

/// 0.0 when there is nothing to divide by.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn status_word(ok: bool, color: bool) -> String {
    match (ok, color) {
        (true, true) => "PASS".green().bold().to_string(),
        (false, true) => "FAIL".red().bold().to_string(),
        (true, false) => "PASS".to_string(),
        (false, false) => "FAIL".to_string(),
    }
}

fn problems(t: &TopicScan) -> String {
    let missing: Vec<&str> = t.missing().map(|f| f.field.as_str()).collect();
    let duplicated: Vec<String> = t
        .duplicated()
        .map(|f| format!("{}×{}", f.field, f.count))
        .collect();

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing: {}", missing.join(", ")));
    }
    if !duplicated.is_empty() {
        parts.push(format!("duplicated: {}", duplicated.join(", ")));
    }
    parts.join("; ")
}

#[derive(Tabled)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Topics")]
    topics: usize,
    #[tabled(rename = "Complete")]
    complete: usize,
    #[tabled(rename = "%")]
    percent: String,
}

#[derive(Tabled)]
struct TopicRow {
    #[tabled(rename = "Topic")]
    id: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Problems")]
    problems: String,
}

fn scan_text(report: &ScanReport, color: bool) -> String {
    let s = &report.summary;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scanned {} topics: {} complete ({:.1}%), {} incomplete",
        s.topics,
        s.complete,
        percent(s.complete, s.topics),
        s.incomplete
    );

    for (category, tally) in &s.categories {
        let _ = writeln!(
            out,
            "\n{}: {}/{} complete ({:.1}%)",
            category,
            tally.complete,
            tally.topics,
            percent(tally.complete, tally.topics)
        );
        for t in report.topics.iter().filter(|t| &t.category == category) {
            let _ = write!(out, "  {} {}", status_word(t.complete, color), t.id);
            if !t.complete {
                let _ = write!(out, "  {}", problems(t));
            }
            out.push('\n');
        }
    }

    if !s.missing_by_field.is_empty() {
        out.push_str("\nMissing by field:\n");
        for (field, n) in &s.missing_by_field {
            let _ = writeln!(out, "  {field}: {n}");
        }
    }
    if !s.duplicated_by_field.is_empty() {
        out.push_str("\nDuplicated by field:\n");
        for (field, n) in &s.duplicated_by_field {
            let _ = writeln!(out, "  {field}: {n}");
        }
    }
    if !report.duplicate_ids.is_empty() {
        let header = "Duplicate ids (write-back is blocked):";
        if color {
            let _ = writeln!(out, "\n{}", header.yellow());
        } else {
            let _ = writeln!(out, "\n{header}");
        }
        for d in &report.duplicate_ids {
            let lines: Vec<String> = d.lines.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "  {} (lines {})", d.id, lines.join(", "));
        }
    }
    out
}

fn scan_table(report: &ScanReport) -> String {
    let s = &report.summary;
    let mut rows: Vec<CategoryRow> = s
        .categories
        .iter()
        .map(|(category, tally)| CategoryRow {
            category: category.clone(),
            topics: tally.topics,
            complete: tally.complete,
            percent: format!("{:.1}", percent(tally.complete, tally.topics)),
        })
        .collect();
    rows.push(CategoryRow {
        category: "total".to_string(),
        topics: s.topics,
        complete: s.complete,
        percent: format!("{:.1}", percent(s.complete, s.topics)),
    });

    let mut out = Table::new(rows).to_string();
    out.push('\n');

    let failing: Vec<TopicRow> = report
        .topics
        .iter()
        .filter(|t| !t.complete)
        .map(|t| TopicRow {
            id: t.id.clone(),
            category: t.category.clone(),
            line: t.line,
            problems: problems(t),
        })
        .collect();
    if !failing.is_empty() {
        out.push('\n');
        out.push_str(&Table::new(failing).to_string());
        out.push('\n');
    }
    out
}

/// Render a scan report.
pub fn render_scan(report: &ScanReport, format: ReportFormat, color: bool) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(scan_text(report, color)),
        ReportFormat::Table => Ok(scan_table(report)),
        ReportFormat::Json => {
            serde_json::to_string_pretty(report).context("serialize scan report")
        }
    }
}

fn run_text(summary: &RunSummary, color: bool) -> String {
    let mut out = String::new();
    let path = summary.path.display();
    let headline = if summary.dry_run {
        format!("Dry run on {path}: nothing written")
    } else if summary.written {
        match &summary.backup {
            Some(id) => format!("Repaired {path} (backup {id})"),
            None => format!("Repaired {path}"),
        }
    } else {
        format!("No changes to {path}")
    };
    let _ = writeln!(out, "{headline}");

    for op in &summary.ops {
        match &op.status {
            OpStatus::Applied {
                changed,
                topics,
                skipped,
            } => {
                let mark = if color {
                    "ok".green().to_string()
                } else {
                    "ok".to_string()
                };
                let _ = write!(out, "  {mark}   {}: {changed} change(s)", op.op);
                if !topics.is_empty() {
                    let _ = write!(out, " [{}]", topics.join(", "));
                }
                out.push('\n');
                for s in skipped {
                    let _ = writeln!(out, "         skipped {s}");
                }
            }
            OpStatus::Missed { reason } => {
                let mark = if color {
                    "miss".yellow().to_string()
                } else {
                    "miss".to_string()
                };
                let _ = writeln!(out, "  {mark} {}: {reason}", op.op);
            }
        }
    }

    let s = &summary.scan.summary;
    let _ = writeln!(
        out,
        "Total changes: {}\nAfter repair: {}/{} topics complete ({:.1}%)",
        summary.changed,
        s.complete,
        s.topics,
        percent(s.complete, s.topics)
    );

    if let Some(diff) = &summary.diff {
        out.push('\n');
        out.push_str(diff);
    }
    out
}

/// Render a repair run summary.
pub fn render_run(summary: &RunSummary, format: ReportFormat, color: bool) -> Result<String> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(summary).context("serialize run summary"),
        ReportFormat::Text | ReportFormat::Table => Ok(run_text(summary, color)),
    }
}

#[derive(Serialize)]
struct LocatedValue<'a> {
    #[serde(flatten)]
    span: &'a FieldSpan,
    text: &'a str,
}

/// Render locator hits with their source text.
pub fn render_locate(spans: &[FieldSpan], corpus: &Corpus, format: ReportFormat) -> Result<String> {
    if format == ReportFormat::Json {
        let rows: Vec<LocatedValue> = spans
            .iter()
            .map(|span| LocatedValue {
                span,
                text: span.value_text(corpus),
            })
            .collect();
        return serde_json::to_string_pretty(&rows).context("serialize locate result");
    }

    let mut out = String::new();
    for span in spans {
        let _ = writeln!(
            out,
            "{}.{} [{}/{}] line {}, column {} (bytes {}..{})",
            span.topic,
            span.field,
            span.occurrence + 1,
            span.total,
            span.key.line,
            span.key.column,
            span.entry.start,
            span.entry.end
        );
        let _ = writeln!(out, "{}", span.value_text(corpus));
    }
    Ok(out)
}
