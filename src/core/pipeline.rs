//! Run driver: load → parse → transform → re-scan → verify → write.
//!
//! Nothing touches the corpus file unless every step before the write
//! succeeded, and the write itself replaces the whole file atomically.

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::core::backup::BackupSession;
use crate::core::corpus::{Corpus, RecordKeys};
use crate::core::error::{TransformError, WriteBlocked};
use crate::core::scan::{RequiredFields, ScanReport, scan};
use crate::core::transform::{Transform, id_difference};
use crate::infra::io::{ContentId, content_id, read_text, write_atomic};

/// How a write-back run behaves.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub backup: bool,
    /// Backup location; required when `backup` is set
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpStatus {
    Applied {
        changed: usize,
        topics: Vec<String>,
        skipped: Vec<String>,
    },
    Missed {
        reason: String,
    },
}

/// Outcome of one operation within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpReport {
    pub op: String,
    #[serde(flatten)]
    pub status: OpStatus,
}

impl OpReport {
    pub fn changed(&self) -> usize {
        match &self.status {
            OpStatus::Applied { changed, .. } => *changed,
            OpStatus::Missed { .. } => 0,
        }
    }
}

/// Result of applying a list of operations in memory.
#[derive(Debug, Clone)]
pub struct Repaired {
    pub corpus: Corpus,
    pub ops: Vec<OpReport>,
}

/// Everything a repair run did, for the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub path: PathBuf,
    pub dry_run: bool,
    pub written: bool,
    pub changed: usize,
    pub content_id_before: ContentId,
    pub content_id_after: ContentId,
    pub ops: Vec<OpReport>,
    pub scan: ScanReport,
    pub backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// A corpus as read from disk.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub corpus: Corpus,
    pub content_id: ContentId,
}

/// Apply `ops` in order. Per-topic misses are recorded and skipped;
/// anything that would corrupt the corpus stops the run.
pub fn repair(corpus: &Corpus, ops: &[Transform]) -> Result<Repaired, TransformError> {
    let mut current = corpus.clone();
    let mut reports = Vec::with_capacity(ops.len());

    for op in ops {
        let label = op.label();
        match op.apply(&current) {
            Ok(outcome) => {
                debug!(op = %label, changed = outcome.changed_count, "applied");
                reports.push(OpReport {
                    op: label,
                    status: OpStatus::Applied {
                        changed: outcome.changed_count,
                        topics: outcome.topics_affected,
                        skipped: outcome.skipped,
                    },
                });
                current = outcome.corpus;
            }
            Err(e) if e.is_recoverable() => {
                warn!(op = %label, "{e}");
                reports.push(OpReport {
                    op: label,
                    status: OpStatus::Missed {
                        reason: e.to_string(),
                    },
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Repaired {
        corpus: current,
        ops: reports,
    })
}

fn unified_diff(path: &Path, before: &str, after: &str) -> String {
    let name = path.display().to_string();
    let (old, new) = (format!("a/{name}"), format!("b/{name}"));
    let diff = TextDiff::from_lines(before, after);
    diff.unified_diff()
        .context_radius(3)
        .header(&old, &new)
        .to_string()
}

/// Replace the file with `text`, after confirming it still holds the
/// content loaded as `loaded`. Returns the backup session id, if any.
fn commit(
    path: &Path,
    loaded: &ContentId,
    text: &str,
    ops: &[Transform],
    opts: &RunOptions,
) -> Result<Option<String>> {
    let on_disk = content_id(&read_text(path)?);
    if &on_disk != loaded {
        return Err(WriteBlocked::ConcurrentModification(path.to_path_buf()).into());
    }

    let mut backup = None;
    if opts.backup {
        let state_dir = opts
            .state_dir
            .as_deref()
            .context("backup requested without a state directory")?;
        let mut session = BackupSession::begin(state_dir, ops.iter().map(Transform::label).collect())?;
        session.snapshot(path)?;
        session.finalize(true)?;
        backup = Some(session.id().to_string());
    }

    write_atomic(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(backup)
}

/// Scanner and repair driver over one corpus file.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub keys: RecordKeys,
    pub required: RequiredFields,
}

impl Pipeline {
    pub fn new(keys: RecordKeys, required: RequiredFields) -> Self {
        Self { keys, required }
    }

    /// Read and parse. Invalid UTF-8 and parse errors are both fatal.
    pub fn load(&self, path: &Path) -> Result<Loaded> {
        let text = read_text(path)?;
        let content_id = content_id(&text);
        let corpus = Corpus::parse_with(text, &self.keys)?;
        debug!(path = %path.display(), records = corpus.records().len(), %content_id, "corpus loaded");
        Ok(Loaded { corpus, content_id })
    }

    /// Diagnostic scan; duplicate ids are reported, never fatal here.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn scan_file(&self, path: &Path) -> Result<(Corpus, ScanReport)> {
        let loaded = self.load(path)?;
        let report = scan(&loaded.corpus, &self.required);
        for dup in &report.duplicate_ids {
            warn!(id = %dup.id, lines = ?dup.lines, "duplicate topic id");
        }
        info!(
            topics = report.summary.topics,
            incomplete = report.summary.incomplete,
            "scan complete"
        );
        Ok((loaded.corpus, report))
    }

    /// Apply `ops` to the file at `path`, then write it back (or diff it).
    #[instrument(skip_all, fields(path = %path.display(), ops = ops.len(), dry_run = opts.dry_run))]
    pub fn repair_file(&self, path: &Path, ops: &[Transform], opts: &RunOptions) -> Result<RunSummary> {
        let Loaded {
            corpus,
            content_id: before_id,
        } = self.load(path)?;

        let dups = corpus.duplicate_ids();
        if !dups.is_empty() {
            let ids: Vec<String> = dups.into_iter().map(|d| d.id).collect();
            if !opts.dry_run {
                return Err(WriteBlocked::DuplicateIds(ids).into());
            }
            warn!(ids = ?ids, "duplicate topic ids; a real run would refuse to write");
        }

        let repaired = repair(&corpus, ops)?;

        // ids are checked against a fresh parse of the final text
        let after = Corpus::parse_with(repaired.corpus.serialize(), &self.keys)?;
        let (missing, added) = id_difference(&corpus, &after);
        if !missing.is_empty() || !added.is_empty() {
            return Err(WriteBlocked::IdsChanged { missing, added }.into());
        }

        let report = scan(&after, &self.required);
        let changed: usize = repaired.ops.iter().map(OpReport::changed).sum();
        let text_changed = after.as_str() != corpus.as_str();
        let after_id = content_id(after.as_str());

        let mut summary = RunSummary {
            path: path.to_path_buf(),
            dry_run: opts.dry_run,
            written: false,
            changed,
            content_id_before: before_id.clone(),
            content_id_after: after_id,
            ops: repaired.ops,
            scan: report,
            backup: None,
            diff: None,
        };

        if opts.dry_run {
            if text_changed {
                summary.diff = Some(unified_diff(path, corpus.as_str(), after.as_str()));
            }
            return Ok(summary);
        }
        if !text_changed {
            info!("nothing to write");
            return Ok(summary);
        }

        summary.backup = commit(path, &before_id, after.as_str(), ops, opts)?;
        summary.written = true;
        info!(changed, "corpus written");
        Ok(summary)
    }
}
