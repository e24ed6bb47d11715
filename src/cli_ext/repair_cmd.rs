//! Commands that rewrite the corpus, plus `restore`.
//!
//! Every write goes through `Pipeline::repair_file`, so single-operation
//! commands get the same parse, id and concurrent-write checks as plans.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{
    AppContext, DedupeArgs, EscapeArgs, InsertArgs, RenameArgs, RestoreArgs, RunArgs,
    StripSuffixArgs, WriteArgs,
};
use crate::cli_ext::scan_cmd::{emit, format_for, pipeline_for, use_color, write_report_file};
use crate::core::backup::{latest_session, list_sessions, restore};
use crate::core::error::OperationsMissed;
use crate::core::pipeline::{OpStatus, RunOptions};
use crate::core::plan::RepairPlan;
use crate::core::report::{ReportFormat, render_run};
use crate::core::transform::{FieldValue, Transform};
use crate::infra::config::Config;

/// Run `ops` against `file` and report. With `strict`, any missed
/// operation turns into exit code 3 after the report is printed.
fn execute(
    file: &Path,
    ops: Vec<Transform>,
    write: &WriteArgs,
    strict: bool,
    cfg: &Config,
    ctx: &AppContext,
) -> Result<()> {
    let opts = RunOptions {
        dry_run: ctx.dry_run,
        backup: cfg.write.backup && !write.no_backup,
        state_dir: Some(cfg.write.state_dir_for(file)),
    };
    let summary = pipeline_for(cfg).repair_file(file, &ops, &opts)?;

    let text = render_run(&summary, format_for(&write.output, cfg), use_color(cfg, ctx))?;
    emit(&text, ctx);
    write_report_file(&write.output, || render_run(&summary, ReportFormat::Json, false))?;

    let missed = summary
        .ops
        .iter()
        .filter(|op| matches!(op.status, OpStatus::Missed { .. }))
        .count();
    if strict && missed > 0 {
        return Err(OperationsMissed {
            missed,
            total: summary.ops.len(),
        }
        .into());
    }
    Ok(())
}

#[instrument(skip_all, fields(file = %args.file.display(), topic = %args.topic))]
pub fn run_insert(args: InsertArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let value = match (args.value, args.raw, &args.value_file) {
        (Some(text), _, _) => FieldValue::Template(text),
        (_, Some(expr), _) => FieldValue::Raw(expr),
        (_, _, Some(path)) => FieldValue::Template(
            std::fs::read_to_string(path)
                .with_context(|| format!("read value file {}", path.display()))?,
        ),
        _ => return Err(anyhow!("one of --value, --raw or --value-file is required")),
    };
    let op = Transform::InsertField {
        topic: args.topic,
        field: args.field,
        value,
        anchor: args.before,
    };
    execute(&args.file, vec![op], &args.write, true, cfg, ctx)
}

pub fn run_dedupe(args: DedupeArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let op = Transform::DedupeField {
        topic: args.topic,
        field: args.field,
        keep: args.keep,
    };
    execute(&args.file, vec![op], &args.write, true, cfg, ctx)
}

pub fn run_strip_suffix(args: StripSuffixArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let op = Transform::RemoveSuffix {
        suffix: args.suffix,
    };
    execute(&args.file, vec![op], &args.write, true, cfg, ctx)
}

pub fn run_escape(args: EscapeArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let op = Transform::EscapeDelimiters { field: args.field };
    execute(&args.file, vec![op], &args.write, true, cfg, ctx)
}

pub fn run_rename(args: RenameArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let op = Transform::RenameField {
        from: args.from,
        to: args.to,
        topic: args.topic,
    };
    execute(&args.file, vec![op], &args.write, true, cfg, ctx)
}

#[instrument(skip_all, fields(file = %args.file.display(), plan = %args.plan.display()))]
pub fn run_plan(args: RunArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let plan = RepairPlan::load(&args.plan)?;
    execute(&args.file, plan.ops, &args.write, args.strict, cfg, ctx)
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Session")]
    id: String,
    #[tabled(rename = "Created")]
    timestamp: String,
    #[tabled(rename = "Ok")]
    success: bool,
}

pub fn run_restore(args: RestoreArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let state_dir = cfg.write.state_dir_for(&args.file);

    if args.list {
        let wanted = std::fs::canonicalize(&args.file).ok();
        let rows: Vec<SessionRow> = list_sessions(&state_dir)?
            .into_iter()
            .filter(|e| wanted.is_none() || e.original_path == wanted)
            .map(|e| SessionRow {
                id: e.id,
                timestamp: e.timestamp,
                success: e.success,
            })
            .collect();
        if rows.is_empty() {
            emit("No backup sessions found.", ctx);
        } else {
            emit(&Table::new(rows).to_string(), ctx);
        }
        return Ok(());
    }

    let session = match args.session {
        Some(id) => id,
        None => {
            latest_session(&state_dir, Some(&args.file))?
                .ok_or_else(|| anyhow!("no backup sessions for {}", args.file.display()))?
                .id
        }
    };

    if ctx.dry_run {
        emit(
            &format!("Would restore {} from session {session}", args.file.display()),
            ctx,
        );
        return Ok(());
    }

    let report = restore(&state_dir, &session, Some(&args.file))?;
    emit(
        &format!(
            "Restored {} ({} bytes) from session {}",
            report.target.display(),
            report.size_bytes,
            report.session
        ),
        ctx,
    );
    Ok(())
}
