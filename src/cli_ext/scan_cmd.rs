//! Read-only commands: `scan` and `locate`.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use tracing::instrument;

use crate::cli::{AppContext, LocateArgs, OutputArgs, ScanArgs};
use crate::core::error::{IncompleteCorpus, LocateMiss};
use crate::core::locate::{locate, locate_all};
use crate::core::pipeline::Pipeline;
use crate::core::report::{ReportFormat, render_locate, render_scan};
use crate::core::scan::RequiredFields;
use crate::infra::config::Config;

pub(crate) fn pipeline_for(cfg: &Config) -> Pipeline {
    Pipeline::new(cfg.corpus.clone(), RequiredFields::from(&cfg.required))
}

/// Color only for a terminal, and only when nothing turned it off.
pub(crate) fn use_color(cfg: &Config, ctx: &AppContext) -> bool {
    cfg.report.color && !ctx.no_color && std::io::stdout().is_terminal()
}

pub(crate) fn format_for(output: &OutputArgs, cfg: &Config) -> ReportFormat {
    output.format.unwrap_or(cfg.report.format)
}

/// Write the JSON side report when `--report` was given.
pub(crate) fn write_report_file(output: &OutputArgs, json: impl FnOnce() -> Result<String>) -> Result<()> {
    if let Some(path) = &output.report {
        let text = json()?;
        std::fs::write(path, text)
            .with_context(|| format!("write report {}", path.display()))?;
    }
    Ok(())
}

pub(crate) fn emit(text: &str, ctx: &AppContext) {
    if !ctx.quiet {
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }
}

#[instrument(skip_all, fields(file = %args.file.display()))]
pub fn run_scan(args: ScanArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let mut pipeline = pipeline_for(cfg);
    if !args.require.is_empty() {
        pipeline.required = RequiredFields::new(args.require.iter().cloned());
    }

    let (_, report) = pipeline.scan_file(&args.file)?;
    let text = render_scan(&report, format_for(&args.output, cfg), use_color(cfg, ctx))?;
    emit(&text, ctx);
    write_report_file(&args.output, || render_scan(&report, ReportFormat::Json, false))?;

    if args.strict && report.summary.incomplete > 0 {
        return Err(IncompleteCorpus {
            incomplete: report.summary.incomplete,
            total: report.summary.topics,
        }
        .into());
    }
    Ok(())
}

pub fn run_locate(args: LocateArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let loaded = pipeline_for(cfg).load(&args.file)?;
    let corpus = &loaded.corpus;

    let spans = if args.all {
        let all = locate_all(corpus, &args.topic, &args.field)?;
        if all.is_empty() {
            return Err(LocateMiss::FieldNotFound {
                topic: args.topic,
                field: args.field,
            }
            .into());
        }
        all
    } else {
        vec![locate(corpus, &args.topic, &args.field)?]
    };

    emit(&render_locate(&spans, corpus, args.format)?, ctx);
    Ok(())
}
