use clap::Parser;
use std::process::ExitCode;
use topicmend::cli::{AppContext, Cli, Commands};
use topicmend::cli_ext::{repair_cmd, scan_cmd};
use topicmend::core::error::{CorpusParseError, exit_code_for};
use topicmend::infra::{config, logging};

fn run(cli: Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let cfg = config::load_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Scan(args) => scan_cmd::run_scan(args, &cfg, ctx),
        Commands::Locate(args) => scan_cmd::run_locate(args, &cfg, ctx),
        Commands::Insert(args) => repair_cmd::run_insert(args, &cfg, ctx),
        Commands::Dedupe(args) => repair_cmd::run_dedupe(args, &cfg, ctx),
        Commands::StripSuffix(args) => repair_cmd::run_strip_suffix(args, &cfg, ctx),
        Commands::Escape(args) => repair_cmd::run_escape(args, &cfg, ctx),
        Commands::Rename(args) => repair_cmd::run_rename(args, &cfg, ctx),
        Commands::Run(args) => repair_cmd::run_plan(args, &cfg, ctx),
        Commands::Restore(args) => repair_cmd::run_restore(args, &cfg, ctx),
        Commands::Init(args) => config::init(args, ctx),
        Commands::Completions(args) => topicmend::completion::run(args, ctx),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    logging::init(ctx.verbose, ctx.no_color);

    let result = run(cli, &ctx);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            match e.downcast::<CorpusParseError>() {
                Ok(parse) => eprintln!("{:?}", miette::Report::new(parse)),
                Err(other) => eprintln!("Error: {other:#}"),
            }
            ExitCode::from(code as u8)
        }
    }
}
