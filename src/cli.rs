use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::report::ReportFormat;
use crate::core::transform::KeepPolicy;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "tmend")]
#[command(
    about = "Scan and repair topic records in a TypeScript content corpus without disturbing surrounding text"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show the diff that would be written without touching the file
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging on stderr (TMEND_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: tmend.toml/.yaml/.json or .tmend.toml in the current directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report required-field presence for every topic
    Scan(ScanArgs),

    /// Print the span and text of a topic's field
    Locate(LocateArgs),

    /// Insert a field before an anchor field in one topic
    Insert(InsertArgs),

    /// Remove duplicate occurrences of a field
    Dedupe(DedupeArgs),

    /// Delete every field whose name ends with a suffix
    StripSuffix(StripSuffixArgs),

    /// Escape raw backticks and `${` inside a field's template values
    Escape(EscapeArgs),

    /// Rename a field across topics
    Rename(RenameArgs),

    /// Apply a repair plan (TOML or JSON) in one write
    Run(RunArgs),

    /// Restore the corpus from a backup session
    Restore(RestoreArgs),

    /// Initialize a tmend.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output options shared by commands that print a report.
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Report format (default from config)
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Also write a JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

/// Options shared by commands that rewrite the corpus.
#[derive(Args, Debug, Clone, Default)]
pub struct WriteArgs {
    /// Skip the backup snapshot before writing
    #[arg(long)]
    pub no_backup: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Required fields for every category (overrides config)
    #[arg(long = "require", value_delimiter = ',', value_name = "FIELD")]
    pub require: Vec<String>,

    /// Exit with code 2 when any topic is incomplete
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct LocateArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Topic id
    pub topic: String,

    /// Field name
    pub field: String,

    /// Show every occurrence instead of the first
    #[arg(long)]
    pub all: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("content").required(true).args(["value", "raw", "value_file"])))]
pub struct InsertArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Topic id
    pub topic: String,

    /// Field to insert
    pub field: String,

    /// Existing field the new one goes in front of
    #[arg(long, value_name = "FIELD")]
    pub before: String,

    /// Plain text, written as an escaped template literal
    #[arg(long)]
    pub value: Option<String>,

    /// TypeScript expression, written verbatim
    #[arg(long)]
    pub raw: Option<String>,

    /// Read plain text from a file
    #[arg(long, value_name = "FILE")]
    pub value_file: Option<PathBuf>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
pub struct DedupeArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Field to deduplicate
    pub field: String,

    /// Only this topic (default: every topic)
    #[arg(long)]
    pub topic: Option<String>,

    /// Which occurrence survives
    #[arg(long, value_enum, default_value = "first")]
    pub keep: KeepPolicy,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
pub struct StripSuffixArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Field-name suffix, e.g. `_alt`
    pub suffix: String,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
pub struct EscapeArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Field whose template values get escaped
    pub field: String,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
pub struct RenameArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Current field name
    pub from: String,

    /// New field name
    pub to: String,

    /// Only this topic (default: every topic)
    #[arg(long)]
    pub topic: Option<String>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Corpus file
    pub file: PathBuf,

    /// Repair plan (.toml or .json)
    #[arg(long, value_name = "FILE")]
    pub plan: PathBuf,

    /// Exit with code 3 when any operation misses its topic or field
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Corpus file to restore
    pub file: PathBuf,

    /// Session id (default: latest successful session for this file)
    #[arg(long)]
    pub session: Option<String>,

    /// List sessions instead of restoring
    #[arg(long)]
    pub list: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
