//! **topicmend** - scan and repair a TypeScript content corpus of topic records
//!
//! The corpus text is never re-emitted from a model: records and fields are
//! byte spans into the original file, and every repair is a set of splices
//! followed by a re-parse. Untouched bytes stay byte-identical.

/// Command-line interface with clap integration
pub mod cli;

/// Command handlers behind the CLI
pub mod cli_ext {
    /// `scan` and `locate`
    pub mod scan_cmd;

    /// Write-back commands, plans and restore
    pub mod repair_cmd;
}

/// Shell completion generation
pub mod completion;

/// Corpus model, locator, scanner, transforms and the run driver
pub mod core {
    /// Error taxonomy and exit codes
    pub mod error;

    /// Lossless corpus model (text + record spans)
    pub mod corpus;
    pub use corpus::{Corpus, RecordKeys, TopicRecord};

    /// Topic/field → span lookup
    pub mod locate;
    pub use locate::{FieldSpan, locate, locate_all};

    /// Required-field diagnostics
    pub mod scan;
    pub use scan::{RequiredFields, ScanReport, scan};

    /// Idempotent splice-based rewrites
    pub mod transform;
    pub use transform::{FieldValue, KeepPolicy, Transform};

    /// Text/table/JSON rendering
    pub mod report;

    /// Load → transform → verify → write
    pub mod pipeline;
    pub use pipeline::{Pipeline, RunOptions, RunSummary};

    /// TOML/JSON repair plans
    pub mod plan;

    /// Session-scoped corpus backups
    pub mod backup;
}

/// Tokenizer and record structure scanning
pub mod parsers {
    /// Delimiter-aware byte scanner (strings, templates, comments)
    pub mod lexer;

    /// Outermost array-element objects and their top-level entries
    pub mod record_parser;
}

/// Infrastructure - configuration, I/O, logging
pub mod infra {
    /// Layered configuration (file + TMEND_ environment)
    pub mod config;
    pub use config::{Config, load_config};

    /// Memory-mapped reads, atomic writes, content ids
    pub mod io;

    /// Byte offset → line/column mapping
    pub mod line_index;

    /// tracing-subscriber setup
    pub mod logging;
}

pub use cli::{AppContext, Cli, Commands};
pub use crate::core::{Corpus, Pipeline, RequiredFields, Transform};
