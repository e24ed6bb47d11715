//! Diagnostics go to stderr through `tracing`; stdout stays for reports.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TMEND_LOG";

/// Filter precedence: `TMEND_LOG`, then `--verbose` (debug), else warnings only.
fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("topicmend=debug,tmend=debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool, no_color: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .try_init();
}
