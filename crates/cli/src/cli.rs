use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Poll story sites and announce new stories on Discord.
///
/// Settings come from the environment (and an optional `.env` file); the
/// flags below override the matching variables.
#[derive(Parser, Debug)]
#[command(name = "storywatch", version)]
pub struct CliArgs {
    /// Run one cycle per source, then exit
    #[arg(long)]
    pub once: bool,

    /// Directory holding the dedup files (overrides STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Seconds between cycles (overrides POLL_INTERVAL_SECS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: Option<u64>,

    /// Comma-separated sources to enable, e.g. "mula,oak" (overrides SOURCES)
    #[arg(long)]
    pub sources: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
