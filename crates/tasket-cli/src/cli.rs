//! CLI arguments (`clap` derive).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Run one demo task (and whatever it requires) to completion.
#[derive(Debug, Clone, Parser)]
#[command(name = "tasket", version, about = "Run a registered task and print its log.", long_about = None)]
pub struct CliArgs {
    /// Path to a TOML file with a `[scheduler]` table.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level. Falls back to `TASKET_LOG`, then `info`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Key of the report to load.
    #[arg(long, default_value = "weekly")]
    pub key: String,

    /// Method to run: collect, render or publish.
    #[arg(long, default_value = "publish")]
    pub method: String,

    /// Also print the final task record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
