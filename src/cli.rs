//! CLI argument parsing for the crash log analyzer

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::analyzer::DEFAULT_TAIL_LEN;

/// Output format for the analysis report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "analyze")]
#[command(version)]
#[command(
    about = "Analyze kernel crash logs for context switch irregularities",
    long_about = None
)]
pub struct Cli {
    /// Crash log captured from the kernel console
    #[arg(value_name = "LOG_FILE")]
    pub log_file: PathBuf,

    /// Also write the report to this file
    #[arg(value_name = "OUTPUT_FILE")]
    pub output_file: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Number of trailing events shown in the report
    #[arg(long = "tail", value_name = "N", default_value_t = DEFAULT_TAIL_LEN)]
    pub tail: usize,

    /// Enable debug tracing on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
