//! JSON output format for crash log findings
//!
//! `--format json` emits the same findings as the text report, wrapped with
//! input metadata, for consumption by scripts.

use crate::analyzer::Findings;
use crate::error::Result;
use crate::parser::ParsedLog;
use serde::Serialize;
use std::io::Write;

use crate::report::ReportSink;

/// Top-level JSON document
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub source: Option<String>,
    pub lines_scanned: usize,
    pub dropped_lines: usize,
    pub findings: &'a Findings,
}

impl<'a> JsonReport<'a> {
    pub fn new(parsed: &ParsedLog, findings: &'a Findings, source: Option<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            source,
            lines_scanned: parsed.lines_scanned,
            dropped_lines: parsed.dropped_lines,
            findings,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document through a report sink
    pub fn render(&self, sink: &mut ReportSink<impl Write>) -> Result<()> {
        sink.block(&self.to_json()?)?;
        Ok(())
    }
}
