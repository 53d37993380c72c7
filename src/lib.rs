//! Crashscope - crash log analyzer for kernel context-switch traces
//!
//! This library reconstructs an event timeline from the `[SGI]`, `[IRQ]`,
//! `[Exception]` and `[CTX BUG]` lines a kernel prints around context
//! switches, and flags irregularities such as threads resuming at ELR=0 or
//! unstable IRQ stack pointers.
//!
//! ```
//! use crashscope::analyzer::{analyze, AnalysisConfig};
//! use crashscope::parser::LogParser;
//! use crashscope::report::render_to_string;
//!
//! let parser = LogParser::new().unwrap();
//! let parsed = parser.parse_str("[SGI] switching 1 -> 2\nSP_now=0x10 new_ctx.sp=0x20 new_ctx.elr=0x0\n");
//! let findings = analyze(&parsed, &AnalysisConfig::default());
//! assert!(render_to_string(&findings).contains("Thread 2 has ELR=0"));
//! ```

pub mod analyzer;
pub mod classify;
pub mod cli;
pub mod decode;
pub mod error;
pub mod event;
pub mod exception;
pub mod json_output;
pub mod parser;
pub mod report;
