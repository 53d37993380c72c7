//! Error types for crash log analysis

use std::path::PathBuf;
use thiserror::Error;

/// Why a numeric token could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Hex token without the `0x` prefix
    MissingPrefix,
    /// Nothing after the prefix
    Empty,
    /// Bad digit or value wider than 64 bits
    Invalid,
}

/// A numeric token that failed to decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot decode {token:?} ({kind:?})")]
pub struct DecodeError {
    pub token: String,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub(crate) fn new(token: &str, kind: DecodeErrorKind) -> Self {
        Self {
            token: token.to_string(),
            kind,
        }
    }
}

/// Errors surfaced by parsing, analysis and report output
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No events found in log file.")]
    NoEvents,

    #[error("Invalid line pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;
