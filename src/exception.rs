//! Exception block assembly
//!
//! An `[Exception]` marker is followed by a handful of detail lines. Up to
//! [`EXCEPTION_WINDOW`] lines after the marker are scanned; both detail
//! patterns are applied to every line and a later match overwrites an
//! earlier one for the same fields.

use crate::classify::LinePatterns;
use crate::event::{ExceptionRecord, Word};

/// Number of lines after the marker searched for exception details
pub const EXCEPTION_WINDOW: usize = 9;

/// Build the record for an exception marker
///
/// `window` holds the (trimmed) lines following the marker, already capped
/// at [`EXCEPTION_WINDOW`] by the caller. Fields not found stay zero.
pub fn scan_block(
    patterns: &LinePatterns,
    line_num: usize,
    marker: &str,
    ec: Word,
    iss: Word,
    window: &[&str],
) -> ExceptionRecord {
    let mut record = ExceptionRecord {
        line_num,
        ec,
        iss,
        raw_lines: Vec::with_capacity(window.len() + 1),
        ..ExceptionRecord::default()
    };
    record.raw_lines.push(marker.to_string());

    for (offset, line) in window.iter().enumerate() {
        record.raw_lines.push((*line).to_string());

        match patterns.fault_registers(line) {
            Some(Ok(regs)) => {
                record.elr = regs.elr;
                record.far = regs.far;
                record.spsr = regs.spsr;
            }
            Some(Err(e)) => {
                tracing::debug!(line = line_num + offset + 1, error = %e, "ignoring exception register line");
            }
            None => {}
        }

        match patterns.fault_owner(line) {
            Some(Ok(owner)) => {
                record.thread = owner.thread;
                record.sp = owner.sp;
            }
            Some(Err(e)) => {
                tracing::debug!(line = line_num + offset + 1, error = %e, "ignoring exception thread line");
            }
            None => {}
        }
    }

    record
}
