//! Event stream builder
//!
//! Walks the log once with an explicit cursor. Switch lines may consume the
//! following continuation line; exception markers look ahead over a fixed
//! window without consuming it.

use crate::classify::{LinePatterns, LineShape};
use crate::error::{AnalyzeError, Result};
use crate::event::{Event, EventKind, ExceptionRecord, Snapshot};
use crate::exception::{scan_block, EXCEPTION_WINDOW};
use std::path::Path;

/// Everything recovered from one log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLog {
    /// Events in file order
    pub events: Vec<Event>,
    /// First exception block, if any
    pub exception: Option<ExceptionRecord>,
    /// Number of lines in the input
    pub lines_scanned: usize,
    /// Lines that matched a shape but failed to decode
    pub dropped_lines: usize,
}

/// Forward-only position over the indexed lines
struct Cursor<'a> {
    lines: &'a [&'a str],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(lines: &'a [&'a str]) -> Self {
        Self { lines, pos: 0 }
    }

    fn current(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<&'a str> {
        self.lines.get(self.pos + 1).copied()
    }

    /// Up to `len` lines after the current one
    fn window_after(&self, len: usize) -> &'a [&'a str] {
        let start = (self.pos + 1).min(self.lines.len());
        let end = (start + len).min(self.lines.len());
        &self.lines[start..end]
    }

    /// 1-based number of the current line
    fn line_num(&self) -> usize {
        self.pos + 1
    }

    fn advance(&mut self, by: usize) {
        self.pos += by;
    }
}

/// Crash log parser
#[derive(Debug, Clone)]
pub struct LogParser {
    patterns: LinePatterns,
}

impl LogParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: LinePatterns::new()?,
        })
    }

    /// Parse a whole log held in memory
    pub fn parse_str(&self, text: &str) -> ParsedLog {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        self.parse_lines(&lines)
    }

    /// Parse already-split lines (expected to be trimmed)
    pub fn parse_lines(&self, lines: &[&str]) -> ParsedLog {
        let mut parsed = ParsedLog {
            lines_scanned: lines.len(),
            ..ParsedLog::default()
        };
        let mut cursor = Cursor::new(lines);

        while let Some(line) = cursor.current() {
            let line_num = cursor.line_num();

            let shape = match self.patterns.classify(line) {
                None => {
                    cursor.advance(1);
                    continue;
                }
                Some(Err(e)) => {
                    tracing::debug!(line = line_num, error = %e, "dropping undecodable event");
                    parsed.dropped_lines += 1;
                    cursor.advance(1);
                    continue;
                }
                Some(Ok(shape)) => shape,
            };
            tracing::trace!(line = line_num, ?shape, "classified");

            let kind = match shape {
                LineShape::CtxBug => EventKind::CtxBug {
                    text: line.to_string(),
                },
                LineShape::IrqEntry(frame) => EventKind::IrqEntry(frame),
                LineShape::IrqExit(frame) => EventKind::IrqExit(frame),
                LineShape::Switching { from_tid, to_tid } => {
                    match self.continuation(&mut cursor) {
                        Ok(snapshot) => EventKind::Switching {
                            from_tid,
                            to_tid,
                            snapshot,
                        },
                        Err(()) => {
                            parsed.dropped_lines += 1;
                            cursor.advance(1);
                            continue;
                        }
                    }
                }
                LineShape::Back { sp } => EventKind::Back { sp },
                LineShape::Returned {
                    tid,
                    seq,
                    sp,
                    x30,
                    elr,
                } => EventKind::Returned {
                    tid,
                    seq,
                    sp,
                    x30,
                    elr,
                },
                LineShape::ExceptionMarker { ec, iss } => {
                    if parsed.exception.is_none() {
                        let window = cursor.window_after(EXCEPTION_WINDOW);
                        parsed.exception =
                            Some(scan_block(&self.patterns, line_num, line, ec, iss, window));
                    } else {
                        tracing::debug!(line = line_num, "additional exception block not recorded");
                    }
                    EventKind::Exception
                }
            };

            parsed.events.push(Event::new(line_num, kind));
            cursor.advance(1);
        }

        tracing::info!(
            lines = parsed.lines_scanned,
            events = parsed.events.len(),
            dropped = parsed.dropped_lines,
            "parsed crash log"
        );
        parsed
    }

    /// Try to attach the next line as a context snapshot
    ///
    /// A matching continuation is consumed. `Err` means it matched a dialect
    /// but could not be decoded; it is consumed and the switch is dropped.
    fn continuation(&self, cursor: &mut Cursor<'_>) -> std::result::Result<Snapshot, ()> {
        let Some(next) = cursor.peek_next() else {
            return Ok(Snapshot::None);
        };

        match self.patterns.snapshot(next) {
            None => Ok(Snapshot::None),
            Some(Ok(snapshot)) => {
                tracing::debug!(line = cursor.line_num() + 1, "consumed switch continuation");
                cursor.advance(1);
                Ok(snapshot)
            }
            Some(Err(e)) => {
                tracing::debug!(
                    line = cursor.line_num() + 1,
                    error = %e,
                    "dropping switch with undecodable continuation"
                );
                cursor.advance(1);
                Err(())
            }
        }
    }
}

/// Read and parse a log file
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn parse_file(path: &Path) -> Result<ParsedLog> {
    let bytes = std::fs::read(path).map_err(|source| AnalyzeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(LogParser::new()?.parse_str(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IrqFrame;

    fn parse(text: &str) -> ParsedLog {
        LogParser::new().unwrap().parse_str(text)
    }

    #[test]
    fn test_empty_log() {
        let parsed = parse("");
        assert!(parsed.events.is_empty());
        assert!(parsed.exception.is_none());
    }

    #[test]
    fn test_switch_consumes_newest_continuation() {
        let parsed = parse(
            "[SGI] switching 1 -> 2\n\
             SP_now=0x41fff000 new_ctx.sp=0x42000000 new_ctx.elr=0x40080000\n\
             [SGI] back, SP=0x41fff000\n",
        );
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(
            parsed.events[0].kind,
            EventKind::Switching {
                from_tid: 1,
                to_tid: 2,
                snapshot: Snapshot::WithElr {
                    sp_now: 0x41ff_f000,
                    new_sp: 0x4200_0000,
                    new_elr: 0x4008_0000,
                },
            }
        );
        assert_eq!(parsed.events[1].line_num, 3);
    }

    #[test]
    fn test_switch_at_end_of_file() {
        let parsed = parse("noise\n[SGI] switching 4 -> 0");
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].line_num, 2);
        assert!(matches!(
            parsed.events[0].kind,
            EventKind::Switching {
                snapshot: Snapshot::None,
                ..
            }
        ));
    }

    #[test]
    fn test_unmatched_continuation_is_classified_independently() {
        let parsed = parse("[SGI] switching 1 -> 2\n[IRQ] entry: tid=2 tpidr=0x0 sp=0x5000\n");
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(
            parsed.events[1].kind,
            EventKind::IrqEntry(IrqFrame {
                tid: 2,
                tpidr: 0,
                sp: 0x5000
            })
        );
    }

    #[test]
    fn test_legacy_and_handle_dialects() {
        let parsed = parse(
            "[SGI] switching 1 -> 2\n\
             old_ctx.sp=0x100 new_ctx.sp=0x200\n\
             [SGI] switching 2 -> 1\n\
             SP_now=0x300 old_ctx=0x400 new_ctx=0x500\n",
        );
        assert_eq!(parsed.events.len(), 2);
        assert!(matches!(
            parsed.events[0].kind,
            EventKind::Switching {
                snapshot: Snapshot::Legacy { .. },
                ..
            }
        ));
        assert!(matches!(
            parsed.events[1].kind,
            EventKind::Switching {
                snapshot: Snapshot::WithHandles { .. },
                ..
            }
        ));
        assert_eq!(parsed.events[1].line_num, 3);
    }

    #[test]
    fn test_undecodable_line_is_dropped() {
        let parsed = parse(
            "[SGI] back, SP=0x1ffffffffffffffff\n\
             [SGI] back, SP=0x10\n",
        );
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].line_num, 2);
        assert_eq!(parsed.dropped_lines, 1);
    }

    #[test]
    fn test_undecodable_continuation_drops_switch() {
        let parsed = parse(
            "[SGI] switching 1 -> 2\n\
             old_ctx.sp=0x1ffffffffffffffff new_ctx.sp=0x200\n\
             [SGI] back, SP=0x10\n",
        );
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].line_num, 3);
        assert_eq!(parsed.dropped_lines, 1);
    }

    #[test]
    fn test_exception_window_lines_still_classified() {
        let parsed = parse(
            "[Exception] Sync from EL1: EC=0x21, ISS=0x0\n\
             [SGI] back, SP=0x10\n\
             ELR=0x0, FAR=0x0, SPSR=0x5\n",
        );
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[0].kind, EventKind::Exception);
        assert!(matches!(parsed.events[1].kind, EventKind::Back { sp: 0x10 }));
        let exception = parsed.exception.unwrap();
        assert_eq!(exception.ec, 0x21);
        assert_eq!(exception.spsr, 0x5);
    }

    #[test]
    fn test_exception_window_is_bounded() {
        let mut log = String::from("[Exception] EC=0x25, ISS=0x0\n");
        for _ in 0..EXCEPTION_WINDOW {
            log.push_str("filler\n");
        }
        log.push_str("ELR=0x1234, FAR=0x10, SPSR=0x0\n");
        let exception = parse(&log).exception.unwrap();
        assert_eq!(exception.elr, 0);
        assert_eq!(exception.raw_lines.len(), EXCEPTION_WINDOW + 1);
    }

    #[test]
    fn test_only_first_exception_recorded() {
        let parsed = parse(
            "[Exception] EC=0x25, ISS=0x1\n\
             [Exception] EC=0x21, ISS=0x2\n",
        );
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.exception.unwrap().ec, 0x25);
    }

    #[test]
    fn test_lines_are_trimmed() {
        let parsed = parse("   [CTX BUG] stack corruption at 0x1000   \n");
        assert_eq!(
            parsed.events[0].kind,
            EventKind::CtxBug {
                text: "[CTX BUG] stack corruption at 0x1000".to_string()
            }
        );
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file(Path::new("/nonexistent/crash.log")).unwrap_err();
        assert!(matches!(err, AnalyzeError::Io { .. }));
    }
}
