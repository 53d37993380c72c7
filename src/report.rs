//! Text report rendering
//!
//! Output goes through a [`ReportSink`], which writes every line to the
//! primary writer and mirrors it to an optional output file.

use crate::analyzer::{Findings, ThreadElrReport, MAX_LISTED_ZERO_SEQS};
use crate::error::{AnalyzeError, Result};
use crate::event::{Event, EventKind, Snapshot};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const RULE_WIDTH: usize = 70;

/// Line-oriented writer with an optional file mirror
///
/// The mirror file is owned by the sink and flushed when the sink is
/// finished or dropped, so it is released on every exit path.
pub struct ReportSink<W: Write> {
    primary: W,
    mirror: Option<BufWriter<File>>,
}

impl<W: Write> ReportSink<W> {
    pub fn new(primary: W) -> Self {
        Self {
            primary,
            mirror: None,
        }
    }

    /// Create a sink that also writes to `path` (truncating it)
    pub fn with_mirror(primary: W, path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| AnalyzeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            primary,
            mirror: Some(BufWriter::new(file)),
        })
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.is_some()
    }

    /// Write one line to every destination
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.primary, "{}", text)?;
        if let Some(mirror) = self.mirror.as_mut() {
            writeln!(mirror, "{}", text)?;
        }
        Ok(())
    }

    /// Write a block of text line by line
    pub fn block(&mut self, text: &str) -> io::Result<()> {
        for line in text.lines() {
            self.line(line)?;
        }
        Ok(())
    }

    /// Flush all destinations and close the mirror file
    pub fn finish(mut self) -> io::Result<()> {
        self.primary.flush()?;
        if let Some(mut mirror) = self.mirror.take() {
            mirror.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for ReportSink<W> {
    fn drop(&mut self) {
        let _ = self.primary.flush();
        if let Some(mirror) = self.mirror.as_mut() {
            let _ = mirror.flush();
        }
    }
}

fn heading(sink: &mut ReportSink<impl Write>, title: &str) -> io::Result<()> {
    sink.line(&format!("\n{}", "-".repeat(RULE_WIDTH)))?;
    sink.line(title)?;
    sink.line(&"-".repeat(RULE_WIDTH))
}

/// Render the full text report
pub fn render_text(findings: &Findings, sink: &mut ReportSink<impl Write>) -> io::Result<()> {
    sink.line(&"=".repeat(RULE_WIDTH))?;
    sink.line("CRASH LOG ANALYSIS")?;
    sink.line(&"=".repeat(RULE_WIDTH))?;

    if !findings.ctx_bugs.is_empty() {
        sink.line("\n*** CONTEXT BUGS DETECTED ***")?;
        for bug in &findings.ctx_bugs {
            sink.line(&format!("  Line {}: {}", bug.line_num, bug.text))?;
        }
    }

    if let Some(exception) = &findings.exception {
        let record = &exception.record;
        heading(sink, "EXCEPTION DETAILS")?;
        sink.line(&format!("  Type: {}", exception.class_name))?;
        sink.line(&format!("  ELR: {:#x} (return address)", record.elr))?;
        sink.line(&format!("  FAR: {:#x} (fault address)", record.far))?;
        sink.line(&format!("  SPSR: {:#x}", record.spsr))?;
        sink.line(&format!("  Thread: {}", record.thread))?;
        sink.line(&format!("  SP: {:#x}", record.sp))?;

        if exception.elr_zero {
            sink.line("\n  *** ELR=0 BUG: Tried to execute at address 0! ***")?;
        }
        if exception.user_space_fault {
            sink.line(&format!(
                "\n  *** Data Abort accessing user-space address {:#x} ***",
                record.far
            ))?;
        }
    }

    sink.line(&format!("\nTotal events: {}", findings.total_events))?;
    sink.line(&format!("Context switches: {}", findings.switch_count))?;
    sink.line(&format!("Threads observed: {:?}", findings.threads_observed))?;

    heading(sink, "ELR VALUE ANALYSIS (new_ctx.elr at switch time)")?;
    for report in &findings.switch_elrs {
        if !report.zero_seqs.is_empty() {
            sink.line(&format!(
                "\n  *** Thread {} has ELR=0 at {} switch(es)! ***",
                report.tid,
                report.zero_seqs.len()
            ))?;
            for seq in report.zero_seqs.iter().take(MAX_LISTED_ZERO_SEQS) {
                sink.line(&format!("      seq={}", seq))?;
            }
        }
        render_distinct(sink, report, "new_ctx.elr")?;
    }
    if findings.switch_elr_zero_count() == 0 {
        sink.line("\n  No ELR=0 bugs detected in context switches!")?;
    }

    heading(sink, "RETURNED ELR ANALYSIS (after switch_context returns)")?;
    for report in &findings.returned_elrs {
        if !report.zero_seqs.is_empty() {
            sink.line(&format!(
                "\n  *** Thread {} returned with ELR=0 at {} time(s)! ***",
                report.tid,
                report.zero_seqs.len()
            ))?;
        }
        render_distinct(sink, report, "returned ELR")?;
    }

    heading(sink, "IRQ SP ANALYSIS")?;
    for report in &findings.irq_sps {
        sink.line(&format!("\nThread {} IRQ SP values:", report.tid))?;
        for vc in &report.values {
            sink.line(&format!("  {:#x}: {} times", vc.value, vc.count))?;
        }
    }

    heading(
        sink,
        &format!("LAST {} EVENTS BEFORE CRASH", findings.tail.len()),
    )?;
    for event in &findings.tail {
        sink.block(&render_event(event))?;
    }

    Ok(())
}

fn render_distinct(
    sink: &mut ReportSink<impl Write>,
    report: &ThreadElrReport,
    label: &str,
) -> io::Result<()> {
    if let Some(distinct) = &report.distinct {
        sink.line(&format!("\nThread {} {} values:", report.tid, label))?;
        for vc in distinct {
            sink.line(&format!("  {:#x}: {} times", vc.value, vc.count))?;
        }
    }
    Ok(())
}

/// One- or two-line rendering of an event for the tail window
pub fn render_event(event: &Event) -> String {
    let n = event.line_num;
    match &event.kind {
        EventKind::Switching {
            from_tid,
            to_tid,
            snapshot,
        } => {
            let head = format!("  [{}] SWITCH {} -> {}", n, from_tid, to_tid);
            match snapshot {
                Snapshot::None => head,
                Snapshot::WithElr {
                    sp_now,
                    new_sp,
                    new_elr,
                } => format!(
                    "{}\n         SP_now={:#x}  new_ctx.sp={:#x}  new_ctx.elr={:#x}",
                    head, sp_now, new_sp, new_elr
                ),
                Snapshot::WithHandles {
                    sp_now,
                    old_ctx,
                    new_ctx,
                } => format!(
                    "{}\n         SP_now={:#x}  old_ctx={:#x}  new_ctx={:#x}",
                    head, sp_now, old_ctx, new_ctx
                ),
                Snapshot::Legacy { old_sp, new_sp } => format!(
                    "{}\n         old_ctx.sp={:#x}  new_ctx.sp={:#x}",
                    head, old_sp, new_sp
                ),
            }
        }
        EventKind::Back { sp } => format!("  [{}] BACK SP={:#x}", n, sp),
        EventKind::Returned {
            tid,
            seq,
            sp,
            x30,
            elr,
        } => format!(
            "  [{}] RETURNED tid={} seq={}\n         SP={:#x}  x30={:#x}  ELR={:#x}",
            n, tid, seq, sp, x30, elr
        ),
        EventKind::IrqEntry(frame) => {
            format!("  [{}] IRQ_ENTRY tid={} sp={:#x}", n, frame.tid, frame.sp)
        }
        EventKind::IrqExit(frame) => {
            format!("  [{}] IRQ_EXIT tid={} sp={:#x}", n, frame.tid, frame.sp)
        }
        EventKind::Exception => format!("  [{}] *** EXCEPTION ***", n),
        EventKind::CtxBug { text } => format!("  [{}] *** CTX BUG: {}", n, text),
    }
}

/// Render the text report into a string
pub fn render_to_string(findings: &Findings) -> String {
    let mut buf = Vec::new();
    {
        let mut sink = ReportSink::new(&mut buf);
        // Writing into a Vec cannot fail
        let _ = render_text(findings, &mut sink);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
