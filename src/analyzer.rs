//! Irregularity analysis over the reconstructed timeline
//!
//! One forward pass collects per-thread observations, then a fixed set of
//! heuristics turns them into [`Findings`]. Nothing here performs I/O; the
//! report modules render the findings.

use crate::event::{Event, EventKind, ExceptionRecord, Tid, Word};
use crate::parser::ParsedLog;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Exception class of a data abort taken at the current EL
pub const EC_DATA_ABORT: Word = 0x25;

/// Fault addresses below this are assumed to be user-space
pub const USER_SPACE_LIMIT: Word = 0x4000_0000;

/// Threads with more distinct ELR values than this get no value breakdown
pub const MAX_DISTINCT_ELRS: usize = 5;

/// Sequence numbers listed for zero switch ELRs
pub const MAX_LISTED_ZERO_SEQS: usize = 5;

/// Default size of the event tail window
pub const DEFAULT_TAIL_LEN: usize = 40;

/// Human-readable name of an exception class
pub fn exception_class_name(ec: Word) -> String {
    match ec {
        0x00 => "Unknown/Undefined".to_string(),
        0x0e => "Illegal Execution State".to_string(),
        0x21 => "Instruction Abort (EL1)".to_string(),
        0x22 => "PC Alignment".to_string(),
        EC_DATA_ABORT => "Data Abort (EL1)".to_string(),
        other => format!("EC={:#x}", other),
    }
}

/// Settings for one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Number of trailing events to include in the report
    pub tail_len: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tail_len: DEFAULT_TAIL_LEN,
        }
    }
}

/// A `[CTX BUG]` line reported verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CtxBugFinding {
    pub line_num: usize,
    pub text: String,
}

/// Exception record with the checks applied to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionFinding {
    pub record: ExceptionRecord,
    pub class_name: String,
    /// Return address is exactly zero
    pub elr_zero: bool,
    /// Data abort on a low (user-space) address
    pub user_space_fault: bool,
}

/// How often a value was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: Word,
    pub count: usize,
}

/// ELR observations for one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadElrReport {
    pub tid: Tid,
    pub observations: usize,
    /// Sequence numbers at which the ELR was zero, in file order
    pub zero_seqs: Vec<u64>,
    /// Distinct values with counts, absent when there are too many
    pub distinct: Option<Vec<ValueCount>>,
}

/// IRQ stack pointers seen for one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSpReport {
    pub tid: Tid,
    pub values: Vec<ValueCount>,
}

/// Everything the report renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Findings {
    pub ctx_bugs: Vec<CtxBugFinding>,
    pub exception: Option<ExceptionFinding>,
    pub total_events: usize,
    pub switch_count: usize,
    pub threads_observed: Vec<Tid>,
    /// `new_ctx.elr` values at switch time, keyed by incoming thread
    pub switch_elrs: Vec<ThreadElrReport>,
    /// ELR values after `switch_context` returned
    pub returned_elrs: Vec<ThreadElrReport>,
    pub irq_sps: Vec<ThreadSpReport>,
    /// Last events of the timeline, in file order
    pub tail: Vec<Event>,
}

impl Findings {
    /// Total zero ELRs seen at switch time
    pub fn switch_elr_zero_count(&self) -> usize {
        self.switch_elrs.iter().map(|r| r.zero_seqs.len()).sum()
    }
}

/// Per-thread observations gathered in the forward pass
#[derive(Debug, Default)]
struct Observations {
    returned_sps: BTreeMap<Tid, Vec<(u64, Word)>>,
    returned_elrs: BTreeMap<Tid, Vec<(u64, Word)>>,
    switch_elrs: BTreeMap<Tid, Vec<(u64, Word)>>,
    irq_sps: BTreeMap<Tid, Vec<(u64, Word)>>,
}

impl Observations {
    fn collect(events: &[Event]) -> Self {
        let mut obs = Self::default();
        let mut current_seq = 0u64;

        for event in events {
            if let Some(seq) = event.seq() {
                current_seq = seq;
            }

            match &event.kind {
                EventKind::Switching {
                    to_tid, snapshot, ..
                } => {
                    if let Some(elr) = snapshot.new_elr() {
                        obs.switch_elrs
                            .entry(*to_tid)
                            .or_default()
                            .push((current_seq, elr));
                    }
                }
                EventKind::Returned {
                    tid, seq, sp, elr, ..
                } => {
                    obs.returned_sps.entry(*tid).or_default().push((*seq, *sp));
                    obs.returned_elrs.entry(*tid).or_default().push((*seq, *elr));
                }
                EventKind::IrqEntry(frame) | EventKind::IrqExit(frame) => {
                    obs.irq_sps
                        .entry(frame.tid)
                        .or_default()
                        .push((current_seq, frame.sp));
                }
                EventKind::Back { .. } | EventKind::Exception | EventKind::CtxBug { .. } => {}
            }
        }

        obs
    }
}

/// Count each distinct value, ascending by value
fn value_counts(samples: &[(u64, Word)]) -> Vec<ValueCount> {
    let mut counts: BTreeMap<Word, usize> = BTreeMap::new();
    for (_, value) in samples {
        *counts.entry(*value).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect()
}

fn elr_report(tid: Tid, samples: &[(u64, Word)]) -> ThreadElrReport {
    let zero_seqs = samples
        .iter()
        .filter(|(_, elr)| *elr == 0)
        .map(|(seq, _)| *seq)
        .collect();
    let counts = value_counts(samples);
    let distinct = (counts.len() <= MAX_DISTINCT_ELRS).then_some(counts);

    ThreadElrReport {
        tid,
        observations: samples.len(),
        zero_seqs,
        distinct,
    }
}

fn exception_finding(record: &ExceptionRecord) -> ExceptionFinding {
    ExceptionFinding {
        record: record.clone(),
        class_name: exception_class_name(record.ec),
        elr_zero: record.elr == 0,
        user_space_fault: record.ec == EC_DATA_ABORT && record.far < USER_SPACE_LIMIT,
    }
}

/// Run every heuristic over a parsed log
pub fn analyze(parsed: &ParsedLog, config: &AnalysisConfig) -> Findings {
    let events = &parsed.events;
    let obs = Observations::collect(events);

    let ctx_bugs = events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::CtxBug { text } => Some(CtxBugFinding {
                line_num: event.line_num,
                text: text.clone(),
            }),
            _ => None,
        })
        .collect();

    let threads_observed: BTreeSet<Tid> = obs
        .returned_sps
        .keys()
        .chain(obs.switch_elrs.keys())
        .copied()
        .collect();

    let switch_elrs = obs
        .switch_elrs
        .iter()
        .map(|(tid, samples)| elr_report(*tid, samples))
        .collect();

    // A single return cannot show variation
    let returned_elrs = obs
        .returned_elrs
        .iter()
        .filter(|(_, samples)| samples.len() >= 2)
        .map(|(tid, samples)| elr_report(*tid, samples))
        .collect();

    let irq_sps = obs
        .irq_sps
        .iter()
        .map(|(tid, samples)| ThreadSpReport {
            tid: *tid,
            values: value_counts(samples),
        })
        .collect();

    let findings = Findings {
        ctx_bugs,
        exception: parsed.exception.as_ref().map(exception_finding),
        total_events: events.len(),
        switch_count: events.iter().filter(|e| e.is_switch()).count(),
        threads_observed: threads_observed.into_iter().collect(),
        switch_elrs,
        returned_elrs,
        irq_sps,
        tail: tail_window(events, config.tail_len).to_vec(),
    };

    tracing::info!(
        ctx_bugs = findings.ctx_bugs.len(),
        zero_switch_elrs = findings.switch_elr_zero_count(),
        threads = findings.threads_observed.len(),
        "analysis complete"
    );
    findings
}

/// The last `len` events, or all of them when fewer exist
pub fn tail_window(events: &[Event], len: usize) -> &[Event] {
    &events[events.len().saturating_sub(len)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{IrqFrame, Snapshot};

    fn returned(line_num: usize, tid: Tid, seq: u64, elr: Word) -> Event {
        Event::new(
            line_num,
            EventKind::Returned {
                tid,
                seq,
                sp: 0x4100_0000 + tid * 0x1000,
                x30: 0x4000_0000,
                elr,
            },
        )
    }

    fn switch(line_num: usize, to_tid: Tid, new_elr: Word) -> Event {
        Event::new(
            line_num,
            EventKind::Switching {
                from_tid: 0,
                to_tid,
                snapshot: Snapshot::WithElr {
                    sp_now: 0x4000,
                    new_sp: 0x5000,
                    new_elr,
                },
            },
        )
    }

    fn log(events: Vec<Event>) -> ParsedLog {
        ParsedLog {
            lines_scanned: events.len(),
            events,
            ..ParsedLog::default()
        }
    }

    #[test]
    fn test_exception_class_names() {
        assert_eq!(exception_class_name(0x25), "Data Abort (EL1)");
        assert_eq!(exception_class_name(0x0e), "Illegal Execution State");
        assert_eq!(exception_class_name(0x3c), "EC=0x3c");
    }

    #[test]
    fn test_switch_elr_uses_carried_sequence() {
        let parsed = log(vec![
            returned(1, 1, 7, 0x4008_0000),
            switch(2, 2, 0),
            Event::new(3, EventKind::Back { sp: 0x10 }),
            switch(4, 2, 0),
            returned(5, 2, 9, 0x4008_0000),
            switch(6, 2, 0x4008_1000),
        ]);
        let findings = analyze(&parsed, &AnalysisConfig::default());

        assert_eq!(findings.switch_elrs.len(), 1);
        let report = &findings.switch_elrs[0];
        assert_eq!(report.tid, 2);
        assert_eq!(report.zero_seqs, vec![7, 7]);
        assert_eq!(
            report.distinct.as_deref(),
            Some(&[
                ValueCount { value: 0, count: 2 },
                ValueCount {
                    value: 0x4008_1000,
                    count: 1
                },
            ][..])
        );
        assert_eq!(findings.switch_elr_zero_count(), 2);
    }

    #[test]
    fn test_non_elr_dialects_contribute_nothing() {
        let parsed = log(vec![Event::new(
            1,
            EventKind::Switching {
                from_tid: 1,
                to_tid: 2,
                snapshot: Snapshot::WithHandles {
                    sp_now: 1,
                    old_ctx: 2,
                    new_ctx: 0,
                },
            },
        )]);
        let findings = analyze(&parsed, &AnalysisConfig::default());
        assert!(findings.switch_elrs.is_empty());
        assert_eq!(findings.switch_count, 1);
        assert!(findings.threads_observed.is_empty());
    }

    #[test]
    fn test_high_cardinality_returned_elrs_omit_breakdown() {
        let events = (0..6)
            .map(|i| returned(i + 1, 3, i as u64, if i == 2 { 0 } else { 0x1000 * (i as u64 + 1) }))
            .collect();
        let findings = analyze(&log(events), &AnalysisConfig::default());

        let report = &findings.returned_elrs[0];
        assert_eq!(report.tid, 3);
        assert_eq!(report.observations, 6);
        assert!(report.distinct.is_none());
        assert_eq!(report.zero_seqs, vec![2]);
    }

    #[test]
    fn test_single_return_skipped() {
        let findings = analyze(
            &log(vec![returned(1, 4, 1, 0)]),
            &AnalysisConfig::default(),
        );
        assert!(findings.returned_elrs.is_empty());
        assert_eq!(findings.threads_observed, vec![4]);
    }

    #[test]
    fn test_irq_sps_uncapped() {
        let events = (0..8)
            .map(|i| {
                let frame = IrqFrame {
                    tid: 1,
                    tpidr: 0,
                    sp: 0x100 * (i as u64 % 7),
                };
                if i % 2 == 0 {
                    Event::new(i + 1, EventKind::IrqEntry(frame))
                } else {
                    Event::new(i + 1, EventKind::IrqExit(frame))
                }
            })
            .collect();
        let findings = analyze(&log(events), &AnalysisConfig::default());
        assert_eq!(findings.irq_sps.len(), 1);
        assert_eq!(findings.irq_sps[0].values.len(), 7);
        assert_eq!(findings.irq_sps[0].values[0], ValueCount { value: 0, count: 2 });
    }

    #[test]
    fn test_exception_checks() {
        let parsed = ParsedLog {
            events: vec![Event::new(1, EventKind::Exception)],
            exception: Some(ExceptionRecord {
                line_num: 1,
                ec: EC_DATA_ABORT,
                far: 0x25,
                ..ExceptionRecord::default()
            }),
            ..ParsedLog::default()
        };
        let finding = analyze(&parsed, &AnalysisConfig::default())
            .exception
            .unwrap();
        assert!(finding.elr_zero);
        assert!(finding.user_space_fault);
        assert_eq!(finding.class_name, "Data Abort (EL1)");
    }

    #[test]
    fn test_high_far_or_other_class_not_user_space() {
        let high = ExceptionRecord {
            ec: EC_DATA_ABORT,
            far: USER_SPACE_LIMIT,
            elr: 0x4000_1000,
            ..ExceptionRecord::default()
        };
        let finding = exception_finding(&high);
        assert!(!finding.user_space_fault);
        assert!(!finding.elr_zero);

        let other = ExceptionRecord {
            ec: 0x21,
            far: 0x10,
            ..ExceptionRecord::default()
        };
        assert!(!exception_finding(&other).user_space_fault);
    }

    #[test]
    fn test_ctx_bugs_collected_in_order() {
        let parsed = log(vec![
            Event::new(
                2,
                EventKind::CtxBug {
                    text: "[CTX BUG] a".into(),
                },
            ),
            Event::new(5, EventKind::Back { sp: 0 }),
            Event::new(
                9,
                EventKind::CtxBug {
                    text: "[CTX BUG] b".into(),
                },
            ),
        ]);
        let findings = analyze(&parsed, &AnalysisConfig::default());
        let lines: Vec<usize> = findings.ctx_bugs.iter().map(|b| b.line_num).collect();
        assert_eq!(lines, vec![2, 9]);
    }

    #[test]
    fn test_tail_window() {
        let events: Vec<Event> = (1..=100)
            .map(|n| Event::new(n, EventKind::Back { sp: n as u64 }))
            .collect();
        let tail = tail_window(&events, 40);
        assert_eq!(tail.len(), 40);
        assert_eq!(tail[0].line_num, 61);
        assert_eq!(tail[39].line_num, 100);

        assert_eq!(tail_window(&events[..3], 40).len(), 3);
    }
}
