//! Event model reconstructed from a crash log
//!
//! Every recognized log line becomes one [`Event`]. Values are immutable once
//! the parser has built them.

use serde::Serialize;

/// Register/address word as printed by the kernel
pub type Word = u64;

/// Thread identifier
pub type Tid = u64;

/// Context snapshot carried by the line after `[SGI] switching`
///
/// Kernel revisions printed three incompatible continuation formats. At most
/// one of them is attached to a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "dialect", rename_all = "snake_case")]
pub enum Snapshot {
    /// No continuation line matched
    #[default]
    None,
    /// `SP_now=.. new_ctx.sp=.. new_ctx.elr=..`
    WithElr {
        sp_now: Word,
        new_sp: Word,
        new_elr: Word,
    },
    /// `SP_now=.. old_ctx=.. new_ctx=..` (context pointers, not SPs)
    WithHandles {
        sp_now: Word,
        old_ctx: Word,
        new_ctx: Word,
    },
    /// `old_ctx.sp=.. new_ctx.sp=..`
    Legacy { old_sp: Word, new_sp: Word },
}

impl Snapshot {
    /// ELR the incoming thread will resume at, when the dialect records one
    pub fn new_elr(&self) -> Option<Word> {
        match self {
            Snapshot::WithElr { new_elr, .. } => Some(*new_elr),
            _ => None,
        }
    }

    /// Stack pointer observed at the moment of the switch
    pub fn sp_now(&self) -> Option<Word> {
        match self {
            Snapshot::WithElr { sp_now, .. } | Snapshot::WithHandles { sp_now, .. } => {
                Some(*sp_now)
            }
            _ => None,
        }
    }
}

/// Register state logged on IRQ entry or exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrqFrame {
    pub tid: Tid,
    pub tpidr: Word,
    pub sp: Word,
}

/// Event payload, one variant per recognized line shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Switching {
        from_tid: Tid,
        to_tid: Tid,
        snapshot: Snapshot,
    },
    Back {
        sp: Word,
    },
    Returned {
        tid: Tid,
        seq: u64,
        sp: Word,
        x30: Word,
        elr: Word,
    },
    IrqEntry(IrqFrame),
    IrqExit(IrqFrame),
    /// Marker only, details live in [`ExceptionRecord`]
    Exception,
    CtxBug {
        text: String,
    },
}

/// One event in the reconstructed timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// 1-based line number of the originating log line
    pub line_num: usize,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(line_num: usize, kind: EventKind) -> Self {
        Self { line_num, kind }
    }

    /// Sequence number supplied by the event itself (only `returned` has one)
    pub fn seq(&self) -> Option<u64> {
        match self.kind {
            EventKind::Returned { seq, .. } => Some(seq),
            _ => None,
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(self.kind, EventKind::Switching { .. })
    }
}

/// Details of the first exception block found in the log
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ExceptionRecord {
    pub line_num: usize,
    /// Exception class
    pub ec: Word,
    /// Instruction-specific syndrome
    pub iss: Word,
    pub elr: Word,
    pub far: Word,
    pub spsr: Word,
    pub thread: Tid,
    pub sp: Word,
    /// Marker line followed by every line of the lookahead window
    pub raw_lines: Vec<String>,
}
