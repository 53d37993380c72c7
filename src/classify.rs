//! Line classification for kernel crash logs
//!
//! Recognizes the primary event lines (`[SGI]`, `[IRQ]`, `[Exception]`,
//! `[CTX BUG]`), the three context-snapshot continuation dialects and the
//! two exception detail shapes. Patterns are searched anywhere in a line so
//! timestamps or console prefixes in front of the marker are tolerated.

use crate::decode::{parse_dec, parse_hex};
use crate::error::{DecodeError, Result};
use crate::event::{IrqFrame, Snapshot, Tid, Word};
use regex::{Captures, Regex};

const HEX: &str = r"(0x[0-9a-fA-F]+)";
const DEC: &str = r"([0-9]+)";

/// Outcome of decoding the fields of a matched line
pub type Decoded<T> = std::result::Result<T, DecodeError>;

/// Primary shape recognized on a line, with its decoded fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineShape {
    CtxBug,
    IrqEntry(IrqFrame),
    IrqExit(IrqFrame),
    Switching {
        from_tid: Tid,
        to_tid: Tid,
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
    ExceptionMarker {
        ec: Word,
        iss: Word,
    },
}

/// `ELR=.., FAR=.., SPSR=..` from an exception block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRegisters {
    pub elr: Word,
    pub far: Word,
    pub spsr: Word,
}

/// `Thread=.. ... SP=..` from an exception block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultOwner {
    pub thread: Tid,
    pub sp: Word,
}

/// Compiled line patterns
#[derive(Debug, Clone)]
pub struct LinePatterns {
    ctx_bug: Regex,
    irq_entry: Regex,
    irq_exit: Regex,
    switching: Regex,
    back: Regex,
    returned: Regex,
    exception: Regex,
    snapshot_with_elr: Regex,
    snapshot_with_handles: Regex,
    snapshot_legacy: Regex,
    fault_registers: Regex,
    fault_owner: Regex,
}

impl LinePatterns {
    /// Compile every pattern
    pub fn new() -> Result<Self> {
        Ok(Self {
            ctx_bug: Regex::new(r"\[CTX BUG\]")?,
            irq_entry: Regex::new(&format!(r"\[IRQ\] entry: tid={DEC} tpidr={HEX} sp={HEX}"))?,
            irq_exit: Regex::new(&format!(r"\[IRQ\] exit: tid={DEC} tpidr={HEX} sp={HEX}"))?,
            switching: Regex::new(&format!(r"\[SGI\] switching {DEC} -> {DEC}"))?,
            back: Regex::new(&format!(r"\[SGI\] back, SP={HEX}"))?,
            returned: Regex::new(&format!(
                r"\[SGI\] returned to tid={DEC} seq={DEC} SP={HEX} x30={HEX} ELR={HEX}"
            ))?,
            exception: Regex::new(&format!(r"\[Exception\].*EC={HEX},\s*ISS={HEX}"))?,
            snapshot_with_elr: Regex::new(&format!(
                r"SP_now={HEX}\s+new_ctx\.sp={HEX}\s+new_ctx\.elr={HEX}"
            ))?,
            snapshot_with_handles: Regex::new(&format!(
                r"SP_now={HEX}\s+old_ctx={HEX}\s+new_ctx={HEX}"
            ))?,
            snapshot_legacy: Regex::new(&format!(r"old_ctx\.sp={HEX}\s+new_ctx\.sp={HEX}"))?,
            fault_registers: Regex::new(&format!(r"ELR={HEX},\s*FAR={HEX},\s*SPSR={HEX}"))?,
            fault_owner: Regex::new(&format!(r"Thread={DEC}.*SP={HEX}"))?,
        })
    }

    /// Classify a primary event line
    ///
    /// Rules are tried in priority order: CTX BUG, IRQ entry, IRQ exit,
    /// switching, back, returned, exception. Only the first matching rule is
    /// evaluated; a decode failure in that rule is returned as-is and no
    /// lower-priority rule is tried.
    pub fn classify(&self, line: &str) -> Option<Decoded<LineShape>> {
        if self.ctx_bug.is_match(line) {
            return Some(Ok(LineShape::CtxBug));
        }
        if let Some(caps) = self.irq_entry.captures(line) {
            return Some(irq_frame(&caps).map(LineShape::IrqEntry));
        }
        if let Some(caps) = self.irq_exit.captures(line) {
            return Some(irq_frame(&caps).map(LineShape::IrqExit));
        }
        if let Some(caps) = self.switching.captures(line) {
            return Some(switching(&caps));
        }
        if let Some(caps) = self.back.captures(line) {
            return Some(hex(&caps, 1).map(|sp| LineShape::Back { sp }));
        }
        if let Some(caps) = self.returned.captures(line) {
            return Some(returned(&caps));
        }
        if let Some(caps) = self.exception.captures(line) {
            return Some(exception_marker(&caps));
        }
        None
    }

    /// Match a switch continuation line, newest dialect first
    pub fn snapshot(&self, line: &str) -> Option<Decoded<Snapshot>> {
        if let Some(caps) = self.snapshot_with_elr.captures(line) {
            return Some(snapshot_with_elr(&caps));
        }
        if let Some(caps) = self.snapshot_with_handles.captures(line) {
            return Some(snapshot_with_handles(&caps));
        }
        if let Some(caps) = self.snapshot_legacy.captures(line) {
            return Some(snapshot_legacy(&caps));
        }
        None
    }

    /// `ELR=.., FAR=.., SPSR=..` detail line
    pub fn fault_registers(&self, line: &str) -> Option<Decoded<FaultRegisters>> {
        let caps = self.fault_registers.captures(line)?;
        Some(fault_registers(&caps))
    }

    /// `Thread=.. ... SP=..` detail line
    pub fn fault_owner(&self, line: &str) -> Option<Decoded<FaultOwner>> {
        let caps = self.fault_owner.captures(line)?;
        Some(fault_owner(&caps))
    }
}

fn hex(caps: &Captures<'_>, group: usize) -> Decoded<Word> {
    parse_hex(&caps[group])
}

fn dec(caps: &Captures<'_>, group: usize) -> Decoded<u64> {
    parse_dec(&caps[group])
}

fn irq_frame(caps: &Captures<'_>) -> Decoded<IrqFrame> {
    Ok(IrqFrame {
        tid: dec(caps, 1)?,
        tpidr: hex(caps, 2)?,
        sp: hex(caps, 3)?,
    })
}

fn switching(caps: &Captures<'_>) -> Decoded<LineShape> {
    Ok(LineShape::Switching {
        from_tid: dec(caps, 1)?,
        to_tid: dec(caps, 2)?,
    })
}

fn returned(caps: &Captures<'_>) -> Decoded<LineShape> {
    Ok(LineShape::Returned {
        tid: dec(caps, 1)?,
        seq: dec(caps, 2)?,
        sp: hex(caps, 3)?,
        x30: hex(caps, 4)?,
        elr: hex(caps, 5)?,
    })
}

fn exception_marker(caps: &Captures<'_>) -> Decoded<LineShape> {
    Ok(LineShape::ExceptionMarker {
        ec: hex(caps, 1)?,
        iss: hex(caps, 2)?,
    })
}

fn snapshot_with_elr(caps: &Captures<'_>) -> Decoded<Snapshot> {
    Ok(Snapshot::WithElr {
        sp_now: hex(caps, 1)?,
        new_sp: hex(caps, 2)?,
        new_elr: hex(caps, 3)?,
    })
}

fn snapshot_with_handles(caps: &Captures<'_>) -> Decoded<Snapshot> {
    Ok(Snapshot::WithHandles {
        sp_now: hex(caps, 1)?,
        old_ctx: hex(caps, 2)?,
        new_ctx: hex(caps, 3)?,
    })
}

fn snapshot_legacy(caps: &Captures<'_>) -> Decoded<Snapshot> {
    Ok(Snapshot::Legacy {
        old_sp: hex(caps, 1)?,
        new_sp: hex(caps, 2)?,
    })
}

fn fault_registers(caps: &Captures<'_>) -> Decoded<FaultRegisters> {
    Ok(FaultRegisters {
        elr: hex(caps, 1)?,
        far: hex(caps, 2)?,
        spsr: hex(caps, 3)?,
    })
}

fn fault_owner(caps: &Captures<'_>) -> Decoded<FaultOwner> {
    Ok(FaultOwner {
        thread: dec(caps, 1)?,
        sp: hex(caps, 2)?,
    })
}
