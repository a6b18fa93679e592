//! Forth-aware memory annotator used by the dump mode: three ordered
//! heuristics that each try to recognize a structure starting at an
//! address and report how many 32-bit cells it occupies.
//!
//! Grounded in `original_source/memory.c::mem_dump`'s call order
//! (`forth_is_header` -> `forth_is_word` -> `forth_is_string` -> plain
//! disassembly fallback). The three heuristics themselves aren't in the
//! kept source — `sim.h` only declares them, their bodies live in a file
//! this pack doesn't carry — so they're built directly from spec.md
//! §4.7's description of what each one looks for.

use arm_cpu::decode::bits;
use arm_cpu::{decode, Tag};
use arm_disasm::Annotations;
use sim_core::Machine;

const MAX_NAME_LEN: u32 = 31;
const MAX_PAD_BYTES: u32 = 4;
const MAX_STRING_LEN: u32 = 255;

/// The `next`-thread instruction `arm-disasm` also special-cases; a code
/// field pointing straight at the inner interpreter's dispatch loop
/// rather than at a named routine.
const NEXT_THREAD_INSTR: u32 = 0xE494_F004;

/// What was recognized at an address, and how many 32-bit cells it
/// occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// A dictionary header: padding, a printable name, a length byte
    /// equal to the name's length, and a plausible link field.
    Header { name_len: u32, cells: u32 },
    /// A code field pointing at a known code-field routine or at the
    /// inner interpreter's `next` thread.
    CodeField,
    /// An inline Forth counted string: a length byte followed by that
    /// many bytes of string data.
    CountedString { len: u32, cells: u32 },
}

impl Cell {
    #[must_use]
    pub const fn cells(self) -> u32 {
        match self {
            Self::Header { cells, .. } | Self::CountedString { cells, .. } => cells,
            Self::CodeField => 1,
        }
    }
}

fn is_printable(b: u8) -> bool {
    b.is_ascii_graphic()
}

/// `forth_is_header`: padding, then a run of printable name bytes, then
/// a length byte matching the run's length, then a word-aligned link
/// field that's either null or a valid address.
fn is_header(machine: &Machine, addr: u32) -> Option<Cell> {
    let mut cursor = addr;
    let mut pad = 0u32;
    while pad < MAX_PAD_BYTES && machine.memory().load_byte(cursor) == 0 {
        cursor = cursor.wrapping_add(1);
        pad += 1;
    }

    let mut name_len = 0u32;
    while name_len < MAX_NAME_LEN && is_printable(machine.memory().load_byte(cursor)) {
        cursor = cursor.wrapping_add(1);
        name_len += 1;
    }
    if name_len == 0 {
        return None;
    }

    let length_byte = machine.memory().load_byte(cursor);
    if u32::from(length_byte) != name_len {
        return None;
    }
    cursor = cursor.wrapping_add(1);

    let link_addr = cursor.wrapping_add(3) & !3;
    let link = machine.memory().load_word(link_addr);
    if link != 0 && !machine.memory().range_valid(link, 4) {
        return None;
    }

    let total_bytes = link_addr.wrapping_add(4).wrapping_sub(addr);
    Some(Cell::Header {
        name_len,
        cells: total_bytes.div_ceil(4),
    })
}

fn sign_extend24(value: u32) -> i32 {
    ((value << 8) as i32) >> 8
}

/// `forth_is_word`: the word at `addr` is either the `next`-thread
/// instruction or a branch whose target is one of the known code-field
/// routines (`dovar`/`docons`/`dodoes`/`docolon`).
fn is_code_field(machine: &Machine, addr: u32, annotations: &Annotations) -> Option<Cell> {
    let instr = machine.memory().load_word(addr);
    if instr == NEXT_THREAD_INSTR {
        return Some(Cell::CodeField);
    }
    if let Tag::Branch { .. } = decode::decode(instr) {
        let imm24 = bits(instr, 0, 24);
        let offset = sign_extend24(imm24) << 2;
        let dest = addr.wrapping_add(8).wrapping_add(offset as u32);
        if annotations.name_for(dest).is_some() {
            return Some(Cell::CodeField);
        }
    }
    None
}

/// `forth_is_string`: a length byte followed by that many printable (or
/// space) bytes.
fn is_counted_string(machine: &Machine, addr: u32) -> Option<Cell> {
    let len = u32::from(machine.memory().load_byte(addr));
    if len == 0 || len > MAX_STRING_LEN {
        return None;
    }
    for i in 0..len {
        let b = machine.memory().load_byte(addr.wrapping_add(1).wrapping_add(i));
        if !(is_printable(b) || b == b' ') {
            return None;
        }
    }
    let total_bytes = 1 + len;
    Some(Cell::CountedString {
        len,
        cells: total_bytes.div_ceil(4),
    })
}

/// Try each heuristic in the order `mem_dump` does; the first match
/// wins.
#[must_use]
pub fn classify(machine: &Machine, addr: u32, annotations: &Annotations) -> Option<Cell> {
    is_header(machine, addr)
        .or_else(|| is_code_field(machine, addr, annotations))
        .or_else(|| is_counted_string(machine, addr))
}

fn describe(cell: Cell) -> String {
    match cell {
        Cell::Header { name_len, .. } => format!("(header, name len {name_len})"),
        Cell::CodeField => "(code field)".to_string(),
        Cell::CountedString { len, .. } => format!("(counted string, len {len})"),
    }
}

/// Dump `n_words` cells of guest memory starting at `addr`, one line per
/// cell consumed. Matches `mem_dump`'s walk: classify, fall back to
/// disassembly (or a bare `0`) when nothing recognizes the cell, then
/// advance by however many cells were consumed.
///
/// Unlike the original, a matched heuristic still produces a line (the
/// original silently skips over recognized cells without printing
/// anything) — a dump that skips dictionary headers and strings without
/// comment isn't much of an inspector.
#[must_use]
pub fn dump(machine: &Machine, addr: u32, n_words: u32, annotations: &Annotations) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cursor = addr;
    let mut remaining = n_words;

    while remaining > 0 {
        let instr = machine.memory().load_word(cursor);
        let (skip, label) = match classify(machine, cursor, annotations) {
            Some(cell) => (cell.cells().max(1), describe(cell)),
            None if instr == 0 => (1, "0".to_string()),
            None => (1, arm_disasm::disassemble(machine, cursor, instr, annotations)),
        };

        lines.push(format!("{cursor:08x}: {instr:08x} {label}"));

        cursor = cursor.wrapping_add(4 * skip);
        remaining = if skip > remaining { 0 } else { remaining - skip };
    }

    lines
}
