//! ARMv4T disassembler: one pure function from a fetched word to a text
//! line. Grounded directly in `original_source/disassemble.c` — the
//! mnemonic table, the fixed 8-column mnemonic field, and the
//! operand-formatting cases per tag all follow it closely, generalized
//! to cover the two tags (`Multiply`, `HalfSignedTransfer`) the original
//! falls through to `"(unknown instr)"` for, since `arm-cpu::decode`
//! classifies them and a complete disassembler should describe them too.

use arm_cpu::decode::{bit, bits, HalfKind};
use arm_cpu::{decode, DpOp, DpOperand, MulOp, Tag};
use sim_core::{Machine, PC};

const CONDS: [&str; 16] = [
    "eq", "ne", "hs", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le", "", "??",
];
const OPCODES: [&str; 16] = [
    "and", "eor", "sub", "rsb", "add", "adc", "sbc", "rsc", "tst", "teq", "cmp", "cmn", "orr",
    "mov", "bic", "mvn",
];
const SHIFTS: [&str; 4] = ["lsl", "lsr", "asr", "ror"];

const MNEMONIC_FIELD_WIDTH: usize = 8;

/// Addresses of the four inner-interpreter code-field routines, used to
/// annotate branch targets the way `original_source/disassemble.c` checks
/// its `dovar_addr`/`docons_addr`/`dodoes_addr`/`docolon_addr` globals.
/// Unlike the original, which sets those from link-time knowledge of its
/// own kernel build, this simulator doesn't know them a priori: the
/// caller (typically the driver, after inspecting the loaded image)
/// supplies whichever it has found.
#[derive(Debug, Clone, Copy, Default)]
pub struct Annotations {
    pub dovar: Option<u32>,
    pub docons: Option<u32>,
    pub dodoes: Option<u32>,
    pub docolon: Option<u32>,
}

impl Annotations {
    #[must_use]
    pub fn name_for(&self, target: u32) -> Option<&'static str> {
        if self.dovar == Some(target) {
            Some("dovar")
        } else if self.docons == Some(target) {
            Some("docons")
        } else if self.dodoes == Some(target) {
            Some("dodoes")
        } else if self.docolon == Some(target) {
            Some("docolon")
        } else {
            None
        }
    }
}

fn reg_name(idx: u32) -> &'static str {
    sim_core::registers::REGISTER_NAMES[idx as usize]
}

fn pad_mnemonic(mnemonic: &str) -> String {
    if mnemonic.len() >= MNEMONIC_FIELD_WIDTH {
        format!("{mnemonic} ")
    } else {
        format!("{mnemonic:<width$}", width = MNEMONIC_FIELD_WIDTH)
    }
}

const fn sign_extend_shifted(value: u32, width: u32, left_shift: u32) -> i32 {
    let widened = value << left_shift;
    let total_width = width + left_shift;
    let shift = 32 - total_width;
    ((widened << shift) as i32) >> shift
}

/// Disassemble one instruction word fetched from `addr`. Peeks `machine`
/// for PC-relative literal loads, the same annotation
/// `original_source/disassemble.c` prints next to `ldr rX, [pc, #N]`.
#[must_use]
pub fn disassemble(machine: &Machine, addr: u32, instr: u32, annotations: &Annotations) -> String {
    if instr == 0xE494_F004 {
        return "next".to_string();
    }

    let cond = decode::cond(instr) as usize;
    let rm = bits(instr, 0, 4);
    let rs = bits(instr, 8, 4);
    let rd = bits(instr, 12, 4);
    let rn = bits(instr, 16, 4);
    let imm12 = bits(instr, 0, 12);
    let imm24 = bits(instr, 0, 24);
    let imm5shift = bits(instr, 7, 5);
    let set_conds = bit(instr, 20);
    let shift_type = bits(instr, 5, 2) as usize;
    let write_back = bit(instr, 21);
    let up = bit(instr, 23);
    let pre = bit(instr, 24);

    match decode::decode(instr) {
        Tag::Illegal => "(unknown instr)".to_string(),
        Tag::Swi => format!("{}{imm24:x}", pad_mnemonic(&format!("swi{}", CONDS[cond]))),
        Tag::Branch { link } => {
            let mnemonic = format!("b{}{}", if link { "l" } else { "" }, CONDS[cond]);
            let offset = sign_extend_shifted(imm24, 24, 2);
            let dest = addr.wrapping_add(8).wrapping_add(offset as u32);
            let mut line = format!("{}{dest:x}", pad_mnemonic(&mnemonic));
            if let Some(name) = annotations.name_for(dest) {
                line.push_str(&format!(" ; {name}"));
            }
            line
        }
        Tag::DataProcessing { op, operand } => {
            disassemble_data_processing(instr, op, operand, cond, rd, rn, rm, rs, set_conds, imm5shift, shift_type)
        }
        Tag::Multiply(kind) => disassemble_multiply(kind, cond, set_conds, rd, rn, rm, rs),
        Tag::SingleTransfer { load, byte, register_offset } => disassemble_single_transfer(
            machine, addr, load, byte, register_offset, cond, rd, rn, rm, imm12, imm5shift, shift_type, write_back, up, pre,
        ),
        Tag::HalfSignedTransfer { load, kind } => {
            disassemble_half_signed(instr, load, kind, cond, rd, rn, write_back, up, pre)
        }
        Tag::BlockTransfer { load } => disassemble_block_transfer(instr, load, cond, rn, write_back, up, pre),
    }
}

#[allow(clippy::too_many_arguments)]
fn disassemble_data_processing(
    instr: u32,
    op: DpOp,
    operand: DpOperand,
    cond: usize,
    rd: u32,
    rn: u32,
    rm: u32,
    rs: u32,
    set_conds: bool,
    imm5shift: u32,
    shift_type: usize,
) -> String {
    let opcode_idx = bits(instr, 21, 4) as usize;
    let is_test = op.is_test();
    let mnemonic = format!(
        "{}{}{}",
        OPCODES[opcode_idx],
        CONDS[cond],
        if set_conds && !is_test { "s" } else { "" }
    );

    let operand2 = match operand {
        DpOperand::Immediate => {
            let imm8 = bits(instr, 0, 8);
            let rot = bits(instr, 8, 4) * 2;
            format!("#{:08x}", imm8.rotate_right(rot))
        }
        DpOperand::RegisterImmediateShift => {
            if imm5shift == 0 {
                reg_name(rm).to_string()
            } else {
                format!("{} {} #{imm5shift}", reg_name(rm), SHIFTS[shift_type])
            }
        }
        DpOperand::RegisterRegisterShift => {
            format!("{} {} {}", reg_name(rm), SHIFTS[shift_type], reg_name(rs))
        }
    };

    let operands = if op.is_test() {
        format!("{}, {operand2}", reg_name(rn))
    } else if matches!(op, DpOp::Mov | DpOp::Mvn) {
        format!("{}, {operand2}", reg_name(rd))
    } else {
        format!("{}, {}, {operand2}", reg_name(rd), reg_name(rn))
    };

    format!("{}{operands}", pad_mnemonic(&mnemonic))
}

/// `rd`/`rn` here are the top-level bit-12-15/bit-16-19 fields, which the
/// multiply encoding repurposes: for MUL/MLA, `rn` (16..19) is the
/// destination `Rd` and `rd` (12..15) is MLA's accumulate operand; for
/// the long forms, `rn` is `RdHi` and `rd` is `RdLo`.
fn disassemble_multiply(kind: MulOp, cond: usize, set_conds: bool, rd: u32, rn: u32, rm: u32, rs: u32) -> String {
    let base = match kind {
        MulOp::Mul => "mul",
        MulOp::Mla => "mla",
        MulOp::Umull => "umull",
        MulOp::Umlal => "umlal",
        MulOp::Smull => "smull",
        MulOp::Smlal => "smlal",
    };
    let mnemonic = format!("{base}{}{}", CONDS[cond], if set_conds { "s" } else { "" });
    let operands = match kind {
        MulOp::Mul => format!("{}, {}, {}", reg_name(rn), reg_name(rm), reg_name(rs)),
        MulOp::Mla => format!("{}, {}, {}, {}", reg_name(rn), reg_name(rm), reg_name(rs), reg_name(rd)),
        MulOp::Umull | MulOp::Umlal | MulOp::Smull | MulOp::Smlal => {
            format!("{}, {}, {}, {}", reg_name(rd), reg_name(rn), reg_name(rm), reg_name(rs))
        }
    };
    format!("{}{operands}", pad_mnemonic(&mnemonic))
}

#[allow(clippy::too_many_arguments)]
fn disassemble_single_transfer(
    machine: &Machine,
    addr: u32,
    load: bool,
    byte: bool,
    register_offset: bool,
    cond: usize,
    rd: u32,
    rn: u32,
    rm: u32,
    imm12: u32,
    imm5shift: u32,
    shift_type: usize,
    write_back: bool,
    up: bool,
    pre: bool,
) -> String {
    let mnemonic = format!("{}{}{}", if load { "ldr" } else { "str" }, CONDS[cond], if byte { "b" } else { "" });

    let offset_text = if register_offset {
        if imm5shift == 0 {
            format!(", {}", reg_name(rm))
        } else {
            format!(", {} {} {imm5shift}", reg_name(rm), SHIFTS[shift_type])
        }
    } else if imm12 != 0 {
        format!(", {}{imm12}", if up { "" } else { "-" })
    } else {
        String::new()
    };

    // PC-relative literal load: `original_source/disassemble.c` peeks
    // memory at the effective address (fetch + 8 + offset) and prints the
    // loaded value as a comment.
    let pc_literal = if rn == PC as u32 && !register_offset {
        let signed_offset: i64 = if up { i64::from(imm12) } else { -i64::from(imm12) };
        let target = (i64::from(addr) + 8 + signed_offset) as u32;
        let value = machine.memory().load_word(target);
        if byte {
            Some(format!(";  # {:#04x}", value & 0xFF))
        } else {
            Some(format!(";  # {value:#010x}"))
        }
    } else {
        None
    };

    let body = if pre {
        format!("{}, [{}{offset_text}]{}", reg_name(rd), reg_name(rn), if write_back { "!" } else { "" })
    } else {
        format!("{}, [{}]{offset_text}", reg_name(rd), reg_name(rn))
    };

    match pc_literal {
        Some(note) => format!("{}{body}{note}", pad_mnemonic(&mnemonic)),
        None => format!("{}{body}", pad_mnemonic(&mnemonic)),
    }
}

fn disassemble_half_signed(
    instr: u32,
    load: bool,
    kind: HalfKind,
    cond: usize,
    rd: u32,
    rn: u32,
    write_back: bool,
    up: bool,
    pre: bool,
) -> String {
    let suffix = match (load, kind) {
        (true, HalfKind::UnsignedHalf) => "ldrh",
        (true, HalfKind::SignedHalf) => "ldrsh",
        (true, HalfKind::SignedByte) => "ldrsb",
        (false, _) => "strh",
    };
    let mnemonic = format!("{suffix}{}", CONDS[cond]);

    let offset_text = if bit(instr, 22) {
        let off = (bits(instr, 8, 4) << 4) | bits(instr, 0, 4);
        if off == 0 {
            String::new()
        } else {
            format!(", {}{off}", if up { "" } else { "-" })
        }
    } else {
        let rm = bits(instr, 0, 4);
        format!(", {}", reg_name(rm))
    };

    let body = if pre {
        format!("{}, [{}{offset_text}]{}", reg_name(rd), reg_name(rn), if write_back { "!" } else { "" })
    } else {
        format!("{}, [{}]{offset_text}", reg_name(rd), reg_name(rn))
    };
    format!("{}{body}", pad_mnemonic(&mnemonic))
}

fn disassemble_block_transfer(instr: u32, load: bool, cond: usize, rn: u32, write_back: bool, up: bool, pre: bool) -> String {
    let mnemonic = format!(
        "{}{}{}{}",
        if load { "ldm" } else { "stm" },
        CONDS[cond],
        if up { "i" } else { "d" },
        if pre { "b" } else { "a" },
    );
    let mut list = String::from("{");
    let mut first = true;
    for i in 0..16 {
        if bit(instr, i) {
            if !first {
                list.push_str(", ");
            }
            first = false;
            list.push_str(reg_name(i));
        }
    }
    list.push('}');
    format!("{}{}{}, {list}", pad_mnemonic(&mnemonic), reg_name(rn), if write_back { "!" } else { "" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::Machine;

    fn machine_with_guest_region() -> Machine {
        let mut machine = Machine::new();
        machine
            .memory_mut()
            .register_region("guest", 0x8000_0000, 0x1000)
            .unwrap();
        machine
    }

    #[test]
    fn mov_immediate() {
        let machine = machine_with_guest_region();
        // MOV r0, #5
        let line = disassemble(&machine, 0x8000_0000, 0xE3A0_0005, &Annotations::default());
        assert_eq!(line, "mov     r0, #00000005");
    }

    #[test]
    fn add_sets_three_operands() {
        let machine = machine_with_guest_region();
        // ADD r1, r2, r3
        let line = disassemble(&machine, 0x8000_0000, 0xE082_1003, &Annotations::default());
        assert_eq!(line, "add     r1, r2, r3");
    }

    #[test]
    fn cmp_is_a_test_op_with_two_operands_and_no_s_suffix() {
        let machine = machine_with_guest_region();
        // CMP r0, r1
        let line = disassemble(&machine, 0x8000_0000, 0xE150_0001, &Annotations::default());
        assert_eq!(line, "cmp     r0, r1");
    }

    #[test]
    fn branch_without_annotation() {
        let machine = machine_with_guest_region();
        // B #0 at pc=0x8000_0000 -> target = pc + 8
        let line = disassemble(&machine, 0x8000_0000, 0xEA00_0000, &Annotations::default());
        assert_eq!(line, "b       80000008");
    }

    #[test]
    fn branch_with_matching_annotation() {
        let machine = machine_with_guest_region();
        let annotations = Annotations {
            docolon: Some(0x8000_0008),
            ..Annotations::default()
        };
        let line = disassemble(&machine, 0x8000_0000, 0xEB00_0000, &annotations);
        assert_eq!(line, "bl      80000008 ; docolon");
    }

    #[test]
    fn ldr_pc_relative_literal_is_annotated_with_the_loaded_value() {
        let mut machine = machine_with_guest_region();
        // LDR r0, [pc, #8] at pc=0x8000_0000 -> literal at 0x8000_0010
        machine.write_word(0x8000_0010, 0xDEAD_BEEF);
        let line = disassemble(&machine, 0x8000_0000, 0xE59F_0008, &Annotations::default());
        assert_eq!(line, "ldr     r0, [pc, 8];  # 0xdeadbeef");
    }

    #[test]
    fn stmdb_writeback_lists_registers_low_to_high() {
        let machine = machine_with_guest_region();
        // STMDB r13!,{r0-r3}
        let line = disassemble(&machine, 0x8000_0000, 0xE92D_000F, &Annotations::default());
        assert_eq!(line, "stmdb   sp!, {r0, r1, r2, r3}");
    }

    #[test]
    fn mul_operand_order_is_rd_rm_rs() {
        let machine = machine_with_guest_region();
        // MUL r0, r1, r2 -> Rd=r0 (bits 16..19), Rm=r1 (bits 0..3), Rs=r2 (bits 8..11)
        let word = 0b1110_0000_0000_0000_0000_0010_1001_0001u32;
        let line = disassemble(&machine, 0x8000_0000, word, &Annotations::default());
        assert_eq!(line, "mul     r0, r1, r2");
    }

    #[test]
    fn umull_operand_order_is_rdlo_rdhi_rm_rs() {
        let machine = machine_with_guest_region();
        // UMULL r0,r1,r2,r3 -> RdHi=bits(16,4)=r1, RdLo=bits(12,4)=r0, Rs=bits(8,4)=r3, Rm=bits(0,4)=r2
        let word = 0b1110_0000_1000_0001_0000_0011_1001_0010u32;
        let line = disassemble(&machine, 0x8000_0000, word, &Annotations::default());
        assert_eq!(line, "umull   r0, r1, r2, r3");
    }
}
