//! Pure word → tag classification.
//!
//! Grounded directly in `original_source/decode.c`'s `arm_decode_instr`
//! cascade. Its `IBITS(lo, n)`/`IBIT(n)` macros become the two free
//! functions below; the `if` order here is the same order the source
//! checks in, which is what gives the tie-breaks in spec.md §4.2 (multiply
//! before register-operand data processing, half-word forms before
//! register-shift data processing) for free.

/// Extract `n` bits of `word` starting at bit `lo`.
#[must_use]
pub const fn bits(word: u32, lo: u32, n: u32) -> u32 {
    (word >> lo) & ((1u32 << n) - 1)
}

/// Test a single bit of `word`.
#[must_use]
pub const fn bit(word: u32, n: u32) -> bool {
    (word >> n) & 1 != 0
}

/// The sixteen ARM data-processing opcodes, in their bits(21,4) encoding
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpOp {
    And,
    Eor,
    Sub,
    Rsb,
    Add,
    Adc,
    Sbc,
    Rsc,
    Tst,
    Teq,
    Cmp,
    Cmn,
    Orr,
    Mov,
    Bic,
    Mvn,
}

impl DpOp {
    const TABLE: [Self; 16] = [
        Self::And,
        Self::Eor,
        Self::Sub,
        Self::Rsb,
        Self::Add,
        Self::Adc,
        Self::Sbc,
        Self::Rsc,
        Self::Tst,
        Self::Teq,
        Self::Cmp,
        Self::Cmn,
        Self::Orr,
        Self::Mov,
        Self::Bic,
        Self::Mvn,
    ];

    #[must_use]
    pub fn from_bits(opcode: u32) -> Self {
        Self::TABLE[(opcode & 0xF) as usize]
    }

    /// The comparison-only ops that always update flags and never write
    /// `Rd`.
    #[must_use]
    pub const fn is_test(self) -> bool {
        matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }

    /// Ops whose flag update on the C bit comes from the adder, not the
    /// shifter (i.e. everything but the purely logical ops).
    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Sub
                | Self::Rsb
                | Self::Add
                | Self::Adc
                | Self::Sbc
                | Self::Rsc
                | Self::Cmp
                | Self::Cmn
        )
    }
}

/// How a data-processing instruction's operand 2 (and, for register
/// forms, the shift amount) is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpOperand {
    /// Rotated 8-bit immediate.
    Immediate,
    /// Register with an immediate shift amount.
    RegisterImmediateShift,
    /// Register with the shift amount taken from a register's low byte.
    RegisterRegisterShift,
}

/// The six multiply forms. Classified by the decoder per spec but left
/// unimplemented by the executor (reported as [`sim_core::SimError::Unimplemented`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
    Mul,
    Mla,
    Umull,
    Umlal,
    Smull,
    Smlal,
}

/// Which half/signed-byte transfer an instruction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfKind {
    UnsignedHalf,
    SignedHalf,
    SignedByte,
}

/// The classification of a fetched 32-bit instruction word, independent
/// of its condition field (the decoder never reads bits 28..31 for
/// anything but `cond`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Illegal,
    Swi,
    Branch {
        link: bool,
    },
    DataProcessing {
        op: DpOp,
        operand: DpOperand,
    },
    Multiply(MulOp),
    SingleTransfer {
        load: bool,
        byte: bool,
        register_offset: bool,
    },
    HalfSignedTransfer {
        load: bool,
        kind: HalfKind,
    },
    BlockTransfer {
        load: bool,
    },
}

/// Condition field, bits 28..31.
#[must_use]
pub const fn cond(word: u32) -> u32 {
    bits(word, 28, 4)
}

/// Classify a fetched instruction word. Total: unrecognized patterns
/// produce [`Tag::Illegal`].
#[must_use]
pub fn decode(word: u32) -> Tag {
    if bits(word, 24, 4) == 0xF {
        return Tag::Swi;
    }
    if bits(word, 25, 3) == 0b101 {
        return Tag::Branch { link: bit(word, 24) };
    }
    if bits(word, 26, 2) == 0b00 {
        let op = DpOp::from_bits(bits(word, 21, 4));
        if !bit(word, 25) && !bit(word, 4) {
            return Tag::DataProcessing {
                op,
                operand: DpOperand::RegisterImmediateShift,
            };
        }
        if !bit(word, 25) && bit(word, 4) && !bit(word, 7) {
            return Tag::DataProcessing {
                op,
                operand: DpOperand::RegisterRegisterShift,
            };
        }
        if bit(word, 25) {
            return Tag::DataProcessing {
                op,
                operand: DpOperand::Immediate,
            };
        }
    }

    if bits(word, 24, 4) == 0 && bits(word, 4, 4) == 0b1001 {
        let mul = match bits(word, 21, 3) {
            0b000 => Some(MulOp::Mul),
            0b001 => Some(MulOp::Mla),
            0b100 => Some(MulOp::Umull),
            0b101 => Some(MulOp::Umlal),
            0b110 => Some(MulOp::Smull),
            0b111 => Some(MulOp::Smlal),
            _ => None,
        };
        if let Some(mul) = mul {
            return Tag::Multiply(mul);
        }
    }

    if bits(word, 25, 3) == 0b010 {
        return Tag::SingleTransfer {
            load: bit(word, 20),
            byte: bit(word, 22),
            register_offset: false,
        };
    }

    if bits(word, 25, 3) == 0b011 && !bit(word, 4) {
        return Tag::SingleTransfer {
            load: bit(word, 20),
            byte: bit(word, 22),
            register_offset: true,
        };
    }

    if bits(word, 25, 3) == 0 && bit(word, 7) && bit(word, 4) {
        let load = bit(word, 20);
        if load {
            if bit(word, 22) || bits(word, 8, 4) == 0 {
                let kind = match (bit(word, 6), bit(word, 5)) {
                    (true, true) => Some(HalfKind::SignedHalf),
                    (true, false) => Some(HalfKind::SignedByte),
                    (false, true) => Some(HalfKind::UnsignedHalf),
                    (false, false) => None,
                };
                if let Some(kind) = kind {
                    return Tag::HalfSignedTransfer { load: true, kind };
                }
            }
        } else if (bit(word, 22) || bits(word, 8, 4) == 0) && !bit(word, 6) && bit(word, 5) {
            return Tag::HalfSignedTransfer {
                load: false,
                kind: HalfKind::UnsignedHalf,
            };
        }
    }

    if bits(word, 25, 3) == 0b100 {
        return Tag::BlockTransfer { load: bit(word, 20) };
    }

    Tag::Illegal
}
