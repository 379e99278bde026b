//! Decoding of the instruction forms the emulator understands.
//!
//! Only two opcode classes are ever decoded past the opcode: AMO and SYSTEM. Everything else is
//! handed back to the trapped privilege level untouched, so there is nothing to decode.

use crate::csr::CsrSpecifier;
use crate::registers::Specifier;
use thiserror::Error;

/// Opcode class (`insn[6:2]`) of the `AMO` major opcode.
#[allow(clippy::unusual_byte_groupings)]
pub const OPCODE_CLASS_AMO: u8 = 0b01_011;

/// Opcode class (`insn[6:2]`) of the `SYSTEM` major opcode.
#[allow(clippy::unusual_byte_groupings)]
pub const OPCODE_CLASS_SYSTEM: u8 = 0b11_100;

/// Returns `true` if the low two bits mark `raw_instruction` as 32 bits (or longer).
///
/// Anything else is either a compressed (16-bit) encoding, or the `0` that hardware is allowed to
/// report instead of the faulting instruction.
pub fn is_word_length(raw_instruction: u32) -> bool {
    raw_instruction & 0b11 == 0b11
}

/// Returns the 5-bit opcode class (`insn[6:2]`), used as the dispatch key.
pub fn opcode_class(raw_instruction: u32) -> u8 {
    ((raw_instruction & 0x7C) >> 2) as u8
}

/// A decoded atomic memory operation (`AMO*.W`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AmoInsn {
    pub op: AmoOp,
    pub dest: Specifier,
    /// Register holding the memory address.
    pub addr: Specifier,
    /// Register holding the second operand.
    pub src: Specifier,
    /// The `aq` bit.
    pub acquire: bool,
    /// The `rl` bit.
    pub release: bool,
}

/// The read-modify-write operation selected by `funct5` (`insn[31:27]`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmoOp {
    Add,
    Swap,
    Xor,
    Or,
    And,
    Min,
    Max,
    Minu,
    Maxu,
}

impl AmoOp {
    /// Returns the value to store back, given the value loaded from memory (`old`) and the second
    /// operand (`operand`).
    pub fn apply(self, old: u32, operand: u32) -> u32 {
        match self {
            Self::Add => old.wrapping_add(operand),
            Self::Swap => operand,
            Self::Xor => old ^ operand,
            Self::Or => old | operand,
            Self::And => old & operand,
            Self::Min => {
                if (old as i32) > (operand as i32) {
                    operand
                } else {
                    old
                }
            }
            Self::Max => {
                if (old as i32) < (operand as i32) {
                    operand
                } else {
                    old
                }
            }
            Self::Minu => old.min(operand),
            Self::Maxu => old.max(operand),
        }
    }
}

impl AmoInsn {
    /// Decodes an instruction of the `AMO` opcode class.
    ///
    /// The `funct3` width field is not checked: every access is performed on a 32-bit word.
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        let funct5 = raw_instruction >> 27;
        // funct5 == 0bxxx1x covers LR (0b00010) and SC (0b00011), which are only used here as
        // building blocks and never emulated themselves.
        if funct5 & 0b00010 != 0 {
            return Err(DecodeError::ReservedLrSc);
        }
        let op = match funct5 {
            0b00000 => AmoOp::Add,
            0b00001 => AmoOp::Swap,
            0b00100 => AmoOp::Xor,
            0b01000 => AmoOp::Or,
            0b01100 => AmoOp::And,
            0b10000 => AmoOp::Min,
            0b10100 => AmoOp::Max,
            0b11000 => AmoOp::Minu,
            0b11100 => AmoOp::Maxu,
            _ => return Err(DecodeError::UnsupportedAmo),
        };
        Ok(Self {
            op,
            dest: rd(raw_instruction),
            addr: rs1(raw_instruction),
            src: rs2(raw_instruction),
            acquire: (raw_instruction >> 26) & 0b1 == 1,
            release: (raw_instruction >> 25) & 0b1 == 1,
        })
    }
}

/// A decoded Zicsr instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CsrInsn {
    pub op: CsrOp,
    pub csr: CsrSpecifier,
    pub dest: Specifier,
    pub source: CsrOperand,
}

/// The modification applied to the CSR, selected by `funct3` (bit 2 of which only picks the
/// operand source).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    /// `csrrw` / `csrrwi`
    Write,
    /// `csrrs` / `csrrsi`
    Set,
    /// `csrrc` / `csrrci`
    Clear,
}

/// Where the operand of a CSR instruction comes from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOperand {
    Register(Specifier),
    /// Zero-extended 5-bit immediate, encoded in the `rs1` field.
    Immediate(u8),
}

impl CsrInsn {
    /// Decodes an instruction of the `SYSTEM` opcode class.
    ///
    /// Only the six Zicsr instructions are accepted; `funct3 == 0b000` (`ecall`, `ebreak`, `mret`,
    /// `wfi`, ...) and the reserved `funct3 == 0b100` are rejected.
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        let funct3 = funct3(raw_instruction);
        let op = match funct3 & 0b011 {
            0b01 => CsrOp::Write,
            0b10 => CsrOp::Set,
            0b11 => CsrOp::Clear,
            _ => return Err(DecodeError::UnsupportedCsrFunct(funct3)),
        };
        let source = if funct3 & 0b100 == 0 {
            CsrOperand::Register(rs1(raw_instruction))
        } else {
            CsrOperand::Immediate(u8::from(rs1(raw_instruction)))
        };
        Ok(Self {
            op,
            csr: csr(raw_instruction),
            dest: rd(raw_instruction),
            source,
        })
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("LR/SC encodings are not emulated")]
    ReservedLrSc,
    #[error("unsupported AMO operation")]
    UnsupportedAmo,
    #[error("SYSTEM instruction with funct3 {0:#05b} is not a CSR access")]
    UnsupportedCsrFunct(u8),
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 20) & 0x1F) as u8)
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

/// Returns the 12-bit CSR specifier of a Zicsr instruction.
fn csr(raw_instruction: u32) -> CsrSpecifier {
    (raw_instruction >> 20) as CsrSpecifier
}
