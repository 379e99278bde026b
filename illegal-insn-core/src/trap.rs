//! Trap causes and the descriptor handed to the redirect primitive.

use crate::registers::X;
use crate::PrivilegeLevel;
use thiserror::Error;

/// Synchronous exception causes, as written to `mcause`/`scause`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    /// Instruction address is not on a four-byte aligned boundary in memory.
    InstructionAddressMisaligned,
    InstructionAccessFault,
    /// Generic exception used to communicate one of many possible scenarios:
    ///
    /// - Attempt to decode a reserved or unimplemented instruction.
    /// - Attempt to access a non-existent CSR.
    /// - Attempt to access a CSR without the appropriate privilege level.
    /// - Attempt to write to a read-only CSR.
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreOrAmoAddressMisaligned,
    StoreOrAmoAccessFault,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
    InstructionPageFault,
    LoadPageFault,
    StoreOrAmoPageFault,
}

impl Exception {
    /// Returns the exception code (cause) for this exception.
    pub fn code(&self) -> X {
        match self {
            Self::InstructionAddressMisaligned => 0,
            Self::InstructionAccessFault => 1,
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned => 4,
            Self::LoadAccessFault => 5,
            Self::StoreOrAmoAddressMisaligned => 6,
            Self::StoreOrAmoAccessFault => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => 11,
            Self::InstructionPageFault => 12,
            Self::LoadPageFault => 13,
            Self::StoreOrAmoPageFault => 15,
        }
    }

    /// Inverse of [`code`](Self::code). Returns `None` for reserved, custom and interrupt codes.
    pub fn from_code(code: X) -> Option<Self> {
        Some(match code {
            0 => Self::InstructionAddressMisaligned,
            1 => Self::InstructionAccessFault,
            2 => Self::IllegalInstruction,
            3 => Self::Breakpoint,
            4 => Self::LoadAddressMisaligned,
            5 => Self::LoadAccessFault,
            6 => Self::StoreOrAmoAddressMisaligned,
            7 => Self::StoreOrAmoAccessFault,
            8 => Self::EnvironmentCallFromUMode,
            9 => Self::EnvironmentCallFromSMode,
            11 => Self::EnvironmentCallFromMMode,
            12 => Self::InstructionPageFault,
            13 => Self::LoadPageFault,
            15 => Self::StoreOrAmoPageFault,
            _ => return None,
        })
    }
}

/// Everything needed to deliver a trap to a lower privilege level.
///
/// Built fresh for every redirect, never stored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrapInfo {
    /// Program counter the trap is reported at.
    pub epc: X,
    pub cause: Exception,
    /// Faulting instruction or address, reported in `stval`.
    pub tval: X,
    /// Guest physical address, for traps taken while virtualized. Always `0` here.
    pub tval2: X,
    /// Transformed instruction. Always `0` here.
    pub tinst: X,
}

impl TrapInfo {
    /// Illegal-instruction trap for `raw_instruction` at `epc`.
    pub fn illegal_instruction(epc: X, raw_instruction: u32) -> Self {
        Self::new(epc, Exception::IllegalInstruction, X::from(raw_instruction))
    }

    /// Trap with no guest address and no transformed instruction.
    pub fn new(epc: X, cause: Exception, tval: X) -> Self {
        Self {
            epc,
            cause,
            tval,
            tval2: 0,
            tinst: 0,
        }
    }
}

/// The redirect primitive could not hand the trap to a lower privilege level.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum RedirectError {
    /// The trap was taken from M-mode, so there is no lower level that could have caused it.
    #[error("cannot redirect a trap taken from {0:?} mode")]
    NoLowerPrivilege(PrivilegeLevel),
}
