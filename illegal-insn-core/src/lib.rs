//! Machine-mode emulation of illegal-instruction traps for RISC-V harts.
//!
//! A hart that lacks the fused `AMO*.W` instructions, or some of the CSRs a supervisor expects,
//! traps into M-mode whenever one of them is executed. [`handle_illegal_insn`] picks such a trap
//! up, emulates what it can on top of the [`hart`] interfaces, and redirects everything else to the
//! trapped privilege level as an ordinary illegal-instruction exception.

#[macro_use]
extern crate static_assertions;

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

pub mod csr;
pub mod emulate;
pub mod hart;
pub mod instruction;
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub mod metal;
pub mod registers;
pub mod sim;
pub mod status;
pub mod trap;

pub use emulate::{handle_illegal_insn, truly_illegal_insn, HandlerResult, TrapOutcome};
pub use hart::{FirmwareCounters, FirmwareEvent, Hart};
pub use registers::{TrapRegisters, X};
pub use trap::{Exception, RedirectError, TrapInfo};

// The trap entry code spills exactly 32 `x` registers followed by three machine CSRs.
assert_eq_size!(TrapRegisters, [X; 35]);

/// List of all possible privilege levels for RISC-V.
///
/// Same as [`PrivilegeLevel`] except that it allows specifying the reserved privilege level `2`.
/// This can be useful in case a minimum required privilege level is specified as a 2-bit value,
/// since that value itself may be a reserved privilege level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    /// Privilege level `0b10` is reserved in the base ISA. When using the hypervisor extension,
    /// this becomes the Hypervisor privilege level.
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    /// Convert a 2-bit value into a [`RawPrivilegeLevel`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            3 => Self::Machine,
            _ => panic!("out of range u2 used"),
        }
    }

    pub fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved)
    }
}

impl fmt::Display for RawPrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            RawPrivilegeLevel::User => "U",
            RawPrivilegeLevel::Supervisor => "S",
            RawPrivilegeLevel::Reserved => "2",
            RawPrivilegeLevel::Machine => "M",
        })
    }
}

/// List of defined privilege levels for RISC-V.
///
/// Only levels `0`, `1`, and `3` are defined; level `2` is *reserved*.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum PrivilegeLevel {
    /// User/application (abbreviated `U`).
    User = 0,
    /// Supervisor (abbreviated `S`), the level traps are redirected to.
    Supervisor = 1,
    // Level 2 is reserved
    /// Machine (abbreviated `M`), the level this crate runs at.
    Machine = 3,
}

impl PartialEq<PrivilegeLevel> for RawPrivilegeLevel {
    fn eq(&self, other: &PrivilegeLevel) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialEq<RawPrivilegeLevel> for PrivilegeLevel {
    fn eq(&self, other: &RawPrivilegeLevel) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialOrd<PrivilegeLevel> for RawPrivilegeLevel {
    fn partial_cmp(&self, other: &PrivilegeLevel) -> Option<Ordering> {
        (*self as usize).partial_cmp(&(*other as usize))
    }
}

impl PartialOrd<RawPrivilegeLevel> for PrivilegeLevel {
    fn partial_cmp(&self, other: &RawPrivilegeLevel) -> Option<Ordering> {
        (*self as usize).partial_cmp(&(*other as usize))
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            PrivilegeLevel::User => "U",
            PrivilegeLevel::Supervisor => "S",
            PrivilegeLevel::Machine => "M",
        })
    }
}

impl From<PrivilegeLevel> for RawPrivilegeLevel {
    fn from(value: PrivilegeLevel) -> Self {
        match value {
            PrivilegeLevel::User => Self::User,
            PrivilegeLevel::Supervisor => Self::Supervisor,
            PrivilegeLevel::Machine => Self::Machine,
        }
    }
}

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = ReservedPrivilegeLevelError;
    fn try_from(value: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match value {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Supervisor => Ok(Self::Supervisor),
            RawPrivilegeLevel::Reserved => Err(ReservedPrivilegeLevelError(value)),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
        }
    }
}

#[derive(Error, Debug)]
#[error("privilege level {0} is reserved")]
pub struct ReservedPrivilegeLevelError(RawPrivilegeLevel);

/// Address alignment, as a power of two.
// Maintains the invariant that self.0 is a power of two.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Alignment(u32);

impl Alignment {
    /// Halfword alignment means the address is a multiple of 2 (`address & 0b1 == 0`).
    /// Every instruction starts on such an address.
    pub const HALFWORD: Self = Self(2);

    /// Word alignment means the address is a multiple of 4 (`address & 0b11 == 0`).
    /// `lr.w`, `sc.w` and the `AMO*.W` instructions require it.
    pub const WORD: Self = Self(4);

    /// Returns `true` if `address` is aligned to this alignment.
    ///
    /// Only the low bits matter, so a 64-bit address can be truncated before checking.
    pub fn is_aligned(self, address: u32) -> bool {
        address & self.0.wrapping_sub(1) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_ordering() {
        assert!(RawPrivilegeLevel::User < PrivilegeLevel::Supervisor);
        assert!(PrivilegeLevel::Machine > RawPrivilegeLevel::Reserved);
        assert_eq!(RawPrivilegeLevel::Supervisor, PrivilegeLevel::Supervisor);
        assert!(PrivilegeLevel::try_from(RawPrivilegeLevel::Reserved).is_err());
    }

    #[test]
    fn test_alignment() {
        assert!(Alignment::WORD.is_aligned(0x8000_0004));
        assert!(!Alignment::WORD.is_aligned(0x8000_0006));
        assert!(Alignment::HALFWORD.is_aligned(0x8000_0006));
        assert!(!Alignment::HALFWORD.is_aligned(0x8000_0007));
    }
}
