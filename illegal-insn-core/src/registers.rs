//! The register snapshot saved on trap entry.

use core::fmt;
use std::fmt::Formatter;

/// The type of a single `x` register.
#[cfg(not(feature = "rv64"))]
pub type X = u32;

/// The type of a single `x` register.
#[cfg(feature = "rv64")]
pub type X = u64;

/// The bit width of the `x` registers.
pub const XLEN: u32 = X::BITS;

/// The number of `x` registers available (indices start at `0` for `x0`)
pub const LEN: u8 = 32;

/// The interrupted context of a hart, as saved by the machine-mode trap entry code.
///
/// The layout follows the order in which the trap entry code spills registers: the 32 `x`
/// registers, then `mepc`, `mstatus`, and `mstatush`.
///
/// The register `x0` (aka `zero`) is always zero. Writes to it are ignored. The slot for `x0` is
/// still present so that a [`Specifier`] can be used as an index directly.
///
/// It is not possible to get a mutable reference to an `x` register, since that would allow
/// unchecked writes to register `x0`.
#[repr(C)]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrapRegisters {
    x_registers: [X; LEN as usize],
    mepc: X,
    mstatus: X,
    mstatush: X,
}

impl Default for TrapRegisters {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TrapRegisters {
    /// Returns an all-zero snapshot, trapped at `mepc`.
    pub fn new(mepc: X) -> Self {
        Self {
            x_registers: [0; LEN as usize],
            mepc,
            mstatus: 0,
            mstatush: 0,
        }
    }

    /// Returns the value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> X {
        self.x_registers[usize::from(specifier)]
    }

    /// Sets the value of an `x` register.
    ///
    /// Writes to register `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: X) {
        self.replace_x(specifier, value);
    }

    /// Replaces the value of an `x` register, returning its old value.
    ///
    /// Writes to register `x0` are ignored.
    pub fn replace_x(&mut self, specifier: Specifier, value: X) -> X {
        if specifier.0 == 0 {
            0 // Ignore writes to register `x0`
        } else {
            std::mem::replace(&mut self.x_registers[specifier.0 as usize], value)
        }
    }

    /// Returns the program counter of the trapped instruction.
    pub fn mepc(&self) -> X {
        self.mepc
    }

    /// Returns a mutable reference to the saved program counter.
    pub fn mepc_mut(&mut self) -> &mut X {
        &mut self.mepc
    }

    /// Returns the `mstatus` value at the time of the trap.
    pub fn mstatus(&self) -> X {
        self.mstatus
    }

    /// Returns a mutable reference to the saved `mstatus` value.
    ///
    /// This is what `mret` will restore, so changing it changes the mode the hart resumes in.
    pub fn mstatus_mut(&mut self) -> &mut X {
        &mut self.mstatus
    }

    /// Returns the saved `mstatush` value (always `0` on RV64).
    pub fn mstatush(&self) -> X {
        self.mstatush
    }

    pub fn mstatush_mut(&mut self) -> &mut X {
        &mut self.mstatush
    }

    /// Moves the saved program counter past the (always 4-byte) emulated instruction.
    pub(crate) fn advance_mepc(&mut self) {
        self.mepc = self.mepc.wrapping_add(4);
    }
}

/// An `x` register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. register `zero`, always returns `0` on read, and ignores any writes.
    pub const X0: Self = Specifier(0);
    pub const RA: Self = Specifier(1);
    pub const SP: Self = Specifier(2);
    pub const GP: Self = Specifier(3);
    pub const TP: Self = Specifier(4);
    pub const T0: Self = Specifier(5);
    pub const T1: Self = Specifier(6);
    pub const T2: Self = Specifier(7);
    pub const S0: Self = Specifier(8);
    pub const S1: Self = Specifier(9);
    pub const A0: Self = Specifier(10);
    pub const A1: Self = Specifier(11);
    pub const A2: Self = Specifier(12);
    pub const A3: Self = Specifier(13);
    pub const A4: Self = Specifier(14);
    pub const A5: Self = Specifier(15);
    pub const A6: Self = Specifier(16);
    pub const A7: Self = Specifier(17);

    /// Create a register specifier from its index, returning `None` if `index > 31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit in 5 bits (`0..=31`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }

    /// Return an iterator over all register specifier, starting at x0 up to x31.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
