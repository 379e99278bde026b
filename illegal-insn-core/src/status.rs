use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::registers::X;
use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// View of an `mstatus` value, limited to the fields involved in trap delivery and transparent
/// memory access.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart’s current operating state. A restricted view of mstatus appears
/// > as the sstatus register in the S-level ISA.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Status(X);

impl Status {
    pub fn new(mstatus: X) -> Self {
        Self(mstatus)
    }

    /// Returns the raw `mstatus` value.
    pub fn bits(self) -> X {
        self.0
    }

    /// Returns `true` if the SIE (S-mode Interrupt Enable) bit is set.
    pub fn sie(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::SIE]
    }

    /// Sets the SIE (S-mode Interrupt Enable) bit to `value`.
    pub fn set_sie(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::SIE, value);
    }

    /// Returns `true` if the SPIE (S-mode Previous Interrupt Enable) bit is set.
    pub fn spie(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::SPIE]
    }

    /// Sets the SPIE (S-mode Previous Interrupt Enable) bit to `value`.
    pub fn set_spie(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::SPIE, value);
    }

    /// Returns the privilege level encoded by the MPP (M-mode Previous Privilege level) field.
    ///
    /// This is the level the trap was taken from.
    pub fn mpp(&self) -> RawPrivilegeLevel {
        RawPrivilegeLevel::from_u2(self.0.view_bits::<Lsb0>()[idx::MPP..(idx::MPP + 2)].load_le())
    }

    /// Sets the privilege level encoded by the MPP (M-mode Previous Privilege level) field to
    /// `value`.
    pub fn set_mpp(&mut self, value: PrivilegeLevel) {
        self.0.view_bits_mut::<Lsb0>()[idx::MPP..(idx::MPP + 2)].store_le(value as u8);
    }

    /// Returns the privilege level encoded by the SPP (S-mode Previous Privilege level) field.
    pub fn spp(&self) -> PrivilegeLevel {
        if self.0.view_bits::<Lsb0>()[idx::SPP] {
            PrivilegeLevel::Supervisor
        } else {
            PrivilegeLevel::User
        }
    }

    /// Sets the SPP (S-mode Previous Privilege level) field. Only U and S can be represented;
    /// anything higher is ignored, as SPP is **WARL**.
    pub fn set_spp(&mut self, value: PrivilegeLevel) {
        if value <= PrivilegeLevel::Supervisor {
            let bit = value as u8 != 0;
            self.0.view_bits_mut::<Lsb0>().set(idx::SPP, bit);
        }
    }

    /// Returns `true` if the MPRV (Modify PRiVilege) bit is set.
    pub fn mprv(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::MPRV]
    }

    /// Sets the MPRV (Modify PRiVilege) bit to `value`.
    pub fn set_mprv(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::MPRV, value);
    }
}

/// The `mstatus.MPRV` bit as a mask, for code that manipulates raw `mstatus` values.
pub const MSTATUS_MPRV: X = 1 << idx::MPRV;

/// Bit indices into mstatus register.
mod idx {
    pub const SIE: usize = 1;
    pub const SPIE: usize = 5;
    pub const SPP: usize = 8;
    pub const MPP: usize = 11;
    pub const MPRV: usize = 17;
}
