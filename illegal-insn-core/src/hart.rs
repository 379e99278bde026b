//! Interfaces through which the emulation layer reaches the hart it runs on.
//!
//! The emulator itself is pure decode-and-dispatch logic. Everything that touches real machine
//! state goes through the traits below, which keeps the logic testable against
//! [`SimHart`](crate::sim::SimHart) and lets the `metal` backend stay tiny.

use crate::csr::CsrSpecifier;
use crate::registers::{TrapRegisters, X};
use crate::trap::{Exception, RedirectError, TrapInfo};
use crate::RawPrivilegeLevel;
use thiserror::Error;

/// Reservation-based memory access, performed with the memory view of the trapped privilege
/// level.
///
/// This mirrors the `lr.w`/`sc.w` pair together with the `mstatus.MPRV` toggle around it. The
/// emulator only ever calls [`load_reserved`](Self::load_reserved) and
/// [`store_conditional`](Self::store_conditional) through a [`TransparentAccess`] guard, i.e.
/// between [`enter_transparent`](Self::enter_transparent) and
/// [`exit_transparent`](Self::exit_transparent).
///
/// Implementations must make each load/store pair behave like the hardware reservation: a store
/// conditional only succeeds if nothing else wrote the reserved word since the matching load.
pub trait ExclusiveAccess {
    /// Makes subsequent accesses use the trapped privilege level's view of memory (sets MPRV).
    ///
    /// Returns the `mstatus` value to hand back to [`exit_transparent`](Self::exit_transparent).
    fn enter_transparent(&mut self) -> X;

    /// Restores `mstatus` to `saved`, ending transparent access.
    fn exit_transparent(&mut self, saved: X);

    /// Loads the 32-bit word at `address` and reserves it.
    fn load_reserved(&mut self, address: X, acquire: bool) -> Result<u32, Exception>;

    /// Stores `value` at `address` if the reservation is still held.
    ///
    /// Returns `Ok(false)` if the reservation was lost and nothing was written.
    fn store_conditional(&mut self, address: X, value: u32, release: bool)
        -> Result<bool, Exception>;
}

/// Guard for a transparent-access bracket. Leaves transparent access when dropped, so an early
/// return can never leave MPRV set.
#[derive(Debug)]
pub struct TransparentAccess<'a, H: ExclusiveAccess + ?Sized> {
    hart: &'a mut H,
    saved_mstatus: X,
}

impl<'a, H: ExclusiveAccess + ?Sized> TransparentAccess<'a, H> {
    pub fn enter(hart: &'a mut H) -> Self {
        let saved_mstatus = hart.enter_transparent();
        Self {
            hart,
            saved_mstatus,
        }
    }

    pub fn load_reserved(&mut self, address: X, acquire: bool) -> Result<u32, Exception> {
        self.hart.load_reserved(address, acquire)
    }

    pub fn store_conditional(
        &mut self,
        address: X,
        value: u32,
        release: bool,
    ) -> Result<bool, Exception> {
        self.hart.store_conditional(address, value, release)
    }
}

impl<H: ExclusiveAccess + ?Sized> Drop for TransparentAccess<'_, H> {
    fn drop(&mut self) {
        self.hart.exit_transparent(self.saved_mstatus);
    }
}

/// Access to CSRs that the hart either doesn't implement or doesn't let the trapped level touch.
pub trait CsrBridge {
    /// Returns the value `regs`'s privilege level sees when reading `csr`.
    fn read_csr(&mut self, csr: CsrSpecifier, regs: &TrapRegisters) -> Result<X, CsrError>;

    /// Writes `value` to `csr` on behalf of the trapped privilege level.
    fn write_csr(
        &mut self,
        csr: CsrSpecifier,
        regs: &TrapRegisters,
        value: X,
    ) -> Result<(), CsrError>;
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CsrError {
    #[error("CSR {0:#05x} is not implemented")]
    NotImplemented(CsrSpecifier),
    #[error("CSR {csr:#05x} requires at least privilege level {required}")]
    Privilege {
        csr: CsrSpecifier,
        required: RawPrivilegeLevel,
    },
    #[error("CSR {0:#05x} is read-only")]
    ReadOnly(CsrSpecifier),
}

/// Instruction fetch using the trapped privilege level's view of memory.
pub trait UnprivilegedFetch {
    /// Fetches the instruction at `pc`.
    ///
    /// If the first halfword is a compressed encoding only that halfword is returned. If the fetch
    /// itself faults, the fault is returned as a ready-to-redirect [`TrapInfo`]; its `epc` is
    /// overwritten by the caller.
    fn fetch_insn(&mut self, pc: X, regs: &TrapRegisters) -> Result<u32, TrapInfo>;
}

/// Delivery of a trap to the next-lower privilege level.
pub trait TrapRedirect {
    /// Updates `regs` (and the hart's trap CSRs) so that resuming `regs` enters the lower level's
    /// trap handler as if `trap` had been raised natively.
    fn redirect(&mut self, regs: &mut TrapRegisters, trap: &TrapInfo) -> Result<(), RedirectError>;
}

/// Everything the illegal-instruction handler needs from the hart.
pub trait Hart: ExclusiveAccess + CsrBridge + UnprivilegedFetch + TrapRedirect {}

impl<T: ExclusiveAccess + CsrBridge + UnprivilegedFetch + TrapRedirect> Hart for T {}

/// Firmware events counted by the SBI PMU extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FirmwareEvent {
    MisalignedLoad,
    MisalignedStore,
    AccessLoad,
    AccessStore,
    IllegalInsn,
    SetTimer,
    IpiSent,
    IpiReceived,
    FenceISent,
    FenceIReceived,
    SfenceVmaSent,
    SfenceVmaReceived,
    SfenceVmaAsidSent,
    SfenceVmaAsidReceived,
}

impl FirmwareEvent {
    pub const COUNT: usize = 14;

    /// Returns the SBI firmware event code.
    pub fn code(self) -> usize {
        self as usize
    }
}

const_assert_eq!(FirmwareEvent::COUNT, FirmwareEvent::SfenceVmaAsidReceived as usize + 1);

/// Increment-only handle on the firmware event counters. Never fails.
pub trait FirmwareCounters {
    fn increment(&self, event: FirmwareEvent);
}
