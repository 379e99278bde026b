//! A single simulated hart that implements every interface the emulation layer needs.
//!
//! Used by the tests and the command-line driver to run the handler without real hardware. The
//! hart has one block of RAM, a [`CsrFile`] and an `mstatus` of its own, and records every trap it
//! delivers to the supervisor.

mod counters;
mod csr_file;
mod ram;

pub use counters::EventCounters;
pub use csr_file::{default_csr_file, CsrFile, Counters};
pub use ram::{is_word_aligned, Ram};

use std::collections::VecDeque;

use log::trace;
use thiserror::Error;

use crate::csr::{self, CsrSpecifier};
use crate::hart::{CsrBridge, CsrError, ExclusiveAccess, TrapRedirect, UnprivilegedFetch};
use crate::instruction;
use crate::registers::{TrapRegisters, X};
use crate::status::Status;
use crate::trap::{Exception, RedirectError, TrapInfo};
use crate::{Alignment, PrivilegeLevel};

/// Configuration of a [`SimHart`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub ram_base: X,
    /// RAM size in bytes.
    pub ram_size: usize,
    /// Privilege level the simulated traps are taken from, i.e. the `MPP` of every snapshot built
    /// by [`SimHart::trap_registers`].
    pub trapped_from: PrivilegeLevel,
    /// Initial value of `stvec`.
    pub stvec: X,
    pub hart_id: X,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ram_base: 0x8000_0000,
            ram_size: 0x1_0000,
            trapped_from: PrivilegeLevel::Supervisor,
            stvec: 0x8000_8000,
            hart_id: 0,
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
    #[error("RAM of {size:#x} bytes at {base:#x} is empty or wraps around the address space")]
    InvalidRam { base: X, size: usize },
}

#[derive(Debug, Clone)]
pub struct SimHart {
    config: Config,
    ram: Ram,
    csrs: CsrFile,
    /// The hart's live `mstatus`, as opposed to the copy saved in a [`TrapRegisters`].
    mstatus: Status,
    reservation: Option<X>,
    /// Stores by other harts, each landing just before one of our `sc.w` attempts.
    remote_stores: VecDeque<(X, u32)>,
    failed_store_conditionals: usize,
    trap_log: Vec<TrapInfo>,
}

impl SimHart {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let ram = Ram::new(config.ram_base, config.ram_size).ok_or(ConfigError::InvalidRam {
            base: config.ram_base,
            size: config.ram_size,
        })?;
        let csrs = default_csr_file(config.stvec, config.hart_id);
        Ok(Self {
            config,
            ram,
            csrs,
            mstatus: Status::new(0),
            reservation: None,
            remote_stores: VecDeque::new(),
            failed_store_conditionals: 0,
            trap_log: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the context saved on an M-mode trap taken at `mepc` from the configured level.
    pub fn trap_registers(&self, mepc: X) -> TrapRegisters {
        let mut regs = TrapRegisters::new(mepc);
        let mut status = Status::new(0);
        status.set_mpp(self.config.trapped_from);
        *regs.mstatus_mut() = status.bits();
        regs
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    pub fn csrs(&self) -> &CsrFile {
        &self.csrs
    }

    pub fn csrs_mut(&mut self) -> &mut CsrFile {
        &mut self.csrs
    }

    /// Returns the hart's live `mstatus`.
    pub fn mstatus(&self) -> Status {
        self.mstatus
    }

    pub fn reservation(&self) -> Option<X> {
        self.reservation
    }

    /// Makes another hart store `value` at `address` right before the next `sc.w`, breaking the
    /// reservation if it covers `address`.
    pub fn schedule_remote_store(&mut self, address: X, value: u32) {
        self.remote_stores.push_back((address, value));
    }

    /// Returns how many `sc.w` attempts failed because the reservation was lost.
    pub fn failed_store_conditionals(&self) -> usize {
        self.failed_store_conditionals
    }

    /// Traps delivered to the supervisor, oldest first.
    pub fn trap_log(&self) -> &[TrapInfo] {
        &self.trap_log
    }

    fn apply_remote_store(&mut self) {
        if let Some((address, value)) = self.remote_stores.pop_front() {
            trace!("Remote store of {value:#010x} to {address:#x}");
            self.ram.write_word(address, value);
            if self.reservation == Some(address) {
                self.reservation = None;
            }
        }
    }

    fn read_halfword(&self, address: X) -> Result<u16, TrapInfo> {
        self.ram.read_halfword(address).ok_or_else(|| {
            TrapInfo::new(address, Exception::InstructionAccessFault, address)
        })
    }
}

impl ExclusiveAccess for SimHart {
    fn enter_transparent(&mut self) -> X {
        let saved = self.mstatus.bits();
        self.mstatus.set_mprv(true);
        saved
    }

    fn exit_transparent(&mut self, saved: X) {
        self.mstatus = Status::new(saved);
    }

    fn load_reserved(&mut self, address: X, acquire: bool) -> Result<u32, Exception> {
        debug_assert!(self.mstatus.mprv(), "lr.w issued outside of transparent access");
        if !is_word_aligned(address) {
            return Err(Exception::LoadAddressMisaligned);
        }
        let value = self.ram.read_word(address).ok_or(Exception::LoadAccessFault)?;
        trace!("lr.w{} {address:#x} -> {value:#010x}", if acquire { ".aq" } else { "" });
        self.reservation = Some(address);
        Ok(value)
    }

    fn store_conditional(
        &mut self,
        address: X,
        value: u32,
        release: bool,
    ) -> Result<bool, Exception> {
        debug_assert!(self.mstatus.mprv(), "sc.w issued outside of transparent access");
        if !is_word_aligned(address) {
            return Err(Exception::StoreOrAmoAddressMisaligned);
        }
        if !self.ram.contains(address, 4) {
            return Err(Exception::StoreOrAmoAccessFault);
        }
        self.apply_remote_store();

        let held = self.reservation.take() == Some(address);
        trace!(
            "sc.w{} {address:#x} <- {value:#010x}: {}",
            if release { ".rl" } else { "" },
            if held { "ok" } else { "failed" }
        );
        if !held {
            self.failed_store_conditionals += 1;
            return Ok(false);
        }
        self.ram
            .write_word(address, value)
            .ok_or(Exception::StoreOrAmoAccessFault)?;
        Ok(true)
    }
}

impl CsrBridge for SimHart {
    fn read_csr(&mut self, specifier: CsrSpecifier, regs: &TrapRegisters) -> Result<X, CsrError> {
        let value = self.csrs.read(specifier, regs)?;
        trace!("Read {} -> {value:#x}", display_name(specifier));
        Ok(value)
    }

    fn write_csr(
        &mut self,
        specifier: CsrSpecifier,
        regs: &TrapRegisters,
        value: X,
    ) -> Result<(), CsrError> {
        self.csrs.write(specifier, regs, value)?;
        trace!("Wrote {} <- {value:#x}", display_name(specifier));
        Ok(())
    }
}

fn display_name(specifier: CsrSpecifier) -> String {
    match csr::name(specifier) {
        Some(name) => name.to_owned(),
        None => format!("CSR {specifier:#05x}"),
    }
}

impl UnprivilegedFetch for SimHart {
    fn fetch_insn(&mut self, pc: X, _regs: &TrapRegisters) -> Result<u32, TrapInfo> {
        if !Alignment::HALFWORD.is_aligned(pc as u32) {
            return Err(TrapInfo::new(pc, Exception::InstructionAddressMisaligned, pc));
        }
        let low = u32::from(self.read_halfword(pc)?);
        if !instruction::is_word_length(low) {
            return Ok(low);
        }
        let high = u32::from(self.read_halfword(pc.wrapping_add(2))?);
        Ok(low | (high << 16))
    }
}

impl TrapRedirect for SimHart {
    fn redirect(&mut self, regs: &mut TrapRegisters, trap: &TrapInfo) -> Result<(), RedirectError> {
        let mut status = Status::new(regs.mstatus());
        // MPP is WARL and never holds the reserved level.
        let previous = match PrivilegeLevel::try_from(status.mpp()) {
            Ok(PrivilegeLevel::Machine) | Err(_) => {
                return Err(RedirectError::NoLowerPrivilege(PrivilegeLevel::Machine))
            }
            Ok(level) => level,
        };

        self.csrs.insert(csr::SEPC, trap.epc);
        self.csrs.insert(csr::SCAUSE, trap.cause.code());
        self.csrs.insert(csr::STVAL, trap.tval);

        status.set_spp(previous);
        status.set_spie(status.sie());
        status.set_sie(false);
        status.set_mpp(PrivilegeLevel::Supervisor);
        *regs.mstatus_mut() = status.bits();

        // Exceptions always enter at the vector base, even in vectored mode.
        let stvec = self.csrs.get(csr::STVEC).unwrap_or_default();
        *regs.mepc_mut() = stvec & !0b11;

        self.trap_log.push(trap.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::TransparentAccess;

    fn hart() -> SimHart {
        SimHart::new(Config::default()).unwrap()
    }

    #[test]
    fn test_invalid_ram() {
        let config = Config {
            ram_size: 0,
            ..Config::default()
        };
        assert_eq!(
            Err(ConfigError::InvalidRam {
                base: 0x8000_0000,
                size: 0
            }),
            SimHart::new(config).map(|_| ())
        );
    }

    #[test]
    fn test_trap_registers() {
        let hart = hart();
        let regs = hart.trap_registers(0x8000_0100);
        assert_eq!(0x8000_0100, regs.mepc());
        assert_eq!(PrivilegeLevel::Supervisor, Status::new(regs.mstatus()).mpp());
    }

    #[test]
    fn test_transparent_bracket() {
        let mut hart = hart();
        hart.ram_mut().write_word(0x8000_0010, 42).unwrap();
        {
            let mut access = TransparentAccess::enter(&mut hart);
            assert_eq!(Ok(42), access.load_reserved(0x8000_0010, false));
        }
        assert!(!hart.mstatus().mprv());
        assert_eq!(Some(0x8000_0010), hart.reservation());
    }

    #[test]
    fn test_reservation_lost() {
        let mut hart = hart();
        let address = 0x8000_0020;
        hart.schedule_remote_store(address, 9);
        let mut access = TransparentAccess::enter(&mut hart);
        assert_eq!(Ok(0), access.load_reserved(address, false));
        assert_eq!(Ok(false), access.store_conditional(address, 1, false));
        assert_eq!(Ok(9), access.load_reserved(address, false));
        assert_eq!(Ok(true), access.store_conditional(address, 10, false));
        drop(access);
        assert_eq!(Some(10), hart.ram().read_word(address));
        assert_eq!(1, hart.failed_store_conditionals());
        assert_eq!(None, hart.reservation());
    }

    #[test]
    fn test_memory_faults() {
        let mut hart = hart();
        let mut access = TransparentAccess::enter(&mut hart);
        assert_eq!(
            Err(Exception::LoadAddressMisaligned),
            access.load_reserved(0x8000_0002, false)
        );
        assert_eq!(Err(Exception::LoadAccessFault), access.load_reserved(0x1000, false));
        assert_eq!(
            Err(Exception::StoreOrAmoAddressMisaligned),
            access.store_conditional(0x8000_0001, 0, false)
        );
        assert_eq!(
            Err(Exception::StoreOrAmoAccessFault),
            access.store_conditional(0x1000, 0, false)
        );
    }

    #[test]
    fn test_fetch() {
        let mut hart = hart();
        let regs = hart.trap_registers(0x8000_0000);
        // c.nop followed by the low half of a 32-bit instruction
        hart.ram_mut()
            .load(0x8000_0000, &[0x01, 0x00, 0x2F, 0xA5, 0xC5, 0x00])
            .unwrap();
        assert_eq!(Ok(0x0001), hart.fetch_insn(0x8000_0000, &regs));
        assert_eq!(Ok(0x00C5_A52F), hart.fetch_insn(0x8000_0002, &regs));
        assert_eq!(
            Err(TrapInfo::new(0x8000_0001, Exception::InstructionAddressMisaligned, 0x8000_0001)),
            hart.fetch_insn(0x8000_0001, &regs)
        );
        assert_eq!(
            Err(TrapInfo::new(0x10, Exception::InstructionAccessFault, 0x10)),
            hart.fetch_insn(0x10, &regs)
        );
    }

    #[test]
    fn test_redirect() {
        let mut hart = hart();
        let mut regs = hart.trap_registers(0x8000_0100);
        let mut status = Status::new(regs.mstatus());
        status.set_sie(true);
        *regs.mstatus_mut() = status.bits();

        let trap = TrapInfo::illegal_instruction(0x8000_0100, 0xFFFF_FFFF);
        assert_eq!(Ok(()), hart.redirect(&mut regs, &trap));

        assert_eq!(0x8000_8000, regs.mepc());
        let status = Status::new(regs.mstatus());
        assert_eq!(PrivilegeLevel::Supervisor, status.spp());
        assert!(status.spie());
        assert!(!status.sie());
        assert_eq!(PrivilegeLevel::Supervisor, status.mpp());
        assert_eq!(Some(0x8000_0100), hart.csrs().get(csr::SEPC));
        assert_eq!(Some(2), hart.csrs().get(csr::SCAUSE));
        assert_eq!(Some(0xFFFF_FFFF), hart.csrs().get(csr::STVAL));
        assert_eq!(&[trap], hart.trap_log());
    }

    #[test]
    fn test_redirect_from_machine_mode() {
        let mut hart = SimHart::new(Config {
            trapped_from: PrivilegeLevel::Machine,
            ..Config::default()
        })
        .unwrap();
        let mut regs = hart.trap_registers(0x8000_0100);
        let trap = TrapInfo::illegal_instruction(0x8000_0100, 0);
        assert_eq!(
            Err(RedirectError::NoLowerPrivilege(PrivilegeLevel::Machine)),
            hart.redirect(&mut regs, &trap)
        );
        assert_eq!(0x8000_0100, regs.mepc());
        assert!(hart.trap_log().is_empty());
    }
}
