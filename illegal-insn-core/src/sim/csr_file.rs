use std::collections::BTreeMap;

use crate::csr::{self, CsrSpecifier};
use crate::hart::CsrError;
use crate::registers::{TrapRegisters, X};
use crate::status::Status;

/// CSRs that the simulated hart leaves to firmware emulation.
///
/// Plain registers are stored as-is. The unprivileged counter CSRs are read-only shadows of
/// [`Counters`], which is how a core without `cycle`/`time`/`instret` gets them emulated.
#[derive(Debug, Clone, Default)]
pub struct CsrFile {
    registers: BTreeMap<CsrSpecifier, X>,
    counters: Counters,
}

impl CsrFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `specifier` an implemented CSR holding `value`.
    pub fn insert(&mut self, specifier: CsrSpecifier, value: X) {
        self.registers.insert(specifier, value);
    }

    /// Removes `specifier`, making accesses to it fail with [`CsrError::NotImplemented`].
    pub fn remove(&mut self, specifier: CsrSpecifier) -> Option<X> {
        self.registers.remove(&specifier)
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// Reads `specifier` without access checks, as M-mode firmware would.
    pub fn get(&self, specifier: CsrSpecifier) -> Option<X> {
        match specifier {
            csr::CYCLE | csr::MCYCLE => Some(self.counters.mcycle as X),
            csr::TIME => Some(self.counters.mtime as X),
            csr::INSTRET | csr::MINSTRET => Some(self.counters.minstret as X),
            #[cfg(not(feature = "rv64"))]
            csr::CYCLEH | csr::MCYCLEH => Some((self.counters.mcycle >> 32) as X),
            #[cfg(not(feature = "rv64"))]
            csr::TIMEH => Some((self.counters.mtime >> 32) as X),
            #[cfg(not(feature = "rv64"))]
            csr::INSTRETH | csr::MINSTRETH => Some((self.counters.minstret >> 32) as X),
            _ => self.registers.get(&specifier).copied(),
        }
    }

    /// Writes `specifier` without access checks, as M-mode firmware would.
    ///
    /// Returns `None` if `specifier` is not implemented or is a read-only counter shadow.
    pub fn set(&mut self, specifier: CsrSpecifier, value: X) -> Option<()> {
        let slot = self.registers.get_mut(&specifier)?;
        *slot = value;
        Some(())
    }

    /// Reads `specifier` on behalf of the privilege level `regs` trapped from.
    pub fn read(&self, specifier: CsrSpecifier, regs: &TrapRegisters) -> Result<X, CsrError> {
        check_privilege(specifier, regs)?;
        self.get(specifier).ok_or(CsrError::NotImplemented(specifier))
    }

    /// Writes `specifier` on behalf of the privilege level `regs` trapped from.
    pub fn write(
        &mut self,
        specifier: CsrSpecifier,
        regs: &TrapRegisters,
        value: X,
    ) -> Result<(), CsrError> {
        check_privilege(specifier, regs)?;
        if self.get(specifier).is_none() {
            return Err(CsrError::NotImplemented(specifier));
        }
        if csr::is_read_only(specifier) {
            return Err(CsrError::ReadOnly(specifier));
        }
        self.set(specifier, value).ok_or(CsrError::ReadOnly(specifier))
    }
}

fn check_privilege(specifier: CsrSpecifier, regs: &TrapRegisters) -> Result<(), CsrError> {
    if !csr::is_valid(specifier) {
        return Err(CsrError::NotImplemented(specifier));
    }
    let required = csr::required_privilege_level(specifier);
    let trapped_from = Status::new(regs.mstatus()).mpp();
    if trapped_from < required {
        return Err(CsrError::Privilege {
            csr: specifier,
            required,
        });
    }
    Ok(())
}

/// The 64-bit counters backing the unprivileged counter CSRs.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub mcycle: u64,
    pub mtime: u64,
    pub minstret: u64,
}

impl Counters {
    /// Advances the counters as if `instructions` instructions retired, one cycle each.
    pub fn retire(&mut self, instructions: u64) {
        self.mcycle = self.mcycle.wrapping_add(instructions);
        self.minstret = self.minstret.wrapping_add(instructions);
    }

    pub fn advance_time(&mut self, ticks: u64) {
        self.mtime = self.mtime.wrapping_add(ticks);
    }
}

/// Returns the CSR file of a hart that implements the supervisor trap CSRs natively but has no
/// counter CSRs.
pub fn default_csr_file(stvec: X, hart_id: X) -> CsrFile {
    let mut file = CsrFile::new();
    for specifier in [
        csr::SSTATUS,
        csr::SIE,
        csr::SCOUNTEREN,
        csr::SSCRATCH,
        csr::SEPC,
        csr::SCAUSE,
        csr::STVAL,
        csr::SIP,
        csr::SATP,
    ] {
        file.insert(specifier, 0);
    }
    file.insert(csr::STVEC, stvec);
    file.insert(csr::MHARTID, hart_id);
    file
}
