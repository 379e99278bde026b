//! Machine-mode handling of illegal-instruction traps.
//!
//! Entry is [`handle_illegal_insn`]. The faulting instruction is dispatched on its opcode class
//! (`insn[6:2]`) through [`ILLEGAL_INSN_TABLE`]. Two classes are emulated:
//!
//! - `AMO`: the nine `AMO*.W` read-modify-write operations, built from `lr.w`/`sc.w` for cores that
//!   implement the reservation primitives but not the fused AMOs.
//! - `SYSTEM`: the six Zicsr instructions, for CSRs the hart lacks or doesn't expose to the trapped
//!   privilege level.
//!
//! Every other class, and every encoding within those two classes that cannot be emulated, is
//! redirected to the trapped privilege level as an illegal-instruction trap, exactly as if the
//! instruction had trapped there natively.

mod amo;
mod system;

use crate::hart::{FirmwareCounters, FirmwareEvent, Hart};
use crate::instruction::{self, OPCODE_CLASS_AMO, OPCODE_CLASS_SYSTEM};
use crate::registers::{TrapRegisters, X};
use crate::trap::{RedirectError, TrapInfo};
use log::{debug, trace};

/// How a trap was resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapOutcome {
    /// The instruction was emulated. `mepc` points past it.
    Resumed,
    /// A trap was delivered to the lower privilege level. `mepc` points at its handler.
    Redirected,
}

/// Result of handling a trap. An `Err` means the redirect primitive itself failed, in which case
/// the trap could neither be emulated nor delivered.
pub type HandlerResult = Result<TrapOutcome, RedirectError>;

/// Handler for one opcode class.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Handler {
    /// Redirect as an illegal instruction without looking any further.
    TrulyIllegal,
    /// Emulate as an atomic memory operation.
    Amo,
    /// Emulate as a CSR access.
    System,
}

/// Handler for every opcode class, indexed by `insn[6:2]`.
pub const ILLEGAL_INSN_TABLE: [Handler; 32] = illegal_insn_table();

const_assert_eq!(ILLEGAL_INSN_TABLE.len(), 1 << 5);

const fn illegal_insn_table() -> [Handler; 32] {
    let mut table = [Handler::TrulyIllegal; 32];
    table[OPCODE_CLASS_AMO as usize] = Handler::Amo;
    table[OPCODE_CLASS_SYSTEM as usize] = Handler::System;
    table
}

/// Handles an illegal-instruction trap taken from a lower privilege level.
///
/// `mtval` is the value hardware reported in `mtval`, which is either the faulting instruction or
/// `0`. `regs` is the context saved on trap entry; on return it describes the context to resume,
/// either just past the emulated instruction or in the lower level's trap handler.
///
/// Only 32-bit encodings are emulated. A zero or 16-bit `mtval` is resolved by re-fetching the
/// instruction with the trapped level's view of memory; if that fetch faults, the fault is
/// redirected instead.
pub fn handle_illegal_insn<H, C>(
    hart: &mut H,
    counters: &C,
    mtval: X,
    regs: &mut TrapRegisters,
) -> HandlerResult
where
    H: Hart + ?Sized,
    C: FirmwareCounters + ?Sized,
{
    counters.increment(FirmwareEvent::IllegalInsn);

    // Only the low 32 bits can hold an instruction we are able to dispatch on.
    let mut insn = mtval as u32;
    if !instruction::is_word_length(insn) {
        trace!("Re-fetching instruction at {:#x} (mtval {:#x})", regs.mepc(), mtval);
        insn = match hart.fetch_insn(regs.mepc(), regs) {
            Ok(insn) => insn,
            Err(mut trap) => {
                trap.epc = regs.mepc();
                return Emulator { hart, regs }.redirect(trap);
            }
        };
        if !instruction::is_word_length(insn) {
            return Emulator { hart, regs }.truly_illegal(insn);
        }
    }

    Emulator { hart, regs }.dispatch(insn)
}

/// Redirects `insn` to the trapped privilege level as an illegal instruction, reported at
/// `regs.mepc()`.
pub fn truly_illegal_insn<H: Hart + ?Sized>(
    hart: &mut H,
    insn: u32,
    regs: &mut TrapRegisters,
) -> HandlerResult {
    Emulator { hart, regs }.truly_illegal(insn)
}

/// Exclusive access to the hart and the trapped context for the duration of one trap.
struct Emulator<'h, 'r, H: Hart + ?Sized> {
    hart: &'h mut H,
    regs: &'r mut TrapRegisters,
}

impl<H: Hart + ?Sized> Emulator<'_, '_, H> {
    fn dispatch(&mut self, insn: u32) -> HandlerResult {
        let class = instruction::opcode_class(insn);
        let handler = ILLEGAL_INSN_TABLE[usize::from(class)];
        trace!("Dispatching {insn:#010x} (opcode class {class}) to {handler:?}");
        match handler {
            Handler::TrulyIllegal => self.truly_illegal(insn),
            Handler::Amo => self.amo(insn),
            Handler::System => self.system_opcode(insn),
        }
    }

    fn truly_illegal(&mut self, insn: u32) -> HandlerResult {
        self.redirect(TrapInfo::illegal_instruction(self.regs.mepc(), insn))
    }

    fn redirect(&mut self, trap: TrapInfo) -> HandlerResult {
        debug!(
            cause = trap.cause.code(), tval = trap.tval, epc = trap.epc;
            "Redirecting trap to lower privilege level"
        );
        self.hart.redirect(self.regs, &trap)?;
        Ok(TrapOutcome::Redirected)
    }

    /// Retires the emulated instruction.
    fn resume(&mut self) -> HandlerResult {
        self.regs.advance_mepc();
        Ok(TrapOutcome::Resumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_two_emulated_classes() {
        assert_eq!(Handler::Amo, ILLEGAL_INSN_TABLE[11]);
        assert_eq!(Handler::System, ILLEGAL_INSN_TABLE[28]);
        let redirected = ILLEGAL_INSN_TABLE
            .iter()
            .filter(|&&handler| handler == Handler::TrulyIllegal)
            .count();
        assert_eq!(30, redirected);
    }
}
