use super::{Emulator, HandlerResult};
use crate::hart::Hart;
use crate::instruction::{CsrInsn, CsrOp, CsrOperand};
use crate::registers::{Specifier, X};
use log::{debug, trace};

impl<H: Hart + ?Sized> Emulator<'_, '_, H> {
    /// Emulates a Zicsr instruction through the hart's [`CsrBridge`](crate::hart::CsrBridge).
    ///
    /// > If rd=x0, then the instruction shall not read the CSR and shall not cause any of the side
    /// > effects that might occur on a CSR read.
    ///
    /// The bridge is read regardless of `rd`; the value written to `x0` is simply dropped. The
    /// write side does follow the architected rules: `csrrs`/`csrrc` with `rs1 = x0` and
    /// `csrrsi`/`csrrci` with `uimm = 0` never write, while `csrrw`/`csrrwi` always do.
    pub(super) fn system_opcode(&mut self, insn: u32) -> HandlerResult {
        let csr_insn = match CsrInsn::decode(insn) {
            Ok(csr_insn) => csr_insn,
            Err(err) => {
                trace!("Not emulating {insn:#010x}: {err}");
                return self.truly_illegal(insn);
            }
        };

        let old = match self.hart.read_csr(csr_insn.csr, self.regs) {
            Ok(value) => value,
            Err(err) => {
                debug!("Read of CSR {:#05x} refused: {err}", csr_insn.csr);
                return self.truly_illegal(insn);
            }
        };

        let (operand, modifies) = match csr_insn.source {
            CsrOperand::Register(src) => (self.regs.x(src), src != Specifier::X0),
            CsrOperand::Immediate(uimm) => (X::from(uimm), uimm != 0),
        };
        let (new, write) = match csr_insn.op {
            CsrOp::Write => (operand, true),
            CsrOp::Set => (old | operand, modifies),
            CsrOp::Clear => (old & !operand, modifies),
        };

        if write {
            if let Err(err) = self.hart.write_csr(csr_insn.csr, self.regs, new) {
                debug!("Write of CSR {:#05x} refused: {err}", csr_insn.csr);
                return self.truly_illegal(insn);
            }
        }

        self.regs.set_x(csr_insn.dest, old);
        self.resume()
    }
}
