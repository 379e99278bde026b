use super::{Emulator, HandlerResult};
use crate::hart::{Hart, TransparentAccess};
use crate::instruction::AmoInsn;
use crate::registers::X;
use crate::trap::{Exception, TrapInfo};
use log::trace;

impl<H: Hart + ?Sized> Emulator<'_, '_, H> {
    /// Emulates an `AMO*.W` instruction with an `lr.w`/`sc.w` retry loop.
    ///
    /// > AMOs can either operate on 64-bit (RV64 only) or 32-bit words in memory. [...] The AMOs
    /// > were designed to implement the C11 and C++11 memory models efficiently.
    ///
    /// Only the 32-bit forms are emulated. The width field is not looked at, so an `AMO*.D` on
    /// RV64 is performed on the low word only, and the loaded word is zero-extended into `rd`.
    ///
    /// Every load and store is issued with the trapped level's view of memory. The computation in
    /// between runs outside of that bracket, but inside the reservation, so the store only lands
    /// if no other hart wrote the word in the meantime.
    pub(super) fn amo(&mut self, insn: u32) -> HandlerResult {
        let amo = match AmoInsn::decode(insn) {
            Ok(amo) => amo,
            Err(err) => {
                trace!("Not emulating {insn:#010x}: {err}");
                return self.truly_illegal(insn);
            }
        };

        let address = self.regs.x(amo.addr);
        // Only the low word of the operand takes part in a 32-bit AMO.
        let operand = self.regs.x(amo.src) as u32;

        let old = loop {
            let loaded =
                TransparentAccess::enter(&mut *self.hart).load_reserved(address, amo.acquire);
            let old = match loaded {
                Ok(old) => old,
                Err(cause) => return self.amo_fault(cause, address),
            };

            let new = amo.op.apply(old, operand);

            let stored = TransparentAccess::enter(&mut *self.hart).store_conditional(
                address,
                new,
                amo.release,
            );
            match stored {
                Ok(true) => break old,
                Ok(false) => trace!("Reservation on {address:#x} lost, retrying {:?}", amo.op),
                Err(cause) => return self.amo_fault(cause, address),
            }
        };

        self.regs.set_x(amo.dest, X::from(old));
        self.resume()
    }

    /// Redirects a fault raised by the emulated memory access.
    ///
    /// Native AMOs report both halves of the access as store/AMO faults, so load faults raised by
    /// the `lr.w` are reported as such.
    fn amo_fault(&mut self, cause: Exception, address: X) -> HandlerResult {
        let cause = match cause {
            Exception::LoadAddressMisaligned => Exception::StoreOrAmoAddressMisaligned,
            Exception::LoadAccessFault => Exception::StoreOrAmoAccessFault,
            Exception::LoadPageFault => Exception::StoreOrAmoPageFault,
            other => other,
        };
        self.redirect(TrapInfo::new(self.regs.mepc(), cause, address))
    }
}
