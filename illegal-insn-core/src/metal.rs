//! Reservation primitives of the hart this code runs on.
//!
//! Only built for RISC-V targets. The rest of [`Hart`](crate::hart::Hart) is platform firmware
//! business (trap CSRs, counters, the unprivileged fetch helper), so it is left to the embedder.

use core::arch::asm;

use crate::hart::ExclusiveAccess;
use crate::registers::X;
use crate::status::MSTATUS_MPRV;
use crate::trap::Exception;

/// Direct access to the current hart's `mstatus` and `lr.w`/`sc.w`.
///
/// A faulting access traps into M-mode's own trap handler, so the methods below never return
/// `Err`. Firmware that wants the fault redirected installs a temporary `mtvec` around the call,
/// as it does for unprivileged loads.
#[derive(Debug, Default)]
pub struct Metal;

impl ExclusiveAccess for Metal {
    fn enter_transparent(&mut self) -> X {
        let previous: X;
        // SAFETY: setting MPRV only changes the translation and protection of M-mode loads and
        // stores, which are all issued through `Metal` until `exit_transparent`.
        unsafe {
            asm!(
                "csrrs {previous}, mstatus, {mprv}",
                previous = out(reg) previous,
                mprv = in(reg) MSTATUS_MPRV,
            );
        }
        previous
    }

    fn exit_transparent(&mut self, saved: X) {
        // SAFETY: restores the value read by `enter_transparent`.
        unsafe {
            asm!("csrw mstatus, {x}", x = in(reg) saved);
        }
    }

    fn load_reserved(&mut self, address: X, acquire: bool) -> Result<u32, Exception> {
        let value: X;
        // SAFETY: the address comes from the trapped context and is translated with its view of
        // memory; a faulting access traps instead of touching firmware memory.
        unsafe {
            if acquire {
                asm!("lr.w.aq {value}, ({address})", value = out(reg) value, address = in(reg) address);
            } else {
                asm!("lr.w {value}, ({address})", value = out(reg) value, address = in(reg) address);
            }
        }
        // lr.w sign-extends on RV64
        Ok(value as u32)
    }

    fn store_conditional(
        &mut self,
        address: X,
        value: u32,
        release: bool,
    ) -> Result<bool, Exception> {
        let failed: X;
        let value = X::from(value);
        // SAFETY: see `load_reserved`.
        unsafe {
            if release {
                asm!(
                    "sc.w.rl {failed}, {value}, ({address})",
                    failed = out(reg) failed,
                    value = in(reg) value,
                    address = in(reg) address,
                );
            } else {
                asm!(
                    "sc.w {failed}, {value}, ({address})",
                    failed = out(reg) failed,
                    value = in(reg) value,
                    address = in(reg) address,
                );
            }
        }
        Ok(failed == 0)
    }
}
