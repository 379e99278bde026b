use illegal_insn_core::csr;
use illegal_insn_core::registers::Specifier;
use illegal_insn_core::sim::{Config, EventCounters, SimHart};
use illegal_insn_core::{
    handle_illegal_insn, truly_illegal_insn, Exception, FirmwareEvent, PrivilegeLevel,
    RedirectError, TrapInfo, TrapOutcome, TrapRegisters, X,
};

const PC: X = 0x8000_0000;
const DATA: X = 0x8000_1000;
const STVEC: X = 0x8000_8000;

const AMOADD: u32 = 0b00000;
const AMOSWAP: u32 = 0b00001;
const LR: u32 = 0b00010;
const SC: u32 = 0b00011;
const AMOXOR: u32 = 0b00100;
const AMOOR: u32 = 0b01000;
const AMOAND: u32 = 0b01100;
const AMOMIN: u32 = 0b10000;
const AMOMAX: u32 = 0b10100;
const AMOMINU: u32 = 0b11000;
const AMOMAXU: u32 = 0b11100;

const CSRRW: u32 = 0b001;
const CSRRS: u32 = 0b010;
const CSRRC: u32 = 0b011;
const CSRRWI: u32 = 0b101;
const CSRRSI: u32 = 0b110;
const CSRRCI: u32 = 0b111;

fn reg(specifier: Specifier) -> u32 {
    u32::from(specifier)
}

/// `AMO*.W rd, rs2, (rs1)`
fn amo(funct5: u32, rd: Specifier, rs1: Specifier, rs2: Specifier) -> u32 {
    (funct5 << 27) | (reg(rs2) << 20) | (reg(rs1) << 15) | (0b010 << 12) | (reg(rd) << 7) | 0x2F
}

/// Zicsr instruction; `source` is `rs1` or `uimm` depending on `funct3`.
fn zicsr(funct3: u32, rd: Specifier, csr: u16, source: u32) -> u32 {
    (u32::from(csr) << 20) | (source << 15) | (funct3 << 12) | (reg(rd) << 7) | 0x73
}

struct Fixture {
    hart: SimHart,
    counters: EventCounters,
    regs: TrapRegisters,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let hart = SimHart::new(config).unwrap();
        let regs = hart.trap_registers(PC);
        Self {
            hart,
            counters: EventCounters::new(),
            regs,
        }
    }

    fn store(&mut self, address: X, value: u32) {
        self.hart.ram_mut().write_word(address, value).unwrap();
    }

    fn load(&self, address: X) -> u32 {
        self.hart.ram().read_word(address).unwrap()
    }

    fn trap(&mut self, mtval: X) -> Result<TrapOutcome, RedirectError> {
        handle_illegal_insn(&mut self.hart, &self.counters, mtval, &mut self.regs)
    }

    fn run(&mut self, insn: u32) -> Result<TrapOutcome, RedirectError> {
        self.trap(X::from(insn))
    }

    /// Asserts that exactly one trap was delivered to the supervisor, and that it is `expected`.
    fn assert_redirected(&self, expected: TrapInfo) {
        assert_eq!(STVEC, self.regs.mepc());
        assert_eq!(Some(expected.epc), self.hart.csrs().get(csr::SEPC));
        assert_eq!(Some(expected.cause.code()), self.hart.csrs().get(csr::SCAUSE));
        assert_eq!(Some(expected.tval), self.hart.csrs().get(csr::STVAL));
        assert_eq!(&[expected], self.hart.trap_log());
    }

    fn assert_illegal(&self, insn: u32) {
        self.assert_redirected(TrapInfo::illegal_instruction(PC, insn));
    }
}

#[test]
fn test_amo_operations() {
    let minus_three = -3_i32 as u32;
    let cases = [
        (AMOADD, 10, 5, 15),
        (AMOSWAP, 10, 5, 5),
        (AMOXOR, 0b0101, 0b0011, 0b0110),
        (AMOOR, 0b0101, 0b0011, 0b0111),
        (AMOAND, 0b0101, 0b0011, 0b0001),
        (AMOMIN, 2, minus_three, minus_three),
        (AMOMAX, 2, minus_three, 2),
        (AMOMINU, 2, minus_three, 2),
        (AMOMAXU, 2, minus_three, minus_three),
    ];
    for (funct5, old, operand, new) in cases {
        let mut fixture = Fixture::new();
        fixture.store(DATA, old);
        fixture.regs.set_x(Specifier::A1, DATA);
        fixture.regs.set_x(Specifier::A2, X::from(operand));

        let insn = amo(funct5, Specifier::A0, Specifier::A1, Specifier::A2);
        assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn), "funct5 {funct5:#07b}");
        assert_eq!(new, fixture.load(DATA), "funct5 {funct5:#07b}");
        assert_eq!(X::from(old), fixture.regs.x(Specifier::A0));
        assert_eq!(PC + 4, fixture.regs.mepc());
        assert!(fixture.hart.trap_log().is_empty());
        assert!(!fixture.hart.mstatus().mprv());
    }
}

#[test]
fn test_amoadd_returns_old_value() {
    let mut fixture = Fixture::new();
    fixture.store(DATA, 10);
    fixture.regs.set_x(Specifier::A1, DATA);
    fixture.regs.set_x(Specifier::A2, 5);

    let insn = amo(AMOADD, Specifier::A0, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
    assert_eq!(10, fixture.regs.x(Specifier::A0));
    assert_eq!(15, fixture.load(DATA));
    assert_eq!(PC + 4, fixture.regs.mepc());
    assert_eq!(DATA, fixture.regs.x(Specifier::A1));
    assert_eq!(5, fixture.regs.x(Specifier::A2));
}

#[test]
fn test_amo_into_x0() {
    let mut fixture = Fixture::new();
    fixture.store(DATA, 1);
    fixture.regs.set_x(Specifier::A1, DATA);
    fixture.regs.set_x(Specifier::A2, 2);

    let insn = amo(AMOOR, Specifier::X0, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
    assert_eq!(3, fixture.load(DATA));
    assert_eq!(0, fixture.regs.x(Specifier::X0));
}

#[test]
fn test_amoswap_twice_restores_memory() {
    let mut fixture = Fixture::new();
    fixture.store(DATA, 0xCAFE);
    fixture.regs.set_x(Specifier::A1, DATA);
    fixture.regs.set_x(Specifier::A2, 0xBEEF);

    // amoswap.w a2, a2, (a1)
    let insn = amo(AMOSWAP, Specifier::A2, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
    assert_eq!(0xBEEF, fixture.load(DATA));
    assert_eq!(0xCAFE, fixture.regs.x(Specifier::A2));

    *fixture.regs.mepc_mut() = PC;
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
    assert_eq!(0xCAFE, fixture.load(DATA));
    assert_eq!(0xBEEF, fixture.regs.x(Specifier::A2));
}

#[test]
fn test_amo_retries_after_lost_reservation() {
    let mut fixture = Fixture::new();
    fixture.store(DATA, 10);
    fixture.hart.schedule_remote_store(DATA, 20);
    fixture.regs.set_x(Specifier::A1, DATA);
    fixture.regs.set_x(Specifier::A2, 5);

    let insn = amo(AMOADD, Specifier::A0, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
    assert_eq!(1, fixture.hart.failed_store_conditionals());
    assert_eq!(20, fixture.regs.x(Specifier::A0));
    assert_eq!(25, fixture.load(DATA));
}

#[test]
fn test_lr_sc_are_redirected() {
    for funct5 in [LR, SC] {
        let mut fixture = Fixture::new();
        fixture.store(DATA, 7);
        fixture.regs.set_x(Specifier::A1, DATA);

        let insn = amo(funct5, Specifier::A0, Specifier::A1, Specifier::A2);
        assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
        fixture.assert_illegal(insn);
        assert_eq!(7, fixture.load(DATA));
        assert_eq!(0, fixture.regs.x(Specifier::A0));
    }
}

#[test]
fn test_unknown_amo_is_redirected() {
    let mut fixture = Fixture::new();
    let insn = amo(0b00101, Specifier::A0, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
    fixture.assert_illegal(insn);
}

#[test]
fn test_misaligned_amo_faults() {
    let mut fixture = Fixture::new();
    fixture.regs.set_x(Specifier::A1, DATA + 2);
    fixture.regs.set_x(Specifier::A0, 0x1234);

    let insn = amo(AMOADD, Specifier::A0, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
    fixture.assert_redirected(TrapInfo::new(
        PC,
        Exception::StoreOrAmoAddressMisaligned,
        DATA + 2,
    ));
    assert_eq!(0x1234, fixture.regs.x(Specifier::A0));
    assert!(!fixture.hart.mstatus().mprv());
}

#[test]
fn test_unmapped_amo_faults() {
    let mut fixture = Fixture::new();
    fixture.regs.set_x(Specifier::A1, 0x1000);

    let insn = amo(AMOSWAP, Specifier::A0, Specifier::A1, Specifier::A2);
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
    fixture.assert_redirected(TrapInfo::new(PC, Exception::StoreOrAmoAccessFault, 0x1000));
}

#[test]
fn test_other_classes_are_redirected() {
    for class in (0..32).filter(|&class| class != 0b01_011 && class != 0b11_100) {
        let mut fixture = Fixture::new();
        let insn = 0xFFFF_FF83 | (class << 2);
        assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn), "class {class}");
        fixture.assert_illegal(insn);
    }
}

#[test]
fn test_csrrs_sets_bits() {
    let mut fixture = Fixture::new();
    fixture.hart.csrs_mut().insert(csr::SSCRATCH, 0b0100);
    fixture.regs.set_x(Specifier::A1, 0b0011);

    let insn = zicsr(CSRRS, Specifier::A0, csr::SSCRATCH, reg(Specifier::A1));
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
    assert_eq!(Some(0b0111), fixture.hart.csrs().get(csr::SSCRATCH));
    assert_eq!(0b0100, fixture.regs.x(Specifier::A0));
    assert_eq!(PC + 4, fixture.regs.mepc());
}

#[test]
fn test_csr_write_and_clear() {
    let cases: [(u32, u32, u32, u32); 5] = [
        (CSRRW, 0b1100, 0b0110, 0b0110),
        (CSRRC, 0b1100, 0b0110, 0b1000),
        (CSRRWI, 0b1100, 0b00110, 0b0110),
        (CSRRSI, 0b1100, 0b00011, 0b1111),
        (CSRRCI, 0b1100, 0b00100, 0b1000),
    ];
    for (funct3, old, operand, new) in cases {
        let mut fixture = Fixture::new();
        fixture.hart.csrs_mut().insert(csr::SSCRATCH, X::from(old));
        let source = if funct3 & 0b100 == 0 {
            fixture.regs.set_x(Specifier::A1, X::from(operand));
            reg(Specifier::A1)
        } else {
            operand
        };

        let insn = zicsr(funct3, Specifier::A0, csr::SSCRATCH, source);
        assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn), "funct3 {funct3:#05b}");
        assert_eq!(Some(X::from(new)), fixture.hart.csrs().get(csr::SSCRATCH));
        assert_eq!(X::from(old), fixture.regs.x(Specifier::A0));
    }
}

#[test]
fn test_csr_write_with_zero_operand() {
    for (funct3, source) in [(CSRRW, reg(Specifier::X0)), (CSRRWI, 0)] {
        let mut fixture = Fixture::new();
        fixture.hart.csrs_mut().insert(csr::SSCRATCH, 0x55);

        let insn = zicsr(funct3, Specifier::A0, csr::SSCRATCH, source);
        assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
        assert_eq!(Some(0), fixture.hart.csrs().get(csr::SSCRATCH));
        assert_eq!(0x55, fixture.regs.x(Specifier::A0));
    }
}

#[test]
fn test_counter_read_never_writes() {
    // The counters are read-only, so any write attempt would end in a redirect.
    for funct3 in [CSRRS, CSRRC, CSRRSI, CSRRCI] {
        let mut fixture = Fixture::new();
        fixture.hart.csrs_mut().counters_mut().retire(42);

        let insn = zicsr(funct3, Specifier::A0, csr::CYCLE, 0);
        assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn), "funct3 {funct3:#05b}");
        assert_eq!(42, fixture.regs.x(Specifier::A0));
        assert_eq!(PC + 4, fixture.regs.mepc());
    }
}

#[test]
fn test_counter_write_is_redirected() {
    // rs1 = a1 holds zero, but only rs1 = x0 suppresses the write.
    for funct3 in [CSRRW, CSRRS, CSRRC] {
        let mut fixture = Fixture::new();
        let insn = zicsr(funct3, Specifier::A0, csr::CYCLE, reg(Specifier::A1));
        assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
        fixture.assert_illegal(insn);
    }
    let mut fixture = Fixture::new();
    let insn = zicsr(CSRRWI, Specifier::A0, csr::TIME, 0);
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
    fixture.assert_illegal(insn);
}

#[test]
fn test_unimplemented_csr_is_redirected() {
    let mut fixture = Fixture::new();
    fixture.regs.set_x(Specifier::A0, 0x77);
    fixture.regs.set_x(Specifier::A1, 0x99);

    // A custom S-mode read/write CSR nothing implements.
    let insn = zicsr(CSRRW, Specifier::A0, 0x5C0, reg(Specifier::A1));
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
    fixture.assert_illegal(insn);
    assert_eq!(0x77, fixture.regs.x(Specifier::A0));
    assert_eq!(None, fixture.hart.csrs().get(0x5C0));
}

#[test]
fn test_csr_privilege_is_enforced() {
    let mut fixture = Fixture::with_config(Config {
        trapped_from: PrivilegeLevel::User,
        ..Config::default()
    });
    fixture.hart.csrs_mut().insert(csr::SSCRATCH, 0x55);

    let insn = zicsr(CSRRS, Specifier::A0, csr::SSCRATCH, reg(Specifier::X0));
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
    fixture.assert_illegal(insn);
    assert_eq!(0, fixture.regs.x(Specifier::A0));

    let insn = zicsr(CSRRS, Specifier::A0, csr::CYCLE, reg(Specifier::X0));
    let mut fixture = Fixture::with_config(Config {
        trapped_from: PrivilegeLevel::User,
        ..Config::default()
    });
    assert_eq!(Ok(TrapOutcome::Resumed), fixture.run(insn));
}

#[test]
fn test_non_csr_system_instructions_are_redirected() {
    let reserved = zicsr(0b100, Specifier::A0, csr::SSCRATCH, 0);
    // ecall, wfi, and the reserved funct3
    for insn in [0x0000_0073, 0x1050_0073, reserved] {
        let mut fixture = Fixture::new();
        assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(insn));
        fixture.assert_illegal(insn);
    }
}

#[test]
fn test_refetch_when_mtval_is_zero() {
    let mut fixture = Fixture::new();
    let insn = amo(AMOADD, Specifier::A0, Specifier::A1, Specifier::A2);
    fixture.store(PC, insn);
    fixture.store(DATA, 1);
    fixture.regs.set_x(Specifier::A1, DATA);
    fixture.regs.set_x(Specifier::A2, 2);

    assert_eq!(Ok(TrapOutcome::Resumed), fixture.trap(0));
    assert_eq!(3, fixture.load(DATA));
    assert_eq!(1, fixture.regs.x(Specifier::A0));
}

#[test]
fn test_refetched_word_is_reported() {
    let mut fixture = Fixture::new();
    // fld fa0, 0(a1), on a hart without the D extension
    let insn = 0x0005_B507;
    fixture.store(PC, insn);

    assert_eq!(Ok(TrapOutcome::Redirected), fixture.trap(0));
    fixture.assert_illegal(insn);
}

#[test]
fn test_compressed_instruction_is_redirected() {
    let mut fixture = Fixture::new();
    // c.fld fa0, 0(a1), followed by padding
    fixture.store(PC, 0x0000_2188);

    assert_eq!(Ok(TrapOutcome::Redirected), fixture.trap(0x2188));
    fixture.assert_illegal(0x2188);
}

#[test]
fn test_fetch_fault_is_redirected() {
    let mut fixture = Fixture::new();
    *fixture.regs.mepc_mut() = 0x1000;

    assert_eq!(Ok(TrapOutcome::Redirected), fixture.trap(0));
    assert_eq!(STVEC, fixture.regs.mepc());
    assert_eq!(
        &[TrapInfo::new(0x1000, Exception::InstructionAccessFault, 0x1000)],
        fixture.hart.trap_log()
    );
    assert_eq!(Some(1), fixture.hart.csrs().get(csr::SCAUSE));
}

#[test]
fn test_illegal_insn_event_is_counted() {
    let mut fixture = Fixture::new();
    fixture.regs.set_x(Specifier::A1, DATA);
    let insn = amo(AMOADD, Specifier::A0, Specifier::A1, Specifier::A2);
    fixture.run(insn).unwrap();
    assert_eq!(1, fixture.counters.get(FirmwareEvent::IllegalInsn));

    fixture.run(0xFFFF_FFFF).unwrap();
    assert_eq!(2, fixture.counters.get(FirmwareEvent::IllegalInsn));
    assert_eq!(0, fixture.counters.get(FirmwareEvent::MisalignedLoad));
}

#[test]
fn test_trap_from_machine_mode_cannot_be_redirected() {
    let mut fixture = Fixture::with_config(Config {
        trapped_from: PrivilegeLevel::Machine,
        ..Config::default()
    });
    assert_eq!(
        Err(RedirectError::NoLowerPrivilege(PrivilegeLevel::Machine)),
        fixture.run(0xFFFF_FFFF)
    );
    assert_eq!(PC, fixture.regs.mepc());
    assert!(fixture.hart.trap_log().is_empty());
}

#[test]
fn test_vectored_stvec_enters_at_base() {
    let mut fixture = Fixture::with_config(Config {
        stvec: STVEC | 0b01,
        ..Config::default()
    });
    assert_eq!(Ok(TrapOutcome::Redirected), fixture.run(0xFFFF_FFFF));
    assert_eq!(STVEC, fixture.regs.mepc());
}

#[test]
fn test_truly_illegal_insn() {
    let mut fixture = Fixture::new();
    let insn = amo(AMOADD, Specifier::A0, Specifier::A1, Specifier::A2);
    assert_eq!(
        Ok(TrapOutcome::Redirected),
        truly_illegal_insn(&mut fixture.hart, insn, &mut fixture.regs)
    );
    fixture.assert_illegal(insn);
    assert_eq!(0, fixture.counters.get(FirmwareEvent::IllegalInsn));
}
