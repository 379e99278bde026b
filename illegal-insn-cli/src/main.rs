use clap::{Parser, ValueEnum};
use illegal_insn_core::registers::Specifier;
use illegal_insn_core::sim::{Config, EventCounters, SimHart};
use illegal_insn_core::{
    handle_illegal_insn, FirmwareEvent, PrivilegeLevel, TrapOutcome, TrapRegisters, X,
};
use log::info;
use std::io;
use stderrlog::LogLevelNum;

/// Runs one illegal-instruction trap through the emulation layer on a simulated hart.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Faulting instruction, in hex. Stored at `--pc` before the trap is taken.
    #[arg(value_parser = parse_insn)]
    insn: u32,
    /// Address of the faulting instruction.
    #[arg(long, default_value = "0x80000000", value_parser = parse_hex)]
    pc: X,
    /// Value reported in `mtval`. Defaults to the instruction itself; pass 0 to force a re-fetch.
    #[arg(long, value_parser = parse_hex)]
    mtval: Option<X>,
    /// Initial register value, as `xN=VALUE`. May be repeated.
    #[arg(long = "reg", value_parser = parse_reg)]
    registers: Vec<(Specifier, X)>,
    /// Initial memory word, as `ADDRESS=VALUE`. May be repeated.
    #[arg(long = "mem", value_parser = parse_mem)]
    memory: Vec<(X, u32)>,
    /// Initial CSR value, as `CSR=VALUE`. Makes the CSR implemented. May be repeated.
    #[arg(long = "csr", value_parser = parse_csr)]
    csrs: Vec<(u16, X)>,
    /// Privilege level the trap is taken from.
    #[arg(long, value_enum, default_value_t = Mode::S)]
    mode: Mode,
    /// Supervisor trap vector.
    #[arg(long, default_value = "0x80008000", value_parser = parse_hex)]
    stvec: X,
    /// Log verbosity. Repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Debug, Copy, Clone)]
enum Mode {
    U,
    S,
    M,
}

impl From<Mode> for PrivilegeLevel {
    fn from(value: Mode) -> Self {
        match value {
            Mode::U => PrivilegeLevel::User,
            Mode::S => PrivilegeLevel::Supervisor,
            Mode::M => PrivilegeLevel::Machine,
        }
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let verbosity = match args.verbose {
        0 => LogLevelNum::Warn,
        1 => LogLevelNum::Info,
        2 => LogLevelNum::Debug,
        _ => LogLevelNum::Trace,
    };
    stderrlog::new()
        .verbosity(verbosity)
        .modules([module_path!(), "illegal_insn_core"])
        .init()
        .unwrap();

    let config = Config {
        trapped_from: args.mode.into(),
        stvec: args.stvec,
        ..Config::default()
    };
    let mut hart =
        SimHart::new(config).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    store(&mut hart, args.pc, args.insn)?;
    for &(address, value) in &args.memory {
        store(&mut hart, address, value)?;
    }
    for &(csr, value) in &args.csrs {
        hart.csrs_mut().insert(csr, value);
    }

    let mut regs = hart.trap_registers(args.pc);
    for &(specifier, value) in &args.registers {
        regs.set_x(specifier, value);
    }
    let before = regs.clone();

    let counters = EventCounters::new();
    let mtval = args.mtval.unwrap_or(X::from(args.insn));
    info!("Trapping on {:#010x} at {:#x}", args.insn, args.pc);

    match handle_illegal_insn(&mut hart, &counters, mtval, &mut regs) {
        Ok(TrapOutcome::Resumed) => println!("resumed at {:#x}", regs.mepc()),
        Ok(TrapOutcome::Redirected) => {
            for trap in hart.trap_log() {
                println!(
                    "redirected: cause {} tval {:#x} epc {:#x}",
                    trap.cause.code(),
                    trap.tval,
                    trap.epc
                );
            }
            println!("entering supervisor handler at {:#x}", regs.mepc());
        }
        Err(err) => println!("unhandled: {err}"),
    }

    print_changes(&before, &regs);
    for &(address, _) in &args.memory {
        if let Some(word) = hart.ram().read_word(address) {
            println!("mem[{address:#x}] = {word:#010x}");
        }
    }
    println!(
        "illegal instruction traps: {}",
        counters.get(FirmwareEvent::IllegalInsn)
    );

    Ok(())
}

fn store(hart: &mut SimHart, address: X, value: u32) -> io::Result<()> {
    hart.ram_mut().write_word(address, value).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("address {address:#x} is not backed by RAM"),
        )
    })
}

fn print_changes(before: &TrapRegisters, after: &TrapRegisters) {
    for specifier in Specifier::iter_all() {
        let (old, new) = (before.x(specifier), after.x(specifier));
        if old != new {
            println!("{specifier}: {old:#x} -> {new:#x}");
        }
    }
}

fn parse_hex(s: &str) -> Result<X, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    X::from_str_radix(&digits.replace('_', ""), 16).map_err(|err| format!("`{s}`: {err}"))
}

fn parse_insn(s: &str) -> Result<u32, String> {
    let value = parse_hex(s)?;
    u32::try_from(value).map_err(|err| format!("`{s}`: {err}"))
}

fn split_assignment(s: &str) -> Result<(&str, &str), String> {
    s.split_once('=')
        .ok_or_else(|| format!("expected `KEY=VALUE`, got `{s}`"))
}

fn parse_reg(s: &str) -> Result<(Specifier, X), String> {
    let (name, value) = split_assignment(s)?;
    let specifier = name
        .strip_prefix('x')
        .and_then(|index| index.parse::<u8>().ok())
        .and_then(Specifier::new)
        .ok_or_else(|| format!("`{name}` is not a register, expected `x0` to `x31`"))?;
    Ok((specifier, parse_hex(value)?))
}

fn parse_mem(s: &str) -> Result<(X, u32), String> {
    let (address, value) = split_assignment(s)?;
    Ok((parse_hex(address)?, parse_insn(value)?))
}

fn parse_csr(s: &str) -> Result<(u16, X), String> {
    let (csr, value) = split_assignment(s)?;
    let csr = u16::try_from(parse_hex(csr)?).map_err(|err| format!("`{csr}`: {err}"))?;
    if csr > 0xFFF {
        return Err(format!("CSR {csr:#x} does not fit in 12 bits"));
    }
    Ok((csr, parse_hex(value)?))
}
