//! Human readable dumps of a [`State`] and of a [`Diff`] between two states.
//!
//! Every value is printed in memory order, least significant byte first, so `5` in a register
//! shows up as `0x05000000`, the same way it would be laid out in memory.

use crate::simulator::register_names::Register;
use crate::simulator::{Diff, RunOutcome, State};
use owo_colors::OwoColorize;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Bytes of the program shown next to the program counter
const PC_WINDOW: usize = 6;

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Formats the lowest `count` bytes of `x`, least significant first
pub fn memory_hex(x: u32, count: usize, prefix: bool) -> String {
    let mut s = String::with_capacity(2 + 2 * count);
    if prefix {
        s.push_str("0x");
    }
    for i in 0..count.min(4) {
        let _ = write!(s, "{:02x}", (x >> (i * 8)) & 0xff);
    }
    s
}

pub fn write_state<W: Write>(w: &mut W, state: &State) -> io::Result<()> {
    writeln!(w, "{}", "Registers:".bright_blue())?;
    for row in Register::ALL.chunks(4) {
        for &reg in row {
            write!(
                w,
                "  {}: {}",
                reg.name().bright_blue(),
                memory_hex(state.register(reg) as u32, 4, true)
            )?;
        }
        writeln!(w)?;
    }

    let cc = state.codes();
    writeln!(w, "{}", "Condition Codes:".bright_blue())?;
    writeln!(
        w,
        "  ZF:  {:>10}  SF:  {:>10}  OF:  {:>10}",
        bool_str(cc.zf),
        bool_str(cc.sf),
        bool_str(cc.of)
    )?;

    writeln!(w, "{}", "Program Counter:".bright_blue())?;
    write!(w, "  PC:  {}  Mem:", memory_hex(state.pc() as u32, 4, true))?;
    for i in 0..PC_WINDOW as i64 {
        // bytes outside of memory read as zero
        let byte = usize::try_from(state.pc() as i64 + i)
            .ok()
            .and_then(|addr| state.memory_byte(addr))
            .unwrap_or(0);
        write!(w, " {}", memory_hex(byte as u32, 1, false))?;
    }
    writeln!(w)?;

    let status = state.status();
    writeln!(w, "{}", "Program Status:".bright_blue())?;
    writeln!(w, "  STR: {:>10}  VAL: {:>10}", status.name(), status.code())?;

    writeln!(w, "{}", "Steps:".bright_blue())?;
    writeln!(w, "  {}", state.steps())?;

    Ok(())
}

pub fn write_diff<W: Write>(w: &mut W, diff: &Diff) -> io::Result<()> {
    if diff.is_empty() {
        writeln!(w, "{}", "No changes.".bright_blue())?;
        return Ok(());
    }

    if !diff.registers.is_empty() {
        writeln!(w, "{}", "Changed registers:".bright_blue())?;
        for change in &diff.registers {
            writeln!(
                w,
                "  {}: {} -> {}",
                change.register.name().bright_blue(),
                memory_hex(change.before as u32, 4, true),
                memory_hex(change.after as u32, 4, true).bright_yellow()
            )?;
        }
    }

    if !diff.memory.is_empty() {
        writeln!(w, "{}", "Changed memory:".bright_blue())?;
        for change in &diff.memory {
            writeln!(
                w,
                "  {}: {} -> {}",
                format!("{:#010x}", change.address).bright_blue(),
                memory_hex(change.before, 4, true),
                memory_hex(change.after, 4, true).bright_yellow()
            )?;
        }
    }

    Ok(())
}

pub fn write_outcome<W: Write>(w: &mut W, outcome: RunOutcome) -> io::Result<()> {
    match outcome {
        RunOutcome::Finished(status) => writeln!(
            w,
            "{} Stopped with status {}",
            "[-]".bright_blue(),
            status.bright_yellow()
        ),
        RunOutcome::StepLimitExceeded { steps } => writeln!(
            w,
            "{} Step limit exceeded after {} steps",
            "[!]".bright_red(),
            steps.bright_yellow()
        ),
    }
}

pub fn print_state(state: &State) -> io::Result<()> {
    write_state(&mut io::stderr().lock(), state)
}

pub fn print_diff(diff: &Diff) -> io::Result<()> {
    write_diff(&mut io::stderr().lock(), diff)
}

pub fn print_outcome(outcome: RunOutcome) -> io::Result<()> {
    write_outcome(&mut io::stderr().lock(), outcome)
}
