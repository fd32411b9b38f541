//!
//! Command line front end: loads a program image, runs it and prints the final state together
//! with everything the program changed.
//!

use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use y86sim::config::Config;
use y86sim::instruction::disassemble;
use y86sim::loader::Image;
use y86sim::simulator::{Diff, RunOutcome, State, Status};
use y86sim::{report, Error};

fn init_tracing(trace: bool) {
    let filter = if trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn print_listing(image: &Image) {
    eprintln!("{}", "Instructions: ---------------".bright_blue());
    for segment in image.segments() {
        for (addr, instr) in disassemble(segment.address, &segment.bytes) {
            eprintln!("{}: {}", format!("{:#05x}", addr).bright_blue(), instr);
        }
    }
    eprintln!("{}", "-----------------------------".bright_blue());
}

fn run(config: &Config) -> Result<RunOutcome, Error> {
    let image = Image::read_file(&config.file, config.format)?;
    if config.print_instructions {
        print_listing(&image);
    }

    let mut state = State::new();
    state.allocate(config.memory_size)?;
    state.load(&image)?;

    let before = state.snapshot()?;
    let outcome = state.run(config.max_steps);

    report::print_outcome(outcome)?;
    report::print_state(&state)?;
    if !config.no_diff {
        report::print_diff(&Diff::between(&before, &state))?;
    }

    Ok(outcome)
}

fn main() -> ExitCode {
    let config = match Config::get() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.trace);
    if let Some(notice) = &config.memory_size_notice {
        eprintln!("{}", notice);
    }

    match run(&config) {
        Ok(RunOutcome::Finished(Status::Halted)) => ExitCode::SUCCESS,
        Ok(RunOutcome::Finished(_)) => ExitCode::from(2),
        Ok(RunOutcome::StepLimitExceeded { .. }) => ExitCode::from(3),
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            ExitCode::FAILURE
        }
    }
}
