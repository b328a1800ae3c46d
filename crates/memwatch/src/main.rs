use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use memwatch_core::config::{DeviceAccess, WatchConfig};
use memwatch_core::report::{write_rows, ChangeReporter};
use memwatch_core::sampler::burst_count;
use memwatch_core::types::Address;
use memwatch_core::{Session, WatchResult};
use memwatch_utils::{
    debug, info, init_logging, init_logging_with_format, init_logging_with_level, LogGuard, LoggingError,
};

mod args;

use args::{AccessSpec, Cli, Command, GlobalArgs, WatchSpec};

/// Exit code when logging can't be set up
const EXIT_LOGGING: u8 = 1;

fn main() -> ExitCode
{
    let cli = Cli::parse();

    // Logs go to stderr; keep the guard so file output is flushed on exit
    let _log_guard = match start_logging(&cli.global) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(EXIT_LOGGING);
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "command failed");
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn start_logging(global: &GlobalArgs) -> Result<LogGuard, LoggingError>
{
    match (global.log_level, global.log_format) {
        (None, None) => init_logging(),
        (None, Some(format)) => init_logging_with_format(format),
        (Some(level), format) => init_logging_with_level(level, format.unwrap_or_default()),
    }
}

fn run_command(cli: Cli) -> WatchResult<()>
{
    match cli.command {
        Command::Watch {
            spec,
            address,
            mask,
            min_time_diff,
            duration,
        } => watch(&cli.global, spec, address, mask, min_time_diff, duration),
        Command::Peek { spec, address, count } => peek(&cli.global, spec, address, count),
        Command::Poke { spec, address, values } => poke(&cli.global, spec, address, &values),
    }
}

fn watch(
    global: &GlobalArgs,
    spec: WatchSpec,
    address: Address,
    mask: u64,
    min_time_diff: f64,
    duration: u64,
) -> WatchResult<()>
{
    let config = WatchConfig {
        min_time_diff,
        ..global.config(spec.kmem)
    };
    let mut session = Session::open(config, DeviceAccess::ReadOnly)?;
    let resolution = session.calibrate()?;
    let reporter = ChangeReporter::new(spec.width, mask, session.gap_threshold()?);

    let mut out = BufWriter::new(io::stdout().lock());
    if spec.untimed {
        let burst = session.sample_burst(address, spec.width, burst_count(duration)?)?;
        reporter.write_burst(&mut out, &burst, resolution)?;
    } else {
        let samples = session.sample_timed(address, spec.width, Duration::from_secs(duration))?;
        let reported = reporter.write_timed(&mut out, &samples)?;
        info!(samples = samples.len(), reported, "watch finished");
    }
    out.flush()?;
    Ok(())
}

fn peek(global: &GlobalArgs, spec: AccessSpec, address: Address, count: usize) -> WatchResult<()>
{
    let mut session = Session::open(global.config(spec.kmem), DeviceAccess::ReadOnly)?;
    let mut values = Vec::new();
    let outcome = session.peek_into(address, spec.width, spec.stride, count, &mut values);

    // Print what was read even if a later element failed
    let mut out = BufWriter::new(io::stdout().lock());
    write_rows(&mut out, spec.width, &values)?;
    out.flush()?;
    outcome
}

fn poke(global: &GlobalArgs, spec: AccessSpec, address: Address, values: &[u64]) -> WatchResult<()>
{
    let mut session = Session::open(global.config(spec.kmem), DeviceAccess::ReadWrite)?;
    session.poke_many(address, spec.width, spec.stride, values)
}
