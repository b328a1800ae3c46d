//! Command line argument types and their parsers.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use memwatch_core::config::WatchConfig;
use memwatch_core::constants;
use memwatch_core::types::{parse_hex, AccessWidth, Address};
use memwatch_core::WatchError;
use memwatch_utils::{LogFormat, LogLevel};

/// Watch, peek and poke physical memory.
#[derive(Parser, Debug)]
#[command(name = "memwatch")]
#[command(version)]
#[command(about = "Watch, peek and poke physical memory with fault containment", long_about = None)]
pub struct Cli
{
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs
{
    /// Memory device to open instead of /dev/mem (or /dev/kmem with the K prefix)
    #[arg(long, global = true, value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Nice value to run sampling at
    #[arg(
        long,
        global = true,
        allow_negative_numbers = true,
        default_value_t = constants::RUN_PRIORITY,
        value_parser = clap::value_parser!(i32).range(-20..=19)
    )]
    pub priority: i32,

    /// Leave the scheduling priority alone
    #[arg(long, global = true, default_value_t = false)]
    pub no_boost: bool,

    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log format: pretty or json (overrides MEMWATCH_LOG_FORMAT)
    #[arg(long, global = true, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl GlobalArgs
{
    /// Session configuration for these options.
    pub fn config(&self, kmem: bool) -> WatchConfig
    {
        WatchConfig {
            device: self.device.clone(),
            kmem,
            run_priority: (!self.no_boost).then_some(self.priority),
            ..WatchConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command
{
    /// Sample an address and report value changes and timing gaps
    Watch
    {
        /// Access size, optionally prefixed with U (untimed burst) and K (/dev/kmem): [U][K](B|W|L|Q)
        #[arg(value_name = "SIZE")]
        spec: WatchSpec,
        /// Address in hex; terms may be joined with + and -
        address: Address,
        /// Bits to watch, in hex
        #[arg(value_parser = parse_hex_arg)]
        mask: u64,
        /// Smallest timing gap to report, in seconds
        #[arg(value_parser = parse_seconds, default_value_t = constants::TIME_DIFF_MIN_SECS)]
        min_time_diff: f64,
        /// Run time in seconds
        #[arg(
            default_value_t = constants::DEFAULT_DURATION_SECS,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        duration: u64,
    },
    /// Read values
    Peek
    {
        /// Access size with optional K prefix and element stride: [K](B|W|L|Q)[stride]
        #[arg(value_name = "SIZE")]
        spec: AccessSpec,
        /// Address in hex; terms may be joined with + and -
        address: Address,
        /// Number of values to read
        #[arg(default_value_t = 1, value_parser = parse_count)]
        count: usize,
    },
    /// Write values
    Poke
    {
        /// Access size with optional K prefix and element stride: [K](B|W|L|Q)[stride]
        #[arg(value_name = "SIZE")]
        spec: AccessSpec,
        /// Address in hex; terms may be joined with + and -
        address: Address,
        /// Values to write, in hex
        #[arg(required = true, num_args = 1.., value_parser = parse_hex_arg)]
        values: Vec<u64>,
    },
}

/// `[U][K](B|W|L|Q)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSpec
{
    /// Burst sampling without per-read timestamps
    pub untimed: bool,
    /// Use /dev/kmem
    pub kmem: bool,
    /// Access width
    pub width: AccessWidth,
}

impl FromStr for WatchSpec
{
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let (untimed, rest) = strip_flag(s, 'u');
        let (kmem, rest) = strip_flag(rest, 'k');
        let width = rest
            .parse::<AccessWidth>()
            .map_err(|_| WatchError::InvalidArgument(format!("bad size '{s}'")))?;
        Ok(Self { untimed, kmem, width })
    }
}

/// `[K](B|W|L|Q)[stride]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessSpec
{
    /// Use /dev/kmem
    pub kmem: bool,
    /// Access width
    pub width: AccessWidth,
    /// Distance between consecutive accesses, in elements
    pub stride: u64,
}

impl FromStr for AccessSpec
{
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let (kmem, rest) = strip_flag(s, 'k');
        let mut chars = rest.chars();
        let width = chars
            .next()
            .and_then(AccessWidth::from_letter)
            .ok_or_else(|| WatchError::InvalidArgument(format!("bad size '{s}'")))?;
        let stride = match chars.as_str() {
            "" => 1,
            digits => parse_number(digits).ok_or_else(|| WatchError::InvalidArgument(format!("bad stride '{digits}'")))?,
        };
        Ok(Self { kmem, width, stride })
    }
}

fn strip_flag(s: &str, flag: char) -> (bool, &str)
{
    match s.chars().next() {
        Some(first) if first.eq_ignore_ascii_case(&flag) => (true, &s[first.len_utf8()..]),
        _ => (false, s),
    }
}

/// Parse an unsigned number the way C's `strtoull(.., 0)` does: `0x` prefix
/// for hex, a leading `0` for octal, decimal otherwise.
pub fn parse_number(s: &str) -> Option<u64>
{
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    match s.strip_prefix('0') {
        Some("") => Some(0),
        Some(octal) => u64::from_str_radix(octal, 8).ok(),
        None => s.parse().ok(),
    }
}

fn parse_hex_arg(s: &str) -> Result<u64, WatchError>
{
    parse_hex(s).ok_or_else(|| WatchError::InvalidArgument(format!("bad hex value '{s}'")))
}

fn parse_count(s: &str) -> Result<usize, WatchError>
{
    parse_number(s)
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| WatchError::InvalidArgument(format!("bad count '{s}'")))
}

fn parse_seconds(s: &str) -> Result<f64, WatchError>
{
    match s.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Ok(seconds),
        _ => Err(WatchError::InvalidArgument(format!("bad min time diff '{s}'"))),
    }
}
