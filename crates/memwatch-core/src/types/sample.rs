//! Sample types produced by the samplers.

use std::fmt;

/// Nanoseconds since the clock's epoch.
///
/// Signed so that differences between two readings are plain subtractions.
pub type TimeNs = i64;

/// Nanoseconds per second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// One timestamped read
///
/// The timestamp is taken immediately *before* the read, so `time` bounds
/// the moment the value was on the bus from below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimedSample
{
    /// Clock reading taken just before the access
    pub time: TimeNs,
    /// Value read, zero-extended from the access width
    pub value: u64,
}

impl TimedSample
{
    /// Create a sample from a timestamp and a value.
    pub const fn new(time: TimeNs, value: u64) -> Self
    {
        Self { time, value }
    }
}

/// Result of a burst run: values only, bracketed by two timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstSamples
{
    /// Values in read order
    pub values: Vec<u64>,
    /// Clock reading immediately before the first read
    pub start: TimeNs,
    /// Clock reading immediately after the last read
    pub end: TimeNs,
}

impl BurstSamples
{
    /// Time spent in the read loop, minus one clock-resolution unit to
    /// approximate the cost of the two bracketing clock reads.
    pub fn elapsed(&self, resolution: TimeNs) -> TimeNs
    {
        self.end - self.start - resolution
    }

    /// Average cost per read in nanoseconds.
    pub fn average(&self, resolution: TimeNs) -> TimeNs
    {
        match i64::try_from(self.values.len()) {
            Ok(count) if count > 0 => self.elapsed(resolution) / count,
            _ => 0,
        }
    }
}

/// `sec.nnnnnnnnn` rendering of a nanosecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seconds(pub TimeNs);

impl fmt::Display for Seconds
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let sign = if self.0 < 0 { "-" } else { "" };
        let nanos = self.0.unsigned_abs();
        let per_sec = NANOS_PER_SEC.unsigned_abs();
        write!(f, "{sign}{}.{:09}", nanos / per_sec, nanos % per_sec)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_seconds_display()
    {
        assert_eq!(Seconds(1_500_000_000).to_string(), "1.500000000");
        assert_eq!(Seconds(5).to_string(), "0.000000005");
    }

    #[test]
    fn test_negative_seconds_keep_their_sign()
    {
        assert_eq!(Seconds(-500).to_string(), "-0.000000500");
        assert_eq!(Seconds(-1_500_000_000).to_string(), "-1.500000000");
        assert_eq!(Seconds(i64::MIN).to_string(), "-9223372036.854775808");
    }

    #[test]
    fn test_burst_average_subtracts_resolution()
    {
        let burst = BurstSamples {
            values: vec![0; 16],
            start: 1_000,
            end: 1_180,
        };
        assert_eq!(burst.elapsed(20), 160);
        assert_eq!(burst.average(20), 10);
    }
}
