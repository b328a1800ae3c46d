//! # Change Reporter
//!
//! Turns sample buffers into line-oriented text.
//!
//! Timed runs report only interesting transitions: a pair of consecutive
//! samples is printed when a masked bit changed between them, or when the gap
//! between their timestamps exceeds the threshold.
//!
//! ```text
//! 1700000000.000001000...1700000000.000001040 (0.000000040):  00->01
//! ```
//!
//! Burst runs (and peeks) print every value in rows.

use std::io::{self, Write};

use crate::types::{AccessWidth, BurstSamples, Seconds, TimeNs, TimedSample};

/// Filter and formatter for sampling results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeReporter
{
    width: AccessWidth,
    mask: u64,
    threshold: TimeNs,
}

impl ChangeReporter
{
    /// Reporter for values of `width`, watching the bits in `mask`, flagging
    /// gaps longer than `threshold` ns.
    pub fn new(width: AccessWidth, mask: u64, threshold: TimeNs) -> Self
    {
        Self { width, mask, threshold }
    }

    /// Consecutive sample pairs worth reporting.
    pub fn changes<'a>(&self, samples: &'a [TimedSample]) -> impl Iterator<Item = (TimedSample, TimedSample)> + 'a
    {
        let ChangeReporter { mask, threshold, .. } = *self;
        samples
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .filter(move |(before, after)| {
                (before.value ^ after.value) & mask != 0 || after.time - before.time > threshold
            })
    }

    /// Write one line per reported pair. Returns the number of lines written.
    pub fn write_timed<W: Write>(&self, out: &mut W, samples: &[TimedSample]) -> io::Result<usize>
    {
        let digits = self.width.hex_digits();
        let mut lines = 0;
        for (before, after) in self.changes(samples) {
            writeln!(
                out,
                "{}...{} ({}):  {:0digits$X}->{:0digits$X}",
                Seconds(before.time),
                Seconds(after.time),
                Seconds(after.time - before.time),
                before.value,
                after.value,
            )?;
            lines += 1;
        }
        Ok(lines)
    }

    /// Write every burst value in rows, then the timing summary.
    pub fn write_burst<W: Write>(&self, out: &mut W, burst: &BurstSamples, resolution: TimeNs) -> io::Result<()>
    {
        write_rows(out, self.width, &burst.values)?;
        writeln!(
            out,
            "Took {} ns for {} samples, average = {}",
            burst.elapsed(resolution),
            burst.values.len(),
            burst.average(resolution)
        )
    }
}

/// Write `values` as space-prefixed, zero-padded hex, [`AccessWidth::per_row`]
/// values per line.
pub fn write_rows<W: Write>(out: &mut W, width: AccessWidth, values: &[u64]) -> io::Result<()>
{
    let digits = width.hex_digits();
    for row in values.chunks(width.per_row()) {
        for value in row {
            write!(out, " {value:0digits$X}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn render_timed(reporter: &ChangeReporter, samples: &[TimedSample]) -> (usize, String)
    {
        let mut out = Vec::new();
        let lines = reporter.write_timed(&mut out, samples).unwrap();
        (lines, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_value_change_is_reported()
    {
        let reporter = ChangeReporter::new(AccessWidth::Byte, 0xff, 1000);
        let samples = [TimedSample::new(0, 0x00), TimedSample::new(5, 0x01)];

        let (lines, text) = render_timed(&reporter, &samples);
        assert_eq!(lines, 1);
        assert!(text.contains("00->01"));
        assert_eq!(text, "0.000000000...0.000000005 (0.000000005):  00->01\n");
    }

    #[test]
    fn test_equal_values_are_silent()
    {
        let reporter = ChangeReporter::new(AccessWidth::Byte, 0xff, 1000);
        let samples = [TimedSample::new(0, 0), TimedSample::new(5, 0)];

        assert_eq!(render_timed(&reporter, &samples), (0, String::new()));
    }

    #[test]
    fn test_masked_bits_are_ignored()
    {
        let reporter = ChangeReporter::new(AccessWidth::Long, 0x0000_00f0, 1000);
        let samples = [
            TimedSample::new(0, 0x1000_0001),
            TimedSample::new(10, 0x2000_0002),
            TimedSample::new(20, 0x2000_0012),
        ];

        let reported: Vec<_> = reporter.changes(&samples).collect();
        assert_eq!(reported, vec![(samples[1], samples[2])]);
    }

    #[test]
    fn test_gap_is_reported()
    {
        let reporter = ChangeReporter::new(AccessWidth::Word, 0xffff, 1000);
        let samples = [
            TimedSample::new(3_000_000_000, 0xabcd),
            TimedSample::new(3_000_000_500, 0xabcd),
            TimedSample::new(3_000_002_000, 0xabcd),
        ];

        let (lines, text) = render_timed(&reporter, &samples);
        assert_eq!(lines, 1);
        assert_eq!(text, "3.000000500...3.000002000 (0.000001500):  ABCD->ABCD\n");
    }

    #[test]
    fn test_rows_per_width()
    {
        let mut out = Vec::new();
        write_rows(&mut out, AccessWidth::Quad, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            " 0000000000000001 0000000000000002 0000000000000003 0000000000000004\n 0000000000000005\n"
        );

        let mut out = Vec::new();
        write_rows(&mut out, AccessWidth::Byte, &[0xab; 17]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(text.lines().next().map(str::len), Some(16 * 3));
    }

    #[test]
    fn test_burst_summary()
    {
        let reporter = ChangeReporter::new(AccessWidth::Long, u64::MAX, 0);
        let burst = BurstSamples {
            values: vec![0x12345678; 8],
            start: 100,
            end: 920,
        };

        let mut out = Vec::new();
        reporter.write_burst(&mut out, &burst, 20).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(" 12345678 12345678"));
        assert!(text.ends_with("Took 800 ns for 8 samples, average = 100\n"));
    }
}
