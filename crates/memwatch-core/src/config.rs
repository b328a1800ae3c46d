//! # Session Configuration
//!
//! Everything a [`Session`](crate::session::Session) needs to know before it
//! touches the device. Defaults reproduce the classic `watch` behaviour:
//! `/dev/mem`, nice -20 while sampling, 1 ms minimum gap threshold.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::types::{TimeNs, NANOS_PER_SEC};

/// How the device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAccess
{
    /// `O_RDONLY`, mappings are `PROT_READ`
    ReadOnly,
    /// `O_RDWR`, mappings are `PROT_READ | PROT_WRITE`
    ReadWrite,
}

/// Configuration for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig
{
    /// Explicit device path; overrides `kmem` when set
    pub device: Option<PathBuf>,
    /// Use `/dev/kmem` instead of `/dev/mem`
    pub kmem: bool,
    /// Nice value applied while sampling; `None` leaves priority alone
    pub run_priority: Option<i32>,
    /// Delay before the first measured read
    pub warmup: Duration,
    /// Lower bound for the reported gap threshold, in seconds
    pub min_time_diff: f64,
}

impl Default for WatchConfig
{
    fn default() -> Self
    {
        Self {
            device: None,
            kmem: false,
            run_priority: Some(constants::RUN_PRIORITY),
            warmup: constants::WARMUP_DELAY,
            min_time_diff: constants::TIME_DIFF_MIN_SECS,
        }
    }
}

impl WatchConfig
{
    /// Configuration for a custom device path (test files, `/dev/zero`, ...).
    pub fn with_device(path: impl Into<PathBuf>) -> Self
    {
        Self {
            device: Some(path.into()),
            ..Self::default()
        }
    }

    /// Path of the device this configuration selects.
    pub fn device_path(&self) -> &Path
    {
        match &self.device {
            Some(path) => path,
            None if self.kmem => Path::new(constants::DEV_KMEM),
            None => Path::new(constants::DEV_MEM),
        }
    }

    /// Gap threshold for the reporter: the larger of the configured minimum
    /// and a fixed multiple of the clock resolution.
    pub fn gap_threshold(&self, resolution: TimeNs) -> TimeNs
    {
        #[allow(clippy::cast_possible_truncation)]
        let floor = (self.min_time_diff * NANOS_PER_SEC as f64) as TimeNs;
        resolution.saturating_mul(constants::TIME_DIFF_MULT).max(floor)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_default_device()
    {
        let config = WatchConfig::default();
        assert_eq!(config.device_path(), Path::new("/dev/mem"));

        let kmem = WatchConfig {
            kmem: true,
            ..WatchConfig::default()
        };
        assert_eq!(kmem.device_path(), Path::new("/dev/kmem"));
    }

    #[test]
    fn test_explicit_device_wins_over_kmem()
    {
        let config = WatchConfig {
            kmem: true,
            ..WatchConfig::with_device("/tmp/fake")
        };
        assert_eq!(config.device_path(), Path::new("/tmp/fake"));
    }

    #[test]
    fn test_gap_threshold_floor_and_multiple()
    {
        let config = WatchConfig::default();
        // 10 x 25 ns is far below the 1 ms floor
        assert_eq!(config.gap_threshold(25), 1_000_000);
        // 10 x 200 us exceeds it
        assert_eq!(config.gap_threshold(200_000), 2_000_000);

        let tight = WatchConfig {
            min_time_diff: 0.0,
            ..WatchConfig::default()
        };
        assert_eq!(tight.gap_threshold(25), 250);
    }
}
