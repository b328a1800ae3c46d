//! # Constants
//!
//! Centralized tuning constants for sampling and reporting.
//!
//! ## Organization
//!
//! Constants are organized by category:
//! - Device paths
//! - Sampling loop shape
//! - Calibration
//! - Anomaly thresholds
//! - Scheduling

use std::time::Duration;

// ============================================================================
// Device Paths
// ============================================================================

/// Physical memory device
pub const DEV_MEM: &str = "/dev/mem";

/// Kernel virtual memory device (absent on most modern kernels)
pub const DEV_KMEM: &str = "/dev/kmem";

// ============================================================================
// Sampling Loop Shape
// ============================================================================

/// log2 of the number of open-coded reads per burst iteration
pub const UNROLL_SHIFT: u32 = 3;

/// Open-coded reads per burst iteration.
///
/// Sample buffers of both samplers are sized to a multiple of this.
pub const UNROLL: usize = 1 << UNROLL_SHIFT;

/// Delay before sampling starts, so first-touch costs land outside the run
pub const WARMUP_DELAY: Duration = Duration::from_millis(1);

/// Default run duration in seconds
pub const DEFAULT_DURATION_SECS: u64 = 2;

/// Burst samples taken per second of requested duration
pub const BURST_SAMPLES_PER_SEC: usize = 8;

// ============================================================================
// Calibration
// ============================================================================

/// Consecutive clock reads used to find the clock's resolution
pub const TIMING_PROBES: usize = 10;

// ============================================================================
// Anomaly Thresholds
// ============================================================================

/// Gap threshold as a multiple of the calibrated clock resolution
pub const TIME_DIFF_MULT: i64 = 10;

/// Lower bound for the gap threshold, in seconds
pub const TIME_DIFF_MIN_SECS: f64 = 1.0e-3;

// ============================================================================
// Scheduling
// ============================================================================

/// Nice value used while sampling (most favourable)
pub const RUN_PRIORITY: i32 = -20;
