//! # Samplers
//!
//! High-rate polling of a single address.
//!
//! - [`timed`]: one timestamp per read; catches value changes and gaps in
//!   the polling itself (interrupts, preemption, bus stalls)
//! - [`burst`]: no per-read timestamps, eight open-coded reads per loop
//!   iteration; catches glitches shorter than a clock read
//!
//! Both samplers follow the same discipline:
//!
//! 1. Validate the request and calibrate the clock (once per session)
//! 2. Allocate the whole buffer up front
//! 3. Resolve the address, sleep for the warm-up delay and touch the address
//!    once, so page-table and cache misses don't land in the samples
//! 4. Raise the scheduling priority (restored when the run ends, on any path)
//! 5. Run the tight loop under a single fault guard
//!
//! A fault or clock failure discards the partial buffer.

use std::time::Duration;

use crate::constants::UNROLL;
use crate::error::{WatchError, WatchResult};
use crate::types::TimeNs;

pub mod burst;
pub mod timed;

/// Round `n` up to a multiple of the unroll factor.
fn round_up_unroll(n: usize) -> Option<usize>
{
    n.checked_next_multiple_of(UNROLL)
}

/// Slots needed to cover `duration` at one sample per `resolution` ns.
///
/// Never less than one unroll group.
pub fn timed_slots(duration: Duration, resolution: TimeNs) -> WatchResult<usize>
{
    let resolution = u128::try_from(resolution.max(1)).unwrap_or(1);
    let slots = usize::try_from(duration.as_nanos() / resolution)
        .ok()
        .and_then(|slots| round_up_unroll(slots.max(1)));
    slots.ok_or_else(|| WatchError::InvalidArgument(format!("duration {duration:?} is too long")))
}

/// Burst sample count for a run of `secs` seconds.
pub fn burst_count(secs: u64) -> WatchResult<usize>
{
    usize::try_from(secs)
        .ok()
        .and_then(|secs| secs.checked_mul(crate::constants::BURST_SAMPLES_PER_SEC))
        .and_then(round_up_unroll)
        .ok_or_else(|| WatchError::InvalidArgument(format!("duration {secs} is too long")))
}

/// Allocate a zeroed buffer of `len` samples, failing cleanly on exhaustion.
fn alloc_buffer<T: Clone + Default>(len: usize) -> WatchResult<Vec<T>>
{
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| WatchError::Allocation { samples: len })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}
