//! Timestamped sampling.

use std::time::Duration;

use tracing::debug;

use super::{alloc_buffer, timed_slots};
use crate::access;
use crate::clock::Clock;
use crate::error::{WatchError, WatchResult};
use crate::fault::guarded;
use crate::guards::PriorityGuard;
use crate::mapper::Resolution;
use crate::session::Session;
use crate::types::{AccessWidth, Address, TimedSample};
use crate::with_width;

impl Session
{
    /// Poll `address` for `duration`, timestamping every read.
    ///
    /// The buffer holds one slot per calibrated clock tick over the duration,
    /// rounded up to a multiple of the unroll factor. The run always fills
    /// the whole buffer, so the actual wall time depends on how fast the
    /// address can be read.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: zero duration
    /// - `Clock` / `ClockResolution`: calibration or a timestamp failed
    /// - `Allocation`: the sample buffer could not be allocated
    /// - `Priority`: the scheduling priority could not be raised
    /// - `Fault`: a read raised SIGSEGV/SIGBUS
    /// - `Map`, `Io`, `ShortTransfer`: the device could not be accessed
    pub fn sample_timed(&mut self, address: Address, width: AccessWidth, duration: Duration) -> WatchResult<Vec<TimedSample>>
    {
        if duration.is_zero() {
            return Err(WatchError::InvalidArgument("duration must be non-zero".to_string()));
        }

        let resolution = self.calibrate()?;
        let slots = timed_slots(duration, resolution)?;
        let mut samples = alloc_buffer::<TimedSample>(slots)?;
        debug!(%address, %width, slots, resolution, "starting timed run");

        let clock = self.clock;
        let warmup = self.config.warmup;
        let priority = self.config.run_priority;

        match self.mapper.resolve(&self.device, address, width.bytes())? {
            Resolution::Mapped(mapping) => {
                let ptr = mapping.as_ptr();
                with_width!(width, W => {
                    // SAFETY: inside the current window; faults are contained.
                    let read = || -> WatchResult<u64> { Ok(unsafe { access::load::<W>(ptr) }) };
                    std::thread::sleep(warmup);
                    guarded(read).map_err(|fault| fault.at(address))??;

                    let _priority = PriorityGuard::maybe_elevate(priority)?;
                    guarded(|| fill_timed(clock, &mut samples, read)).map_err(|fault| fault.at(address))??;
                });
            }
            Resolution::Unsupported => {
                let device = &self.device;
                let read = || device.read_at(address, width);
                std::thread::sleep(warmup);
                read()?;

                let _priority = PriorityGuard::maybe_elevate(priority)?;
                fill_timed(clock, &mut samples, read)?;
            }
        }

        Ok(samples)
    }
}

/// Fill every slot with a timestamp followed by a read.
///
/// Stops at the first failing clock read or access.
pub(crate) fn fill_timed<R>(clock: Clock, samples: &mut [TimedSample], mut read: R) -> WatchResult<()>
where
    R: FnMut() -> WatchResult<u64>,
{
    for sample in samples {
        sample.time = clock.now()?;
        sample.value = read()?;
    }
    Ok(())
}
