//! Untimed burst sampling.

use std::ptr::NonNull;

use tracing::debug;

use super::{alloc_buffer, round_up_unroll};
use crate::access::{self, Word};
use crate::constants::UNROLL;
use crate::error::{WatchError, WatchResult};
use crate::fault::guarded;
use crate::guards::PriorityGuard;
use crate::mapper::Resolution;
use crate::session::Session;
use crate::types::{AccessWidth, Address, BurstSamples};
use crate::with_width;

impl Session
{
    /// Read `address` back to back `count` times (rounded up to a multiple of
    /// the unroll factor), with timestamps only around the whole loop.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: zero count
    /// - `Clock` / `ClockResolution`: calibration or a timestamp failed
    /// - `Allocation`: the sample buffer could not be allocated
    /// - `Priority`: the scheduling priority could not be raised
    /// - `Fault`: a read raised SIGSEGV/SIGBUS
    /// - `Map`, `Io`, `ShortTransfer`: the device could not be accessed
    pub fn sample_burst(&mut self, address: Address, width: AccessWidth, count: usize) -> WatchResult<BurstSamples>
    {
        if count == 0 {
            return Err(WatchError::InvalidArgument("sample count must be non-zero".to_string()));
        }
        let count = round_up_unroll(count)
            .ok_or_else(|| WatchError::InvalidArgument(format!("sample count {count} is too large")))?;

        self.calibrate()?;
        let mut values = alloc_buffer::<u64>(count)?;
        debug!(%address, %width, count, "starting burst run");

        let clock = self.clock;
        let warmup = self.config.warmup;
        let priority = self.config.run_priority;

        let (start, end) = match self.mapper.resolve(&self.device, address, width.bytes())? {
            Resolution::Mapped(mapping) => {
                let ptr = mapping.as_ptr();
                with_width!(width, W => {
                    std::thread::sleep(warmup);
                    // SAFETY: inside the current window; faults are contained.
                    guarded(|| unsafe { access::load::<W>(ptr) }).map_err(|fault| fault.at(address))?;

                    let _priority = PriorityGuard::maybe_elevate(priority)?;
                    let start = clock.now()?;
                    guarded(|| unsafe { fill_burst::<W>(ptr, &mut values) }).map_err(|fault| fault.at(address))?;
                    (start, clock.now()?)
                })
            }
            Resolution::Unsupported => {
                std::thread::sleep(warmup);
                self.device.read_at(address, width)?;

                let _priority = PriorityGuard::maybe_elevate(priority)?;
                let start = clock.now()?;
                for value in &mut values {
                    *value = self.device.read_at(address, width)?;
                }
                (start, clock.now()?)
            }
        };

        Ok(BurstSamples { values, start, end })
    }
}

/// Fill `values` with reads of `ptr`, [`UNROLL`] open-coded reads at a time.
///
/// # Safety
///
/// Same contract as [`access::load`].
#[inline(always)]
unsafe fn fill_burst<W: Word>(ptr: NonNull<u8>, values: &mut [u64])
{
    let (groups, rest) = values.as_chunks_mut::<UNROLL>();
    for group in groups {
        *group = [
            access::load::<W>(ptr),
            access::load::<W>(ptr),
            access::load::<W>(ptr),
            access::load::<W>(ptr),
            access::load::<W>(ptr),
            access::load::<W>(ptr),
            access::load::<W>(ptr),
            access::load::<W>(ptr),
        ];
    }
    for value in rest {
        *value = access::load::<W>(ptr);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_fill_burst_reads_every_slot()
    {
        let source = 0xBEEF_u16;
        let ptr = NonNull::from(&source).cast::<u8>();
        let mut values = vec![0u64; 3 * UNROLL + 2];

        unsafe { fill_burst::<u16>(ptr, &mut values) };
        assert!(values.iter().all(|value| *value == 0xBEEF));
    }

    #[test]
    fn test_fill_burst_truncates_to_width()
    {
        let source = 0x1234_5678_u32;
        let ptr = NonNull::from(&source).cast::<u8>();
        let mut values = vec![0u64; UNROLL];

        unsafe { fill_burst::<u8>(ptr, &mut values) };
        let expected = u64::from(0x1234_5678_u32.to_ne_bytes()[0]);
        assert!(values.iter().all(|value| *value == expected));
    }
}
