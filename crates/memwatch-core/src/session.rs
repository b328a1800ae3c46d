//! # Session
//!
//! One open device plus everything derived from it: the mapped window, the
//! clock and its calibration.
//!
//! A session is the entry point for every access. Single reads and writes
//! (`peek`/`poke`) live here; the sampling runs are in [`crate::sampler`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use memwatch_core::config::{DeviceAccess, WatchConfig};
//! use memwatch_core::types::{AccessWidth, Address};
//! use memwatch_core::Session;
//!
//! let mut session = Session::open(WatchConfig::default(), DeviceAccess::ReadOnly)?;
//! let id = session.peek(Address::new(0xfe00_0000), AccessWidth::Long)?;
//! println!("{id:08X}");
//! # Ok::<(), memwatch_core::WatchError>(())
//! ```

use tracing::debug;

use crate::access;
use crate::clock::Clock;
use crate::config::{DeviceAccess, WatchConfig};
use crate::device::MemDevice;
use crate::error::{WatchError, WatchResult};
use crate::fault::{guarded, install_handlers};
use crate::mapper::{AddressMapper, Resolution};
use crate::types::{AccessWidth, Address, TimeNs};
use crate::with_width;

/// An open memory device and its access state.
#[derive(Debug)]
pub struct Session
{
    pub(crate) config: WatchConfig,
    pub(crate) device: MemDevice,
    pub(crate) mapper: AddressMapper,
    pub(crate) clock: Clock,
    resolution: Option<TimeNs>,
}

impl Session
{
    /// Install the fault handlers and open the configured device.
    ///
    /// Use [`DeviceAccess::ReadWrite`] only for writes; reading and sampling
    /// work on a read-only descriptor.
    ///
    /// ## Errors
    ///
    /// - `SignalSetup`: the fault handlers could not be installed
    /// - `DeviceOpen`: the device could not be opened
    /// - `PageSize`: the page size could not be determined
    pub fn open(config: WatchConfig, access: DeviceAccess) -> WatchResult<Self>
    {
        install_handlers()?;
        let device = MemDevice::open(config.device_path(), access)?;
        let mapper = AddressMapper::new(access)?;

        Ok(Self {
            config,
            device,
            mapper,
            clock: Clock::default(),
            resolution: None,
        })
    }

    /// Use a different clock for timestamps and calibration.
    pub fn with_clock(mut self, clock: Clock) -> Self
    {
        self.clock = clock;
        self.resolution = None;
        self
    }

    /// The session's configuration.
    pub fn config(&self) -> &WatchConfig
    {
        &self.config
    }

    /// The clock used for timestamps.
    pub fn clock(&self) -> Clock
    {
        self.clock
    }

    /// The mapper owning the current window.
    pub fn mapper(&self) -> &AddressMapper
    {
        &self.mapper
    }

    /// Calibrated clock resolution, if [`Session::calibrate`] has run.
    pub fn resolution(&self) -> Option<TimeNs>
    {
        self.resolution
    }

    /// Measure the clock resolution once and remember it.
    ///
    /// ## Errors
    ///
    /// - `Clock` / `ClockResolution`: see [`Clock::calibrate`]
    pub fn calibrate(&mut self) -> WatchResult<TimeNs>
    {
        match self.resolution {
            Some(resolution) => Ok(resolution),
            None => {
                let resolution = self.clock.calibrate()?;
                self.resolution = Some(resolution);
                Ok(resolution)
            }
        }
    }

    /// Gap threshold for change reports, calibrating first if needed.
    ///
    /// ## Errors
    ///
    /// Same as [`Session::calibrate`].
    pub fn gap_threshold(&mut self) -> WatchResult<TimeNs>
    {
        let resolution = self.calibrate()?;
        Ok(self.config.gap_threshold(resolution))
    }

    /// Read one value.
    ///
    /// A misaligned address is accessed as is; the window then spans the two
    /// pages it straddles, and the hardware may answer with SIGBUS.
    ///
    /// ## Errors
    ///
    /// - `Fault`: the access raised SIGSEGV/SIGBUS
    /// - `Map`, `Io`, `ShortTransfer`: the device could not be accessed
    pub fn peek(&mut self, address: Address, width: AccessWidth) -> WatchResult<u64>
    {
        match self.mapper.resolve(&self.device, address, width.bytes())? {
            Resolution::Mapped(mapping) => {
                let ptr = mapping.as_ptr();
                // SAFETY: inside the current window; faults are contained.
                guarded(|| with_width!(width, W => unsafe { access::load::<W>(ptr) })).map_err(|fault| fault.at(address))
            }
            Resolution::Unsupported => self.device.read_at(address, width),
        }
    }

    /// Write one value, truncated to `width`.
    ///
    /// ## Errors
    ///
    /// Same as [`Session::peek`]. Writing through a read-only session faults.
    pub fn poke(&mut self, address: Address, width: AccessWidth, value: u64) -> WatchResult<()>
    {
        let value = width.truncate(value);
        match self.mapper.resolve(&self.device, address, width.bytes())? {
            Resolution::Mapped(mapping) => {
                let ptr = mapping.as_ptr();
                // SAFETY: inside the current window; faults are contained.
                guarded(|| with_width!(width, W => unsafe { access::store::<W>(ptr, value) }))
                    .map_err(|fault| fault.at(address))
            }
            Resolution::Unsupported => self.device.write_at(address, width, value),
        }
    }

    /// Read `count` values starting at `address`, `stride` elements apart.
    ///
    /// A stride of 1 reads consecutive values; 0 re-reads the same address.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: an address range that wraps
    /// - `Allocation`: the result buffer could not be allocated
    /// - any error of [`Session::peek`]; use [`Session::peek_into`] to keep
    ///   the values read before it
    pub fn peek_many(&mut self, address: Address, width: AccessWidth, stride: u64, count: usize) -> WatchResult<Vec<u64>>
    {
        let mut values = Vec::new();
        self.peek_into(address, width, stride, count, &mut values)?;
        Ok(values)
    }

    /// Like [`Session::peek_many`], appending to `values` as it goes.
    ///
    /// On error, `values` holds everything read before the failing element.
    ///
    /// ## Errors
    ///
    /// Same as [`Session::peek_many`].
    pub fn peek_into(
        &mut self,
        address: Address,
        width: AccessWidth,
        stride: u64,
        count: usize,
        values: &mut Vec<u64>,
    ) -> WatchResult<()>
    {
        values
            .try_reserve_exact(count)
            .map_err(|_| WatchError::Allocation { samples: count })?;

        for index in 0..count {
            let at = element_address(address, width, stride, index)?;
            values.push(self.peek(at, width)?);
        }
        debug!(%address, %width, stride, count, "peeked");
        Ok(())
    }

    /// Write `values` in sequence starting at `address`, `stride` elements apart.
    ///
    /// ## Errors
    ///
    /// Same as [`Session::peek_many`]. Values before a failing write stay written.
    pub fn poke_many(&mut self, address: Address, width: AccessWidth, stride: u64, values: &[u64]) -> WatchResult<()>
    {
        for (index, value) in values.iter().enumerate() {
            let at = element_address(address, width, stride, index)?;
            self.poke(at, width, *value)?;
        }
        debug!(%address, %width, stride, count = values.len(), "poked");
        Ok(())
    }
}

fn element_address(base: Address, width: AccessWidth, stride: u64, index: usize) -> WatchResult<Address>
{
    (width.bytes() as u64)
        .checked_mul(stride)
        .and_then(|step| step.checked_mul(index as u64))
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| WatchError::InvalidArgument(format!("address range from {base} overflows")))
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use super::*;
    use crate::mapper::page_size;

    fn device(pages: usize) -> tempfile::NamedTempFile
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; pages * page_size().unwrap()]).unwrap();
        file.flush().unwrap();
        file
    }

    fn open(path: &std::path::Path, access: DeviceAccess) -> Session
    {
        let config = WatchConfig {
            run_priority: None,
            ..WatchConfig::with_device(path)
        };
        Session::open(config, access).unwrap()
    }

    #[test]
    fn test_round_trip_every_width()
    {
        let file = device(1);
        let mut session = open(file.path(), DeviceAccess::ReadWrite);

        for width in AccessWidth::ALL {
            let address = Address::new(0x40);
            let value = 0xA5C3_0FF0_1234_5678 & width.value_mask();
            session.poke(address, width, value).unwrap();
            assert_eq!(session.peek(address, width).unwrap(), value, "{width}");
        }
        assert_eq!(session.mapper().map_calls(), 1);
    }

    #[test]
    fn test_poke_truncates_to_width()
    {
        let file = device(1);
        let mut session = open(file.path(), DeviceAccess::ReadWrite);

        session.poke(Address::new(0), AccessWidth::Quad, 0).unwrap();
        session.poke(Address::new(0), AccessWidth::Byte, 0x1ff).unwrap();
        assert_eq!(session.peek(Address::new(0), AccessWidth::Quad).unwrap(), 0xff);
    }

    #[test]
    fn test_strided_access()
    {
        let file = device(1);
        let mut session = open(file.path(), DeviceAccess::ReadWrite);

        session
            .poke_many(Address::new(0x100), AccessWidth::Word, 2, &[0x1111, 0x2222, 0x3333])
            .unwrap();
        assert_eq!(
            session.peek_many(Address::new(0x100), AccessWidth::Word, 1, 6).unwrap(),
            vec![0x1111, 0, 0x2222, 0, 0x3333, 0]
        );
        assert_eq!(
            session.peek_many(Address::new(0x104), AccessWidth::Word, 0, 3).unwrap(),
            vec![0x2222; 3]
        );
    }

    #[test]
    fn test_access_straddling_a_page_maps_both_pages()
    {
        let file = device(2);
        let page = page_size().unwrap();
        let mut session = open(file.path(), DeviceAccess::ReadWrite);

        let at = Address::new(page as u64 - 2);
        session.poke(at, AccessWidth::Long, 0x1122_3344).unwrap();
        assert_eq!(session.peek(at, AccessWidth::Long).unwrap(), 0x1122_3344);
        assert_eq!(session.mapper().map_calls(), 1);
        assert_eq!(session.mapper().window(), Some((Address::new(0), 2 * page)));

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[page - 2..page + 2], &0x1122_3344_u32.to_ne_bytes());

        let burst = session.sample_burst(at, AccessWidth::Long, 8).unwrap();
        assert!(burst.values.iter().all(|value| *value == 0x1122_3344));
        assert_eq!(session.mapper().map_calls(), 1);
    }

    #[test]
    fn test_read_past_device_end_faults()
    {
        // The window is mapped, but no page backs it
        let file = device(1);
        let mut session = open(file.path(), DeviceAccess::ReadOnly);

        let beyond = Address::new(4 * page_size().unwrap() as u64);
        let err = session.peek(beyond, AccessWidth::Long).unwrap_err();
        assert!(matches!(err, WatchError::Fault { address, .. } if address == beyond));

        // The session is still usable afterwards
        assert_eq!(session.peek(Address::new(0), AccessWidth::Long).unwrap(), 0);
    }

    #[test]
    fn test_peek_into_keeps_values_before_a_fault()
    {
        let file = device(1);
        let page = page_size().unwrap();
        let mut session = open(file.path(), DeviceAccess::ReadWrite);
        session.poke(Address::new(0), AccessWidth::Quad, 7).unwrap();

        // The second element lies past the end of the device
        let mut values = Vec::new();
        let err = session
            .peek_into(Address::new(0), AccessWidth::Quad, (4 * page / 8) as u64, 3, &mut values)
            .unwrap_err();
        assert!(matches!(err, WatchError::Fault { .. }));
        assert_eq!(values, vec![7]);
    }

    #[test]
    fn test_unmappable_device_falls_back_to_pread()
    {
        let mut session = open(std::path::Path::new("/proc/self/cmdline"), DeviceAccess::ReadOnly);
        let expected = std::fs::read("/proc/self/cmdline").unwrap()[0];

        assert_eq!(session.peek(Address::new(0), AccessWidth::Byte).unwrap(), u64::from(expected));
        assert!(session.mapper().is_unsupported());
    }

    #[test]
    fn test_calibration_is_cached()
    {
        let file = device(1);
        let mut session = open(file.path(), DeviceAccess::ReadOnly);

        assert_eq!(session.resolution(), None);
        let first = session.calibrate().unwrap();
        assert_eq!(session.calibrate().unwrap(), first);
        assert_eq!(session.resolution(), Some(first));
        assert!(session.gap_threshold().unwrap() >= 1_000_000);
    }
}
