//! # Memory Device
//!
//! The single file descriptor every access funnels through.
//!
//! Normally that is `/dev/mem`: the mapper `mmap()`s windows of it and
//! accesses become plain loads and stores. When the device does not support
//! mapping, positioned `pread()`/`pwrite()` at `offset = physical address`
//! move the bytes instead.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::DeviceAccess;
use crate::error::{WatchError, WatchResult};
use crate::types::{AccessWidth, Address};

/// An open memory device.
#[derive(Debug)]
pub struct MemDevice
{
    file: File,
    path: PathBuf,
    access: DeviceAccess,
}

impl MemDevice
{
    /// Open `path` read-only or read-write.
    ///
    /// ## Errors
    ///
    /// - `DeviceOpen`: the OS refused to open the device
    pub fn open(path: &Path, access: DeviceAccess) -> WatchResult<Self>
    {
        let file = OpenOptions::new()
            .read(true)
            .write(access == DeviceAccess::ReadWrite)
            .open(path)
            .map_err(|source| WatchError::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), ?access, "opened memory device");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            access,
        })
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Access mode the device was opened with.
    pub fn access(&self) -> DeviceAccess
    {
        self.access
    }

    /// Read one value with `pread()`.
    ///
    /// This is the access path used when the device can't be mapped. The
    /// kernel moves exactly `width` bytes, in native byte order.
    ///
    /// ## Errors
    ///
    /// - `Io`: `pread()` failed
    /// - `ShortTransfer`: fewer than `width` bytes came back
    pub fn read_at(&self, address: Address, width: AccessWidth) -> WatchResult<u64>
    {
        let mut bytes = [0u8; 8];
        let len = width.bytes();
        let actual = self.file.read_at(&mut bytes[..len], address.value())?;
        if actual != len {
            return Err(WatchError::ShortTransfer {
                op: "pread",
                address,
                expected: len,
                actual,
            });
        }
        Ok(from_ne_bytes(width, &bytes))
    }

    /// Write one value with `pwrite()`.
    ///
    /// ## Errors
    ///
    /// - `Io`: `pwrite()` failed
    /// - `ShortTransfer`: fewer than `width` bytes were written
    pub fn write_at(&self, address: Address, width: AccessWidth, value: u64) -> WatchResult<()>
    {
        let bytes = to_ne_bytes(width, value);
        let len = width.bytes();
        let actual = self.file.write_at(&bytes[..len], address.value())?;
        if actual != len {
            return Err(WatchError::ShortTransfer {
                op: "pwrite",
                address,
                expected: len,
                actual,
            });
        }
        Ok(())
    }
}

impl AsFd for MemDevice
{
    fn as_fd(&self) -> BorrowedFd<'_>
    {
        self.file.as_fd()
    }
}

fn from_ne_bytes(width: AccessWidth, bytes: &[u8; 8]) -> u64
{
    match width {
        AccessWidth::Byte => u64::from(bytes[0]),
        AccessWidth::Word => u64::from(u16::from_ne_bytes([bytes[0], bytes[1]])),
        AccessWidth::Long => u64::from(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        AccessWidth::Quad => u64::from_ne_bytes(*bytes),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_ne_bytes(width: AccessWidth, value: u64) -> [u8; 8]
{
    let mut bytes = [0u8; 8];
    match width {
        AccessWidth::Byte => bytes[0] = value as u8,
        AccessWidth::Word => bytes[..2].copy_from_slice(&(value as u16).to_ne_bytes()),
        AccessWidth::Long => bytes[..4].copy_from_slice(&(value as u32).to_ne_bytes()),
        AccessWidth::Quad => bytes = value.to_ne_bytes(),
    }
    bytes
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use super::*;

    #[test]
    fn test_open_missing_device()
    {
        let err = MemDevice::open(Path::new("/nonexistent/mem"), DeviceAccess::ReadOnly).unwrap_err();
        assert!(matches!(err, WatchError::DeviceOpen { .. }));
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("/nonexistent/mem"));
    }

    #[test]
    fn test_positioned_round_trip()
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let device = MemDevice::open(file.path(), DeviceAccess::ReadWrite).unwrap();

        for (index, width) in AccessWidth::ALL.into_iter().enumerate() {
            let address = Address::new(8 * index as u64);
            let value = width.truncate(0x8877_6655_4433_2211);
            device.write_at(address, width, value).unwrap();
            assert_eq!(device.read_at(address, width).unwrap(), value);
        }
    }

    #[test]
    fn test_read_past_end_is_short()
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2]).unwrap();
        let device = MemDevice::open(file.path(), DeviceAccess::ReadOnly).unwrap();

        let err = device.read_at(Address::new(0), AccessWidth::Long).unwrap_err();
        assert!(matches!(err, WatchError::ShortTransfer { actual: 2, .. }));
    }
}
