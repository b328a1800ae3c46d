//! # Address Mapper
//!
//! Turns sparse physical addresses into dereferenceable pointers.
//!
//! The mapper keeps exactly one window of the device mapped at a time. A
//! request inside the current window costs nothing; anything else replaces
//! the window with a fresh `mmap()` of the page(s) covering the request.
//!
//! ## Remapping
//!
//! - Same physical base and the window is large enough: reuse it.
//! - Request fits the old window's size: map over the old virtual range with
//!   `MAP_FIXED` and release whatever tail the new window doesn't cover.
//! - Request is larger: unmap the old window and map a new one, using the old
//!   virtual base as a hint.
//!
//! ## Unsupported Mapping
//!
//! Some devices (procfs files, `/dev/kmem` on some kernels) reject `mmap()`
//! with `ENODEV`. The mapper remembers that and answers every later request
//! with [`Resolution::Unsupported`]; callers then use positioned I/O on the
//! device instead.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::os::fd::AsFd;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::unistd::{sysconf, SysconfVar};
use once_cell::sync::Lazy;
use tracing::{debug, trace, warn};

use crate::config::DeviceAccess;
use crate::error::{WatchError, WatchResult};
use crate::types::Address;

static SYSTEM_PAGE_SIZE: Lazy<Option<usize>> = Lazy::new(|| {
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .and_then(|size| usize::try_from(size).ok())
        .filter(|size| size.is_power_of_two())
});

/// The system page size.
///
/// ## Errors
///
/// - `PageSize`: `sysconf(_SC_PAGESIZE)` failed or returned a non power of two
pub fn page_size() -> WatchResult<usize>
{
    (*SYSTEM_PAGE_SIZE).ok_or(WatchError::PageSize)
}

/// Page-granular window covering `len` bytes at `address`.
///
/// Returns `(physical base, offset of address within the window, window size)`.
/// A range that crosses a page boundary yields a window of several pages.
pub fn page_span(address: Address, len: usize, page_size: usize) -> (Address, usize, usize)
{
    let mask = page_size - 1;
    let offset = address.page_offset(page_size);
    let span = ((offset + len.max(1) - 1) | mask) + 1;
    (address.page_base(page_size), offset, span)
}

/// One live window of the device.
#[derive(Debug)]
struct MappedRegion
{
    base: Address,
    addr: NonNull<c_void>,
    len: usize,
}

impl MappedRegion
{
    fn covers(&self, base: Address, span: usize) -> bool
    {
        self.base == base && self.len >= span
    }

    /// Hand the first `len` bytes over to a replacement mapping and unmap the rest.
    fn shrink_into(self, len: usize)
    {
        if self.len > len {
            // SAFETY: the tail lies inside this region and nothing points into it.
            let tail = unsafe { self.addr.byte_add(len) };
            if let Err(errno) = unsafe { munmap(tail, self.len - len) } {
                warn!(%errno, "failed to release tail of previous mapping");
            }
        }
        std::mem::forget(self);
    }
}

impl Drop for MappedRegion
{
    fn drop(&mut self)
    {
        // SAFETY: `addr`/`len` came from a successful mmap() and no Mapping outlives the region.
        if let Err(errno) = unsafe { munmap(self.addr, self.len) } {
            warn!(%errno, base = %self.base, "munmap failed");
        } else {
            trace!(base = %self.base, len = self.len, "unmapped window");
        }
    }
}

/// A dereferenceable location inside the current window.
///
/// Borrows the mapper, so it can't outlive the next `resolve()` call.
#[derive(Debug)]
pub struct Mapping<'a>
{
    ptr: NonNull<u8>,
    _region: PhantomData<&'a ()>,
}

impl Mapping<'_>
{
    /// Pointer to the requested address.
    pub fn as_ptr(&self) -> NonNull<u8>
    {
        self.ptr
    }
}

/// Outcome of [`AddressMapper::resolve`].
#[derive(Debug)]
pub enum Resolution<'a>
{
    /// The address is mapped
    Mapped(Mapping<'a>),
    /// The device can't be mapped; use `pread()`/`pwrite()`
    Unsupported,
}

/// Owner of the single mapped window of a device.
#[derive(Debug)]
pub struct AddressMapper
{
    page_size: usize,
    prot: ProtFlags,
    region: Option<MappedRegion>,
    unsupported: bool,
    map_calls: usize,
}

impl AddressMapper
{
    /// Create a mapper with no window yet.
    ///
    /// ## Errors
    ///
    /// - `PageSize`: the page size could not be determined
    pub fn new(access: DeviceAccess) -> WatchResult<Self>
    {
        let prot = match access {
            DeviceAccess::ReadOnly => ProtFlags::PROT_READ,
            DeviceAccess::ReadWrite => ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        };
        Ok(Self {
            page_size: page_size()?,
            prot,
            region: None,
            unsupported: false,
            map_calls: 0,
        })
    }

    /// Page size the windows are rounded to.
    pub fn page_size(&self) -> usize
    {
        self.page_size
    }

    /// Number of `mmap()` calls issued so far.
    pub fn map_calls(&self) -> usize
    {
        self.map_calls
    }

    /// Physical base and length of the current window.
    pub fn window(&self) -> Option<(Address, usize)>
    {
        self.region.as_ref().map(|region| (region.base, region.len))
    }

    /// Whether the device turned out not to support mapping.
    pub fn is_unsupported(&self) -> bool
    {
        self.unsupported
    }

    /// Make `len` bytes at `address` of `device` dereferenceable.
    ///
    /// ## Errors
    ///
    /// - `Map`: `mmap()` failed with anything but `ENODEV`; the window is dropped
    pub fn resolve<F: AsFd>(&mut self, device: F, address: Address, len: usize) -> WatchResult<Resolution<'_>>
    {
        if self.unsupported {
            return Ok(Resolution::Unsupported);
        }

        let (base, offset, span) = page_span(address, len, self.page_size);
        let reusable = self.region.as_ref().is_some_and(|region| region.covers(base, span));
        if !reusable && !self.map_window(device, address, base, span)? {
            return Ok(Resolution::Unsupported);
        }

        match &self.region {
            Some(region) => Ok(Resolution::Mapped(Mapping {
                // SAFETY: offset < span <= region.len
                ptr: unsafe { region.addr.cast::<u8>().add(offset) },
                _region: PhantomData,
            })),
            None => Ok(Resolution::Unsupported),
        }
    }

    /// Replace the current window. Returns `false` if the device can't be mapped.
    fn map_window<F: AsFd>(&mut self, device: F, address: Address, base: Address, span: usize) -> WatchResult<bool>
    {
        let map_error = |source| WatchError::Map { address, source };
        let offset = libc::off_t::try_from(base.value()).map_err(|_| map_error(Errno::EOVERFLOW))?;
        let length = NonZeroUsize::new(span).ok_or_else(|| map_error(Errno::EINVAL))?;

        let previous = self.region.take();
        let hint = previous.as_ref().and_then(|old| NonZeroUsize::new(old.addr.as_ptr() as usize));
        let (flags, recycled) = match previous {
            Some(old) if span <= old.len => (MapFlags::MAP_SHARED | MapFlags::MAP_FIXED, Some(old)),
            Some(old) => {
                drop(old);
                (MapFlags::MAP_SHARED, None)
            }
            None => (MapFlags::MAP_SHARED, None),
        };

        self.map_calls += 1;
        // SAFETY: with MAP_FIXED the target range is our own previous window,
        // and no Mapping into it is alive (resolve() borrows self mutably).
        match unsafe { mmap(hint, length, self.prot, flags, device, offset) } {
            Ok(addr) => {
                if let Some(old) = recycled {
                    old.shrink_into(span);
                }
                debug!(%base, len = span, "mapped window");
                self.region = Some(MappedRegion {
                    base,
                    addr,
                    len: span,
                });
                Ok(true)
            }
            Err(Errno::ENODEV) => {
                drop(recycled);
                debug!("device does not support mmap, using positioned I/O");
                self.unsupported = true;
                Ok(false)
            }
            Err(errno) => {
                drop(recycled);
                Err(map_error(errno))
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use super::*;

    fn device_file(pages: usize) -> (tempfile::NamedTempFile, usize)
    {
        let page = page_size().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let bytes: Vec<u8> = (0..pages * page).map(|i| (i / page) as u8 + 1).collect();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        (file, page)
    }

    fn read_byte(mapper: &mut AddressMapper, file: &std::fs::File, address: Address, len: usize) -> u8
    {
        match mapper.resolve(file, address, len).unwrap() {
            Resolution::Mapped(mapping) => unsafe { mapping.as_ptr().read_volatile() },
            Resolution::Unsupported => panic!("temp file should be mappable"),
        }
    }

    #[test]
    fn test_page_span()
    {
        let (base, offset, span) = page_span(Address::new(0x1234), 4, 0x1000);
        assert_eq!((base, offset, span), (Address::new(0x1000), 0x234, 0x1000));

        // Crosses into the next page
        let (base, offset, span) = page_span(Address::new(0x1ffe), 4, 0x1000);
        assert_eq!((base, offset, span), (Address::new(0x1000), 0xffe, 0x2000));
    }

    #[test]
    fn test_resolve_reuses_window()
    {
        let (file, page) = device_file(2);
        let mut mapper = AddressMapper::new(DeviceAccess::ReadOnly).unwrap();

        assert_eq!(read_byte(&mut mapper, file.as_file(), Address::new(8), 4), 1);
        assert_eq!(read_byte(&mut mapper, file.as_file(), Address::new(16), 8), 1);
        assert_eq!(mapper.map_calls(), 1);

        let second = Address::new(page as u64 + 4);
        assert_eq!(read_byte(&mut mapper, file.as_file(), second, 4), 2);
        assert_eq!(read_byte(&mut mapper, file.as_file(), second, 4), 2);
        assert_eq!(mapper.map_calls(), 2);
    }

    #[test]
    fn test_page_crossing_request_maps_two_pages()
    {
        let (file, page) = device_file(2);
        let mut mapper = AddressMapper::new(DeviceAccess::ReadOnly).unwrap();

        let address = Address::new(page as u64 - 2);
        match mapper.resolve(file.as_file(), address, 4).unwrap() {
            Resolution::Mapped(mapping) => unsafe {
                assert_eq!(mapping.as_ptr().read_volatile(), 1);
                assert_eq!(mapping.as_ptr().add(3).read_volatile(), 2);
            },
            Resolution::Unsupported => panic!("temp file should be mappable"),
        }

        // The two-page window also covers a plain request on the first page
        assert_eq!(read_byte(&mut mapper, file.as_file(), Address::new(0), 1), 1);
        assert_eq!(mapper.map_calls(), 1);

        // A one-page request elsewhere shrinks back into the old range
        assert_eq!(read_byte(&mut mapper, file.as_file(), Address::new(page as u64), 1), 2);
        assert_eq!(mapper.map_calls(), 2);
    }

    #[test]
    fn test_procfs_reports_unsupported()
    {
        let file = std::fs::File::open("/proc/self/cmdline").unwrap();
        let mut mapper = AddressMapper::new(DeviceAccess::ReadOnly).unwrap();

        assert!(matches!(
            mapper.resolve(&file, Address::new(0), 1).unwrap(),
            Resolution::Unsupported
        ));
        assert!(mapper.is_unsupported());

        // Remembered: no further mmap attempts
        assert!(matches!(
            mapper.resolve(&file, Address::new(0), 1).unwrap(),
            Resolution::Unsupported
        ));
        assert_eq!(mapper.map_calls(), 1);
    }
}
