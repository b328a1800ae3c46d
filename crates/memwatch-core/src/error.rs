//! # Error Types
//!
//! General error handling for memory access and sampling.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::fault::FaultKind;
use crate::types::Address;

/// Main error type for memory access operations
///
/// This enum represents all the ways a watch, peek or poke run can fail.
/// Each variant belongs to one failure class, and every class maps to its own
/// process exit code (see [`WatchError::exit_code`]).
///
/// ## Error Categories
///
/// 1. **Configuration errors**: InvalidArgument
/// 2. **Setup errors**: SignalSetup, DeviceOpen, PageSize, Priority, Clock, ClockResolution
/// 3. **Access faults**: Fault
/// 4. **Resource errors**: Allocation
/// 5. **Mapping and I/O errors**: Map, ShortTransfer, Io
#[derive(Error, Debug)]
pub enum WatchError
{
    /// Malformed address, width, mask, duration or value
    ///
    /// Detected before any device access.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Installing the SIGSEGV/SIGBUS handlers failed
    #[error("Signal setup failed: {0}")]
    SignalSetup(#[source] Errno),

    /// The memory device could not be opened
    ///
    /// On Linux this usually means:
    /// - Not running as root (`/dev/mem` is mode 0640, owner root)
    /// - `/dev/kmem` does not exist (removed from most kernels)
    /// - The kernel is built with `CONFIG_STRICT_DEVMEM` and the range is off limits
    #[error("Can't open {}: {source}", path.display())]
    DeviceOpen
    {
        /// Device path that failed to open
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// `sysconf(_SC_PAGESIZE)` failed or returned nonsense
    #[error("Can't get page size")]
    PageSize,

    /// Reading or changing the scheduling priority failed
    ///
    /// Raising priority (negative nice values) requires `CAP_SYS_NICE`.
    #[error("Can't {action} priority: {source}")]
    Priority
    {
        /// `"get"` or `"set"`
        action: &'static str,
        /// Underlying OS error
        #[source]
        source: Errno,
    },

    /// The clock could not be read
    #[error("Can't read clock: {0}")]
    Clock(#[source] Errno),

    /// Calibration never observed the clock advance
    #[error("Can't measure timing: no clock advance across {probes} reads")]
    ClockResolution
    {
        /// Number of consecutive clock reads taken
        probes: usize,
    },

    /// The sample buffer could not be allocated
    #[error("Can't allocate buffer for {samples} samples")]
    Allocation
    {
        /// Requested number of samples
        samples: usize,
    },

    /// A guarded dereference raised SIGSEGV or SIGBUS
    ///
    /// The fault is contained: the process keeps running, but no partial
    /// results of the run are kept.
    #[error("{kind} at {address}")]
    Fault
    {
        /// Which signal was caught
        kind: FaultKind,
        /// Physical address being accessed
        address: Address,
    },

    /// `mmap()` of the device failed for a reason other than "unsupported"
    #[error("Can't map {address}: {source}")]
    Map
    {
        /// Physical address requested
        address: Address,
        /// Underlying OS error
        #[source]
        source: Errno,
    },

    /// A positioned read/write moved fewer bytes than the access width
    #[error("{op} result {actual} != {expected} at {address}")]
    ShortTransfer
    {
        /// `"pread"` or `"pwrite"`
        op: &'static str,
        /// Physical address accessed
        address: Address,
        /// Bytes requested
        expected: usize,
        /// Bytes transferred
        actual: usize,
    },

    /// I/O error on the device descriptor or the output stream
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl WatchError
{
    /// Process exit code for this error's failure class.
    ///
    /// | Class          | Code |
    /// |----------------|------|
    /// | bad argument   | 2    |
    /// | signal setup   | 3    |
    /// | device open    | 4    |
    /// | priority       | 5    |
    /// | clock          | 6    |
    /// | allocation     | 7    |
    /// | access fault   | 8    |
    /// | mapping / I/O  | 9    |
    #[must_use]
    pub fn exit_code(&self) -> u8
    {
        match self {
            WatchError::InvalidArgument(_) => 2,
            WatchError::SignalSetup(_) => 3,
            WatchError::DeviceOpen { .. } | WatchError::PageSize => 4,
            WatchError::Priority { .. } => 5,
            WatchError::Clock(_) | WatchError::ClockResolution { .. } => 6,
            WatchError::Allocation { .. } => 7,
            WatchError::Fault { .. } => 8,
            WatchError::Map { .. } | WatchError::ShortTransfer { .. } | WatchError::Io(_) => 9,
        }
    }
}

/// Convenience type alias for `Result<T, WatchError>`
///
/// ```rust
/// use memwatch_core::error::WatchResult;
/// fn foo() -> WatchResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type WatchResult<T> = std::result::Result<T, WatchError>;
