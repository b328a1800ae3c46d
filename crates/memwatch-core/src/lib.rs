//! # memwatch-core
//!
//! Fault-contained physical memory access and calibrated sampling.
//!
//! This crate provides the engine behind the `memwatch` tool:
//! - Mapping sparse physical addresses of `/dev/mem` into the process
//! - Turning SIGSEGV/SIGBUS on a bad address into an error value
//! - Calibrating the host clock's resolution
//! - Timestamped and burst sampling of a single address
//! - Reporting value changes and timing gaps as text
//!
//! ## Platform Support
//!
//! - **Linux x86_64 / aarch64**: full support
//! - Everything else fails to build (see `build.rs`): fault recovery rewrites
//!   the machine context of the signal frame, which is architecture specific
//!
//! ## Why unsafe code is needed
//!
//! Reading a device register means dereferencing a pointer into an `mmap()`ed
//! window of `/dev/mem`, and recovering from a fault on that dereference means
//! editing the interrupted register state from a signal handler. Both are
//! inherently unsafe. The unsafe parts are confined to `access`, `arch`,
//! `fault`, `mapper` and the sampling loops, behind safe [`Session`] methods.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use memwatch_core::config::{DeviceAccess, WatchConfig};
//! use memwatch_core::report::ChangeReporter;
//! use memwatch_core::types::{AccessWidth, Address};
//! use memwatch_core::Session;
//!
//! let mut session = Session::open(WatchConfig::default(), DeviceAccess::ReadOnly)?;
//! let address = Address::new(0xfe00_3004);
//! let samples = session.sample_timed(address, AccessWidth::Long, Duration::from_secs(1))?;
//!
//! let reporter = ChangeReporter::new(AccessWidth::Long, 0xffff_ffff, session.gap_threshold()?);
//! reporter.write_timed(&mut std::io::stdout(), &samples)?;
//! # Ok::<(), memwatch_core::WatchError>(())
//! ```

#![allow(unsafe_code)] // Required for raw device access and signal-context recovery

pub mod access;
mod arch;
pub mod clock;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod fault;
pub mod guards;
pub mod mapper;
pub mod prelude;
pub mod report;
pub mod sampler;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use error::{WatchError, WatchResult};
pub use session::Session;
pub use types::{AccessWidth, Address};
