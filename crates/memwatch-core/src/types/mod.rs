//! # Types
//!
//! Plain data types shared by the mapper, the samplers and the reporter.
//!
//! None of these types touch the device; they exist so that addresses,
//! widths and samples are not passed around as bare integers.
//!
//! ## Example
//!
//! ```rust
//! use memwatch_core::types::{AccessWidth, Address};
//!
//! let address: Address = "fe200000+34".parse()?;
//! let width: AccessWidth = "L".parse()?;
//! assert!(address.is_aligned(width.bytes()));
//! assert_eq!(width.hex_digits(), 8);
//! # Ok::<(), memwatch_core::WatchError>(())
//! ```

pub mod address;
pub mod sample;
pub mod width;

// Re-export all public types
pub use address::{parse_hex, Address};
pub use sample::{BurstSamples, Seconds, TimeNs, TimedSample, NANOS_PER_SEC};
pub use width::AccessWidth;
