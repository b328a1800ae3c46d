//! Common module for library exports

pub use crate::clock::Clock;
pub use crate::config::{DeviceAccess, WatchConfig};
pub use crate::error::{WatchError, WatchResult};
pub use crate::fault::{Fault, FaultKind};
pub use crate::report::ChangeReporter;
pub use crate::session::Session;
pub use crate::types::{AccessWidth, Address, BurstSamples, TimeNs, TimedSample};
