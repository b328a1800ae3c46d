//! # memwatch Utilities
//!
//! Shared helpers for the memwatch workspace.
//!
//! Currently this is the logging setup: `tracing` events from the core crate
//! and the CLI go to stderr (pretty or JSON) and optionally to a file, leaving
//! stdout to sampling results.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_with_format, init_logging_with_level, LogFormat, LogGuard, LogLevel, LoggingError,
};
pub use tracing::{debug, error, info, trace, warn};
