//! # RAII Guards
//!
//! Scoped changes to process state that must be undone on every exit path.
//!
//! ## Guards
//!
//! - **PriorityGuard**: raises the scheduling priority for a sampling run and
//!   restores the previous nice value on drop
//!
//! ## Example
//!
//! ```rust,no_run
//! use memwatch_core::guards::PriorityGuard;
//!
//! {
//!     let _guard = PriorityGuard::elevate(-20)?;
//!     // Sampling runs here with nice -20
//!     // Guard restores the old nice value when dropped
//! }
//! # Ok::<(), memwatch_core::WatchError>(())
//! ```

use nix::errno::Errno;
use tracing::{debug, warn};

use crate::error::{WatchError, WatchResult};

/// RAII guard that changes the process nice value and restores it on drop.
///
/// Restoring a lower priority than the one we raised to is always permitted,
/// so the restore only fails in exotic cases; it is best effort and a failure
/// is logged rather than reported.
#[derive(Debug)]
pub struct PriorityGuard
{
    previous: i32,
    active: bool,
}

impl PriorityGuard
{
    /// Save the current nice value and switch to `nice`.
    ///
    /// ## Errors
    ///
    /// - `Priority { action: "get" }`: `getpriority()` failed
    /// - `Priority { action: "set" }`: `setpriority()` failed (negative values need `CAP_SYS_NICE`)
    pub fn elevate(nice: i32) -> WatchResult<Self>
    {
        let previous = current_priority()?;
        set_priority(nice).map_err(|source| WatchError::Priority { action: "set", source })?;
        debug!(previous, nice, "raised scheduling priority");

        Ok(Self { previous, active: true })
    }

    /// Elevate if `nice` is set, otherwise leave the priority alone.
    ///
    /// ## Errors
    ///
    /// Same as [`PriorityGuard::elevate`].
    pub fn maybe_elevate(nice: Option<i32>) -> WatchResult<Option<Self>>
    {
        nice.map(Self::elevate).transpose()
    }

    /// Nice value that will be restored.
    pub fn previous(&self) -> i32
    {
        self.previous
    }

    /// Restore the saved nice value now, reporting failure.
    ///
    /// After this, dropping the guard is a no-op.
    pub fn restore(mut self) -> WatchResult<()>
    {
        self.active = false;
        set_priority(self.previous).map_err(|source| WatchError::Priority { action: "set", source })
    }
}

impl Drop for PriorityGuard
{
    fn drop(&mut self)
    {
        if self.active {
            // Best effort restore
            match set_priority(self.previous) {
                Ok(()) => debug!(nice = self.previous, "restored scheduling priority"),
                Err(errno) => warn!(%errno, nice = self.previous, "failed to restore scheduling priority"),
            }
        }
    }
}

/// Nice value of the calling process.
///
/// `getpriority()` can legitimately return -1, so failure is detected through
/// `errno` alone.
///
/// ## Errors
///
/// - `Priority { action: "get" }`: `getpriority()` failed
pub fn current_priority() -> WatchResult<i32>
{
    Errno::clear();
    // SAFETY: plain syscall wrapper, no pointers involved.
    let nice = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
    match Errno::last() {
        Errno::UnknownErrno => Ok(nice),
        source => Err(WatchError::Priority { action: "get", source }),
    }
}

fn set_priority(nice: i32) -> Result<(), Errno>
{
    // SAFETY: plain syscall wrapper, no pointers involved.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    Errno::result(result).map(drop)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_none_leaves_priority_alone()
    {
        let before = current_priority().unwrap();
        let guard = PriorityGuard::maybe_elevate(None).unwrap();
        assert!(guard.is_none());
        assert_eq!(current_priority().unwrap(), before);
    }

    #[test]
    fn test_setting_current_value_round_trips()
    {
        // Re-applying the current value never needs privileges
        let before = current_priority().unwrap();
        {
            let guard = PriorityGuard::elevate(before).unwrap();
            assert_eq!(guard.previous(), before);
            assert_eq!(current_priority().unwrap(), before);
        }
        assert_eq!(current_priority().unwrap(), before);
    }

    #[test]
    fn test_explicit_restore()
    {
        let before = current_priority().unwrap();
        let guard = PriorityGuard::elevate(before).unwrap();
        guard.restore().unwrap();
        assert_eq!(current_priority().unwrap(), before);
    }
}
