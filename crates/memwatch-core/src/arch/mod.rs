//! Architecture-specific fault recovery
//!
//! Each architecture provides two pieces:
//!
//! - `guarded_trampoline`: a naked function that saves the callee-saved
//!   registers, records its stack pointer and a landing address in a
//!   [`RecoveryPoint`], then calls the guarded body. It returns `0` when the
//!   body returns normally and `1` when execution arrives at the landing
//!   address instead.
//! - `redirect`: rewrites the stack pointer and program counter of a signal
//!   context so that returning from the handler resumes at the landing
//!   address, with the trampoline's frame as the current stack frame.
//!
//! The faulting instruction is never resumed; the frames of the guarded body
//! are abandoned without running destructors.

use std::cell::Cell;

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_arch = "x86_64"))] {
        mod x86_64;
        pub use self::x86_64::{guarded_trampoline, redirect};
    } else if #[cfg(all(target_os = "linux", target_arch = "aarch64"))] {
        mod aarch64;
        pub use self::aarch64::{guarded_trampoline, redirect};
    } else {
        compile_error!("memwatch-core supports Linux on x86_64 and aarch64 only");
    }
}

/// Where to resume after a contained fault.
///
/// Written by `guarded_trampoline` (offset 0: stack pointer, offset 8:
/// landing address) and read by the signal handler.
#[repr(C)]
pub struct RecoveryPoint
{
    pub sp: Cell<usize>,
    pub ip: Cell<usize>,
}

impl RecoveryPoint
{
    pub const fn new() -> Self
    {
        Self {
            sp: Cell::new(0),
            ip: Cell::new(0),
        }
    }

    /// Pointer handed to the trampoline. `Cell<usize>` has the layout of `usize`.
    pub fn as_raw(&self) -> *mut RecoveryPoint
    {
        std::ptr::from_ref(self).cast_mut()
    }
}

/// Body signature accepted by `guarded_trampoline`.
pub type GuardedBody = unsafe extern "C" fn(*mut std::ffi::c_void);
