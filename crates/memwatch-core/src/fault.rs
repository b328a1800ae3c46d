//! # Fault Containment
//!
//! Turns SIGSEGV/SIGBUS raised by a raw dereference into an error value.
//!
//! Reading a physical address that nothing decodes (or a register block whose
//! clock is gated) makes the CPU raise a synchronous fault. Without help the
//! process dies. [`guarded`] runs an access with a recovery point armed:
//!
//! 1. [`install_handlers`] registers one `SA_SIGINFO` handler for SIGSEGV and
//!    SIGBUS, once per process.
//! 2. [`guarded`] saves a recovery point (stack pointer + landing address, see
//!    [`crate::arch`]), marks the access in flight and runs the operation.
//! 3. If the operation faults while marked, the handler records the signal,
//!    clears the mark and rewrites the signal context so that `sigreturn`
//!    lands on the recovery point. [`guarded`] then returns [`Fault`].
//! 4. A fault with no access in flight is not ours: the handler restores the
//!    default disposition and returns, the instruction faults again and the
//!    process terminates exactly as it would have without the handler.
//!
//! The in-flight state is per thread: a fault is always delivered to the
//! thread that caused it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memwatch_core::fault::{guarded, install_handlers};
//!
//! install_handlers()?;
//! let ptr = 0x10 as *const u32;
//! let outcome = guarded(|| unsafe { std::ptr::read_volatile(ptr) });
//! assert!(outcome.is_err());
//! # Ok::<(), memwatch_core::WatchError>(())
//! ```

use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{compiler_fence, Ordering};

use libc::{c_int, siginfo_t};
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::arch::{self, RecoveryPoint};
use crate::error::{WatchError, WatchResult};
use crate::types::Address;

/// Which hardware fault interrupted a guarded access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind
{
    /// SIGSEGV: no valid mapping or insufficient permission
    Segmentation,
    /// SIGBUS: the bus rejected the access (unbacked physical address, bad alignment)
    Bus,
}

impl FaultKind
{
    /// The signal behind this fault.
    pub const fn signal(self) -> Signal
    {
        match self {
            FaultKind::Segmentation => Signal::SIGSEGV,
            FaultKind::Bus => Signal::SIGBUS,
        }
    }

    fn from_raw(signal: c_int) -> Self
    {
        if signal == libc::SIGBUS {
            FaultKind::Bus
        } else {
            FaultKind::Segmentation
        }
    }
}

impl fmt::Display for FaultKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            FaultKind::Segmentation => f.write_str("Segmentation fault"),
            FaultKind::Bus => f.write_str("Bus error"),
        }
    }
}

/// A contained fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault
{
    /// Signal that was caught
    pub kind: FaultKind,
    /// Process-virtual address reported by the kernel (`si_addr`)
    pub fault_address: usize,
}

impl Fault
{
    /// Attach the physical address being accessed, producing the run's error.
    pub fn at(self, address: Address) -> WatchError
    {
        debug!(
            kind = %self.kind,
            fault_address = format_args!("{:#x}", self.fault_address),
            "contained fault at {address}"
        );
        WatchError::Fault {
            kind: self.kind,
            address,
        }
    }
}

struct GuardState
{
    in_flight: Cell<bool>,
    point: RecoveryPoint,
    signal: Cell<c_int>,
    fault_address: Cell<usize>,
}

impl GuardState
{
    const fn new() -> Self
    {
        Self {
            in_flight: Cell::new(false),
            point: RecoveryPoint::new(),
            signal: Cell::new(0),
            fault_address: Cell::new(0),
        }
    }
}

thread_local! {
    // Const-initialized and drop-free, so the handler can touch it without
    // triggering lazy initialization.
    static GUARD: GuardState = const { GuardState::new() };
}

static HANDLERS: Lazy<Result<(), Errno>> = Lazy::new(|| {
    let action = SigAction::new(SigHandler::SigAction(on_fault), SaFlags::SA_SIGINFO, SigSet::empty());
    for signal in [Signal::SIGSEGV, Signal::SIGBUS] {
        // SAFETY: `on_fault` only touches the const-initialized thread-local
        // and async-signal-safe libc calls.
        unsafe { sigaction(signal, &action) }?;
    }
    debug!("installed SIGSEGV/SIGBUS fault handlers");
    Ok(())
});

/// Install the SIGSEGV/SIGBUS handlers.
///
/// Idempotent: only the first call touches signal dispositions; later calls
/// return the first call's outcome.
///
/// ## Errors
///
/// - `SignalSetup`: `sigaction()` failed
pub fn install_handlers() -> WatchResult<()>
{
    (*HANDLERS).map_err(WatchError::SignalSetup)
}

/// Run `operation` with fault containment.
///
/// Returns the operation's value, or [`Fault`] if it raised SIGSEGV/SIGBUS.
/// At most one fault is captured per call, and the in-flight mark is cleared
/// on both paths, so a fault never leaks into the next call.
///
/// Handlers must have been installed with [`install_handlers`]; without them
/// a fault terminates the process as usual.
///
/// If a fault is contained, the frames of `operation` are abandoned: anything
/// it owned by value is leaked rather than dropped. Pass references.
///
/// Calls must not nest.
pub fn guarded<T, F>(operation: F) -> Result<T, Fault>
where
    F: FnOnce() -> T,
{
    let mut operation = Some(operation);
    let mut output: Option<T> = None;
    let mut body = || {
        if let Some(operation) = operation.take() {
            GUARD.with(|state| state.in_flight.set(true));
            compiler_fence(Ordering::SeqCst);
            output = Some(operation());
            compiler_fence(Ordering::SeqCst);
            GUARD.with(|state| state.in_flight.set(false));
        }
    };

    let point = GUARD.with(|state| {
        debug_assert!(!state.in_flight.get(), "guarded() calls must not nest");
        state.point.as_raw()
    });

    // SAFETY: `point` lives in this thread's GUARD for the whole call, and
    // `call_body::<_>` is called with a pointer to `body` of the matching type.
    let faulted = unsafe { arch::guarded_trampoline(point, call_body::<_>(&body), (&raw mut body).cast()) };

    compiler_fence(Ordering::SeqCst);
    let (signal, fault_address) = GUARD.with(|state| {
        state.in_flight.set(false);
        (state.signal.replace(0), state.fault_address.replace(0))
    });

    match output {
        Some(value) if faulted == 0 => Ok(value),
        _ => Err(Fault {
            kind: FaultKind::from_raw(signal),
            fault_address,
        }),
    }
}

/// Pick the monomorphised C-ABI shim that runs a closure of type `B`.
fn call_body<B: FnMut()>(_body: &B) -> arch::GuardedBody
{
    unsafe extern "C" fn shim<B: FnMut()>(data: *mut c_void)
    {
        let body = &mut *data.cast::<B>();
        body();
    }
    shim::<B>
}

extern "C" fn on_fault(signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    let recovered = GUARD
        .try_with(|state| {
            if !state.in_flight.replace(false) {
                return false;
            }
            state.signal.set(signal);
            // SAFETY: SA_SIGINFO handlers receive a valid siginfo_t and ucontext_t.
            unsafe {
                state.fault_address.set((*info).si_addr() as usize);
                arch::redirect(context, &state.point);
            }
            true
        })
        .unwrap_or(false);

    if !recovered {
        // Not a guarded access: let the re-executed instruction take the default action.
        // SAFETY: signal() is async-signal-safe.
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }
}
