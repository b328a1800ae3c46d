//! aarch64 fault recovery trampoline
//!
//! AAPCS64: x19-x29, the link register and the low halves of v8-v15 are
//! callee-saved. All of them go into a 160 byte frame that the landing path
//! restores.

use std::arch::naked_asm;
use std::ffi::c_void;

use super::{GuardedBody, RecoveryPoint};

/// Save a recovery point and run `body(data)`.
///
/// Returns 0 if `body` returned, 1 if a signal handler redirected execution
/// to the recovery point.
///
/// # Safety
///
/// `point` must stay valid until the call returns, and `body` must be safe to
/// call with `data`. Frames of `body` are abandoned on recovery, so `body`
/// must not own anything that needs dropping.
#[unsafe(naked)]
pub unsafe extern "C" fn guarded_trampoline(_point: *mut RecoveryPoint, _body: GuardedBody, _data: *mut c_void) -> u32
{
    naked_asm!(
        "sub sp, sp, #160",
        "stp x19, x20, [sp, #0]",
        "stp x21, x22, [sp, #16]",
        "stp x23, x24, [sp, #32]",
        "stp x25, x26, [sp, #48]",
        "stp x27, x28, [sp, #64]",
        "stp x29, x30, [sp, #80]",
        "stp d8, d9, [sp, #96]",
        "stp d10, d11, [sp, #112]",
        "stp d12, d13, [sp, #128]",
        "stp d14, d15, [sp, #144]",
        // point.sp = sp, point.ip = landing address
        "mov x9, sp",
        "str x9, [x0]",
        "adr x9, 2f",
        "str x9, [x0, #8]",
        "mov x0, x2",
        "blr x1",
        "mov w0, #0",
        "b 3f",
        "2:",
        "mov w0, #1",
        "3:",
        "ldp d14, d15, [sp, #144]",
        "ldp d12, d13, [sp, #128]",
        "ldp d10, d11, [sp, #112]",
        "ldp d8, d9, [sp, #96]",
        "ldp x29, x30, [sp, #80]",
        "ldp x27, x28, [sp, #64]",
        "ldp x25, x26, [sp, #48]",
        "ldp x23, x24, [sp, #32]",
        "ldp x21, x22, [sp, #16]",
        "ldp x19, x20, [sp, #0]",
        "add sp, sp, #160",
        "ret",
    );
}

/// Point the interrupted context at the recovery landing address.
///
/// # Safety
///
/// `context` must be the `ucontext_t` passed to an `SA_SIGINFO` handler.
pub unsafe fn redirect(context: *mut c_void, point: &RecoveryPoint)
{
    let context = &mut *context.cast::<libc::ucontext_t>();
    context.uc_mcontext.sp = point.sp.get() as u64;
    context.uc_mcontext.pc = point.ip.get() as u64;
}
