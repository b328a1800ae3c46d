//! x86_64 fault recovery trampoline
//!
//! System V AMD64: rbx, rbp, r12-r15 are callee-saved. The trampoline keeps
//! them on its own frame so the landing path can restore them no matter
//! what the abandoned body had clobbered.

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
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        // Re-align to 16 bytes for the call below
        "sub rsp, 8",
        // point.sp = rsp, point.ip = landing address
        "mov [rdi], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 8], rax",
        "mov rdi, rdx",
        "call rsi",
        "xor eax, eax",
        "jmp 3f",
        "2:",
        "mov eax, 1",
        "3:",
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
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
    let gregs = &mut context.uc_mcontext.gregs;
    gregs[libc::REG_RSP as usize] = point.sp.get() as libc::greg_t;
    gregs[libc::REG_RIP as usize] = point.ip.get() as libc::greg_t;
}
