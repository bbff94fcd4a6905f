//! SIGSEGV bridge for get-on-fault paging.
//!
//! The runtime installs a single process-wide handler. A fault inside a
//! registered allocation is resolved by fetching the page; anything else
//! falls through to the default action so genuine crashes still crash.
//!
//! The hook runs on the faulting thread with the usual signal-context
//! caveats; the runtime keeps its fault path free of allocation-heavy
//! work where it can, but this is a soft DSM, not a hardened one.

use std::sync::OnceLock;

/// Returns true if the fault at the given address was resolved and the
/// faulting instruction can be restarted.
pub type FaultHook = Box<dyn Fn(usize) -> bool + Send + Sync>;

static HOOK: OnceLock<FaultHook> = OnceLock::new();

/// Install the process-wide fault hook. Only the first call takes
/// effect; later calls return false and leave the existing hook alone.
pub fn install(hook: FaultHook) -> bool {
    if HOOK.set(hook).is_err() {
        return false;
    }
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGSEGV, &action, std::ptr::null_mut());
    }
    true
}

extern "C" fn handler(
    sig: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    let addr = unsafe { (*info).si_addr() as usize };
    if let Some(hook) = HOOK.get() {
        if hook(addr) {
            return;
        }
    }
    // Not ours: restore the default handler and re-raise so the process
    // dies with the ordinary segfault diagnostics.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        libc::sigaction(sig, &action, std::ptr::null_mut());
        libc::raise(sig);
    }
}
