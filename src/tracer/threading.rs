//! Thread identity and worker-thread plumbing
//!
//! The engine attributes every event to a compact sequential thread id
//! (allocated on a thread's first touch) rather than the OS tid, so the ids
//! are stable, small, and usable as map keys across the whole session.

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_THREAD_ID: AtomicI64 = AtomicI64::new(0);

thread_local! {
    static THREAD_ID: i64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    static THREAD_NAMED: Cell<bool> = const { Cell::new(false) };
    static SIGNALS_BLOCKED: Cell<bool> = const { Cell::new(false) };
    static CHILD_SAMPLING: Cell<i32> = const { Cell::new(0) };
}

/// Sequential id of the calling thread; the process's first thread gets 0
pub fn thread_id() -> i64 {
    THREAD_ID.with(|id| *id)
}

/// Name the calling runtime worker thread so it is identifiable in the
/// timeline. Applied once per thread; later calls are no-ops.
pub fn set_worker_thread_name(name: &str) {
    THREAD_NAMED.with(|named| {
        if named.replace(true) {
            return;
        }
        apply_thread_name(name);
    });
}

#[cfg(target_os = "linux")]
fn apply_thread_name(name: &str) {
    // PR_SET_NAME truncates to 15 bytes + NUL on its own.
    if let Ok(c_name) = std::ffi::CString::new(name) {
        unsafe {
            libc::prctl(libc::PR_SET_NAME, c_name.as_ptr() as libc::c_ulong, 0, 0, 0);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_thread_name(_name: &str) {}

/// Block profiling-signal delivery on the calling thread
///
/// The activity callback runs inside the runtime's worker; an interrupting
/// sampler there can land in the middle of a critical section. Applied once
/// per thread.
pub fn block_profiling_signals() {
    SIGNALS_BLOCKED.with(|blocked| {
        if blocked.replace(true) {
            return;
        }
        apply_signal_block();
    });
}

#[cfg(unix)]
fn apply_signal_block() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGPROF);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        libc::sigaddset(&mut set, libc::SIGALRM);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
fn apply_signal_block() {}

/// Scope-bound release of a per-thread reentrancy flag
///
/// Callbacks that can indirectly re-enter themselves set a thread-local flag
/// for their duration; the guard clears it on every exit path, panics
/// included.
pub struct FlagGuard {
    flag: &'static std::thread::LocalKey<Cell<bool>>,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.flag.with(|f| f.set(false));
    }
}

/// Set `flag` for the current scope, or return `None` if it is already set
pub fn try_enter(flag: &'static std::thread::LocalKey<Cell<bool>>) -> Option<FlagGuard> {
    flag.with(|f| {
        if f.get() {
            None
        } else {
            f.set(true);
            Some(FlagGuard { flag })
        }
    })
}

/// Suppress sampling propagation to threads spawned while suppressed
///
/// The sampler is an external collaborator; it consults
/// [`child_sampling_enabled`] when it sees a new thread. Push/pop pairs nest.
pub fn push_child_sampling_suppressed() {
    CHILD_SAMPLING.with(|depth| depth.set(depth.get() + 1));
}

pub fn pop_child_sampling_suppressed() {
    CHILD_SAMPLING.with(|depth| depth.set((depth.get() - 1).max(0)));
}

/// Whether threads spawned by the calling thread should inherit sampling
pub fn child_sampling_enabled() -> bool {
    CHILD_SAMPLING.with(|depth| depth.get() == 0)
}
