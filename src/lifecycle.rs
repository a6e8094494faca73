//! Process lifecycle hooks.
//!
//! Rust has no interpreter shutdown phase, so exit-time work is collected in
//! an [`ExitHooks`] registry and run either explicitly or when the
//! [`ExitGuard`] returned by [`install_exit_guard`] is dropped at the end of
//! `main`. Fork detection compares the pid recorded when a resource was
//! created with the current one, read through [`PidSource`] so tests can
//! simulate a fork.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Identifier returned by [`ExitHooks::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Hook = Box<dyn FnOnce() + Send>;

/// Registry of callbacks run once at process exit.
#[derive(Default)]
pub struct ExitHooks {
    next_id: AtomicU64,
    hooks: Mutex<Vec<(HookId, Hook)>>,
    ran: AtomicBool,
}

static GLOBAL_HOOKS: Lazy<Arc<ExitHooks>> = Lazy::new(|| Arc::new(ExitHooks::new()));

impl ExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`install_exit_guard`].
    pub fn global() -> Arc<ExitHooks> {
        Arc::clone(&GLOBAL_HOOKS)
    }

    /// Register `hook`, returning an id usable with [`deregister`](Self::deregister).
    pub fn register<F>(&self, hook: F) -> HookId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.lock().push((id, Box::new(hook)));
        id
    }

    /// Remove a hook. Returns `false` if it already ran or was removed.
    pub fn deregister(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        match hooks.iter().position(|(hook_id, _)| *hook_id == id) {
            Some(pos) => {
                drop(hooks.remove(pos));
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }

    /// Whether [`run_all`](Self::run_all) has been called.
    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    /// Run every registered hook, newest first.
    ///
    /// Each hook runs at most once. Panics are caught and reported so a
    /// failing hook cannot abort shutdown or skip the remaining hooks. The
    /// registry lock is not held while a hook runs, so hooks may deregister
    /// other hooks.
    pub fn run_all(&self) {
        self.ran.store(true, Ordering::Release);
        loop {
            let Some((_, hook)) = self.hooks.lock().pop() else {
                break;
            };
            if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
                log::warn!("exit hook panicked during shutdown");
            }
        }
    }
}

impl fmt::Debug for ExitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitHooks")
            .field("registered", &self.len())
            .field("ran", &self.has_run())
            .finish()
    }
}

/// Runs the global exit hooks when dropped.
#[must_use = "exit hooks run when the guard is dropped"]
#[derive(Debug)]
pub struct ExitGuard {
    hooks: Arc<ExitHooks>,
}

impl ExitGuard {
    /// Guard over a specific registry.
    pub fn new(hooks: Arc<ExitHooks>) -> Self {
        Self { hooks }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.hooks.run_all();
    }
}

/// Bind the global exit hooks to the lifetime of the returned guard.
///
/// Keep the guard alive in `main`; dropping it flushes buffered log data.
pub fn install_exit_guard() -> ExitGuard {
    ExitGuard::new(ExitHooks::global())
}

/// Source of the current process id.
pub trait PidSource: Send + Sync + fmt::Debug {
    fn current_pid(&self) -> u32;
}

/// Reads the pid from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsPid;

impl PidSource for OsPid {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }
}

/// Pid source whose value is set by hand, for exercising fork handling.
#[derive(Debug)]
pub struct ManualPid(AtomicU32);

impl ManualPid {
    pub fn new(pid: u32) -> Self {
        Self(AtomicU32::new(pid))
    }

    /// Pretend the process forked into `pid`.
    pub fn set(&self, pid: u32) {
        self.0.store(pid, Ordering::SeqCst);
    }
}

impl PidSource for ManualPid {
    fn current_pid(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl<T: PidSource + ?Sized> PidSource for Arc<T> {
    fn current_pid(&self) -> u32 {
        (**self).current_pid()
    }
}
