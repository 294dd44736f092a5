//! Signal dispositions for the shell and its children, and the child-state
//! notification flag.
//!
//! The SIGCHLD handler only stores into an atomic flag. All reaping, job
//! table updates and printing happen later on the main loop.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Keyboard job-control signals the shell ignores for itself.
const SHELL_IGNORED: &[libc::c_int] = &[
    libc::SIGTSTP,
    libc::SIGTTOU,
    libc::SIGTTIN,
    libc::SIGQUIT,
];

/// Signals every spawned stage gets back at their default action.
const CHILD_DEFAULTS: &[libc::c_int] = &[
    libc::SIGINT,
    libc::SIGTSTP,
    libc::SIGQUIT,
    libc::SIGTTOU,
    libc::SIGTTIN,
];

/// Make the shell immune to Ctrl-Z, Ctrl-\ and background tty access.
pub fn ignore_job_control_signals() -> io::Result<()> {
    for &signal in SHELL_IGNORED {
        if unsafe { libc::signal(signal, libc::SIG_IGN) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Restore default dispositions. Runs in the child between fork and exec,
/// so it only makes async-signal-safe calls.
pub fn restore_child_defaults() -> io::Result<()> {
    for &signal in CHILD_DEFAULTS {
        if unsafe { libc::signal(signal, libc::SIG_DFL) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Set when any child changes state; drained by the main loop.
#[derive(Debug, Clone, Default)]
pub struct ChildNotifier {
    pending: Arc<AtomicBool>,
}

impl ChildNotifier {
    /// A flag nothing sets except [`ChildNotifier::notify`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the flag as the SIGCHLD handler.
    pub fn install() -> io::Result<Self> {
        let notifier = Self::new();
        signal_hook::flag::register(signal_hook::consts::SIGCHLD, Arc::clone(&notifier.pending))?;
        Ok(notifier)
    }

    #[cfg(test)]
    pub fn notify(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}
