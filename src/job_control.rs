use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::error::ShellError;
use crate::pipeline::Stage;
use crate::status::{self, StateChange};

pub type Pid = libc::pid_t;

/// A freshly created pipeline: its process group and the processes in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Launched {
    pub pgid: Pid,
    pub members: Vec<Pid>,
}

/// Result of one blocking wait restricted to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    Exited(Pid),
    Stopped(Pid),
    /// The group has no children left to wait for.
    NoChildren,
}

/// Everything the engine needs from the OS. The Unix implementation talks to
/// the kernel; tests substitute a scripted fake.
pub trait ProcessControl {
    /// Create one process per stage in a single new process group.
    /// `Ok(None)` means no stage produced a running process.
    fn launch(
        &mut self,
        stages: &[Stage],
        stderr: &mut dyn Write,
    ) -> Result<Option<Launched>, ShellError>;

    /// Make `pgid` the terminal's foreground group.
    fn give_terminal(&mut self, pgid: Pid);

    /// Take the terminal back for the shell and re-save its attributes.
    fn reclaim_terminal(&mut self);

    /// Block until a member of `pgid` exits or stops.
    fn wait_group(&mut self, pgid: Pid) -> io::Result<GroupEvent>;

    /// Non-blocking: the next pending state change of any child, if any.
    fn poll_child(&mut self) -> io::Result<Option<(Pid, StateChange)>>;

    /// Send `signal` to every process in `pgid`.
    fn signal_group(&mut self, pgid: Pid, signal: libc::c_int) -> io::Result<()>;

    /// Whether any process is left in `pgid`.
    fn group_exists(&mut self, pgid: Pid) -> bool {
        self.signal_group(pgid, 0).is_ok()
    }

    /// Process group of a live process.
    fn group_of(&self, pid: Pid) -> Option<Pid>;
}

/// Hands the terminal to a job's group for as long as it lives and gives it
/// back to the shell on drop, whichever way the wait ends.
pub struct ForegroundLease<'a, P: ProcessControl + ?Sized> {
    control: &'a mut P,
}

impl<'a, P: ProcessControl + ?Sized> ForegroundLease<'a, P> {
    pub fn new(control: &'a mut P, pgid: Pid) -> Self {
        control.give_terminal(pgid);
        Self { control }
    }
}

impl<P: ProcessControl + ?Sized> Deref for ForegroundLease<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &*self.control
    }
}

impl<P: ProcessControl + ?Sized> DerefMut for ForegroundLease<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut *self.control
    }
}

impl<P: ProcessControl + ?Sized> Drop for ForegroundLease<'_, P> {
    fn drop(&mut self) {
        self.control.reclaim_terminal();
    }
}

/// The controlling terminal as the shell sees it.
pub struct Terminal {
    /// `None` when stdin is not a terminal; handoffs are then skipped.
    tty_fd: Option<libc::c_int>,
    shell_pgid: Pid,
    saved_modes: Option<libc::termios>,
}

impl Terminal {
    /// Non-interactive: there is no terminal to hand around.
    pub fn detached() -> Self {
        Self {
            tty_fd: None,
            shell_pgid: unsafe { libc::getpgrp() },
            saved_modes: None,
        }
    }

    /// Put the shell in its own process group, take the terminal, and save
    /// its attributes.
    pub fn acquire() -> io::Result<Self> {
        let fd = libc::STDIN_FILENO;
        let shell_pid = unsafe { libc::getpid() };

        if unsafe { libc::getpgrp() } != shell_pid {
            set_process_group(shell_pid, shell_pid)?;
        }
        set_terminal_foreground(fd, shell_pid)?;

        let mut terminal = Self {
            tty_fd: Some(fd),
            shell_pgid: shell_pid,
            saved_modes: None,
        };
        terminal.save_modes();
        Ok(terminal)
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    fn hand_to(&self, pgid: Pid) {
        if let Some(fd) = self.tty_fd {
            if let Err(e) = set_terminal_foreground(fd, pgid) {
                warn!(pgid, error = %e, "could not hand terminal to job");
            }
        }
    }

    fn reclaim(&mut self) {
        let Some(fd) = self.tty_fd else {
            return;
        };
        if let Err(e) = set_terminal_foreground(fd, self.shell_pgid) {
            warn!(error = %e, "could not take terminal back");
        }
        self.save_modes();
        debug!(saved = self.saved_modes.is_some(), "terminal back with shell");
    }

    fn save_modes(&mut self) {
        let Some(fd) = self.tty_fd else {
            return;
        };
        let mut modes = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(fd, &mut modes) } == 0 {
            self.saved_modes = Some(modes);
        } else {
            warn!(error = %io::Error::last_os_error(), "could not read terminal attributes");
        }
    }
}

/// [`ProcessControl`] backed by real processes.
pub struct UnixProcessControl {
    terminal: Terminal,
}

impl UnixProcessControl {
    pub fn new(terminal: Terminal) -> Self {
        Self { terminal }
    }
}

impl ProcessControl for UnixProcessControl {
    fn launch(
        &mut self,
        stages: &[Stage],
        stderr: &mut dyn Write,
    ) -> Result<Option<Launched>, ShellError> {
        crate::executor::spawn_pipeline(stages, stderr)
    }

    fn give_terminal(&mut self, pgid: Pid) {
        self.terminal.hand_to(pgid);
    }

    fn reclaim_terminal(&mut self) {
        self.terminal.reclaim();
    }

    fn wait_group(&mut self, pgid: Pid) -> io::Result<GroupEvent> {
        let mut raw_status: libc::c_int = 0;

        loop {
            let rc = unsafe { libc::waitpid(-pgid, &mut raw_status, libc::WUNTRACED) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::ECHILD) => return Ok(GroupEvent::NoChildren),
                    _ => return Err(err),
                }
            }

            match status::decode(raw_status) {
                Some(StateChange::Terminated(code)) => {
                    debug!(pid = rc, code, "foreground member exited");
                    return Ok(GroupEvent::Exited(rc));
                }
                Some(StateChange::Stopped) => return Ok(GroupEvent::Stopped(rc)),
                Some(StateChange::Continued) | None => continue,
            }
        }
    }

    fn poll_child(&mut self) -> io::Result<Option<(Pid, StateChange)>> {
        let mut raw_status: libc::c_int = 0;
        let flags = libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED;

        loop {
            let rc = unsafe { libc::waitpid(-1, &mut raw_status, flags) };
            if rc == 0 {
                return Ok(None);
            }
            if rc < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::ECHILD) => return Ok(None),
                    _ => return Err(err),
                }
            }

            if let Some(change) = status::decode(raw_status) {
                return Ok(Some((rc, change)));
            }
        }
    }

    fn signal_group(&mut self, pgid: Pid, signal: libc::c_int) -> io::Result<()> {
        signal_process_group(pgid, signal)
    }

    fn group_of(&self, pid: Pid) -> Option<Pid> {
        process_group_id(pid).ok()
    }
}

pub(crate) fn set_process_group(pid: Pid, pgid: Pid) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; the child set its own group before exec.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

pub(crate) fn process_group_id(pid: Pid) -> io::Result<Pid> {
    loop {
        let rc = unsafe { libc::getpgid(pid) };
        if rc >= 0 {
            return Ok(rc);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

pub(crate) fn signal_process_group(pgid: Pid, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

fn set_terminal_foreground(fd: libc::c_int, pgid: Pid) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    // A background group calling tcsetpgrp gets SIGTTOU unless it is ignored.
    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_group_is_rejected_before_kill() {
        let err = signal_process_group(0, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = signal_process_group(-5, libc::SIGCONT).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn own_group_is_resolvable_and_alive() {
        let pid = unsafe { libc::getpid() };
        let pgid = process_group_id(pid).unwrap();
        assert_eq!(pgid, unsafe { libc::getpgrp() });

        let mut control = UnixProcessControl::new(Terminal::detached());
        assert_eq!(control.group_of(pid), Some(pgid));
        assert!(control.group_exists(pgid));
    }

    #[test]
    fn detached_terminal_reports_shell_group() {
        let terminal = Terminal::detached();
        assert_eq!(terminal.shell_pgid(), unsafe { libc::getpgrp() });
        assert!(terminal.saved_modes.is_none());
    }
}
