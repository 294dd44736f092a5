/// What a `waitpid` status word says happened to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Exited normally or was killed by a signal. Carries the shell-style
    /// code: the exit status, or `128 + signal`.
    Terminated(i32),
    Stopped,
    Continued,
}

/// Decode a raw status word filled in by `waitpid`.
pub fn decode(raw_status: libc::c_int) -> Option<StateChange> {
    if libc::WIFEXITED(raw_status) {
        return Some(StateChange::Terminated(libc::WEXITSTATUS(raw_status)));
    }

    if libc::WIFSIGNALED(raw_status) {
        return Some(StateChange::Terminated(128 + libc::WTERMSIG(raw_status)));
    }

    if libc::WIFSTOPPED(raw_status) {
        return Some(StateChange::Stopped);
    }

    if libc::WIFCONTINUED(raw_status) {
        return Some(StateChange::Continued);
    }

    None
}
