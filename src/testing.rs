//! A scripted [`ProcessControl`] for unit tests: no processes, no terminal.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Write};

use crate::error::ShellError;
use crate::job_control::{GroupEvent, Launched, Pid, ProcessControl};
use crate::pipeline::Stage;
use crate::status::StateChange;

#[derive(Default)]
pub struct FakeControl {
    /// Stages of every launch, in order.
    pub launches: Vec<Vec<Stage>>,
    pending_launches: VecDeque<Launched>,
    pub launch_error: bool,
    /// Answers for `wait_group`; `NoChildren` once exhausted.
    pub group_events: VecDeque<GroupEvent>,
    pub wait_error: bool,
    pub waits: usize,
    /// Answers for `poll_child`; `None` once exhausted.
    pub child_events: VecDeque<(Pid, StateChange)>,
    /// `Some(pgid)` for each handoff, `None` for each reclaim.
    pub terminal_log: Vec<Option<Pid>>,
    /// Groups that accept signals.
    pub live_groups: HashSet<Pid>,
    pub signals: Vec<(Pid, libc::c_int)>,
    /// pid -> pgid answers for `group_of`.
    pub groups: HashMap<Pid, Pid>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `launch` to produce this group.
    pub fn next_launch(&mut self, pgid: Pid, members: &[Pid]) {
        self.live_groups.insert(pgid);
        self.pending_launches.push_back(Launched {
            pgid,
            members: members.to_vec(),
        });
    }
}

impl ProcessControl for FakeControl {
    fn launch(
        &mut self,
        stages: &[Stage],
        _stderr: &mut dyn Write,
    ) -> Result<Option<Launched>, ShellError> {
        self.launches.push(stages.to_vec());
        if self.launch_error {
            return Err(ShellError::Pipe(io::Error::other("fake pipe failure")));
        }
        Ok(self.pending_launches.pop_front())
    }

    fn give_terminal(&mut self, pgid: Pid) {
        self.terminal_log.push(Some(pgid));
    }

    fn reclaim_terminal(&mut self) {
        self.terminal_log.push(None);
    }

    fn wait_group(&mut self, pgid: Pid) -> io::Result<GroupEvent> {
        self.waits += 1;
        if self.wait_error {
            return Err(io::Error::other("fake wait failure"));
        }
        let event = self.group_events.pop_front().unwrap_or(GroupEvent::NoChildren);
        if event == GroupEvent::NoChildren {
            self.live_groups.remove(&pgid);
        }
        Ok(event)
    }

    fn poll_child(&mut self) -> io::Result<Option<(Pid, StateChange)>> {
        Ok(self.child_events.pop_front())
    }

    fn signal_group(&mut self, pgid: Pid, signal: libc::c_int) -> io::Result<()> {
        if !self.live_groups.contains(&pgid) {
            return Err(io::Error::from_raw_os_error(libc::ESRCH));
        }
        if signal != 0 {
            self.signals.push((pgid, signal));
        }
        Ok(())
    }

    fn group_of(&self, pid: Pid) -> Option<Pid> {
        self.groups.get(&pid).copied()
    }
}
