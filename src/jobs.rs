use std::fmt;

use crate::job_control::Pid;

/// The lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        })
    }
}

/// One pipeline invocation's process group, as the shell tracks it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    /// The command line as typed, without the trailing `&`.
    pub label: String,
    pub status: JobStatus,
    /// Members of the group not yet reaped.
    members: Vec<Pid>,
}

impl Job {
    /// Whether `pid` is (or was, for the leader) a member of this job.
    pub fn has_member(&self, pid: Pid) -> bool {
        self.pgid == pid || self.members.contains(&pid)
    }

    /// Forget a reaped member. Returns `true` once no members remain.
    pub fn member_exited(&mut self, pid: Pid) -> bool {
        self.members.retain(|&m| m != pid);
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    /// `[id] pgid Word`
    pub fn notice(&self, word: &str) -> String {
        format!("[{}] {} {}", self.id, self.pgid, word)
    }

    /// `[id] pgid Word    label`
    pub fn status_line(&self, word: &str) -> String {
        format!("[{}] {} {}    {}", self.id, self.pgid, word, self.label)
    }
}

/// The shell's job table: background and stopped pipelines, in
/// registration order.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    /// Track a process group and return its job id. Ids are never reused.
    ///
    /// A group already in the table keeps its entry and id; only its
    /// status and members are refreshed.
    pub fn register(
        &mut self,
        pgid: Pid,
        label: &str,
        members: Vec<Pid>,
        status: JobStatus,
    ) -> usize {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.pgid == pgid) {
            job.status = status;
            job.members = members;
            return job.id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pgid,
            label: label.to_string(),
            status,
            members,
        });
        id
    }

    pub fn find_by_id(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn find_by_group(&self, pgid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|j| j.pgid == pgid)
    }

    /// Resolve a process id to its job: first through the recorded members,
    /// then by asking `group_of` for the process group.
    pub fn find_by_member(
        &self,
        pid: Pid,
        group_of: impl FnOnce(Pid) -> Option<Pid>,
    ) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|j| j.has_member(pid))
            .or_else(|| group_of(pid).and_then(|pgid| self.find_by_group(pgid)))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Remove every entry for `pgid`. Returns how many were removed.
    pub fn remove_by_group(&mut self, pgid: Pid) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.pgid != pgid);
        before - self.jobs.len()
    }

    /// All jobs in registration order.
    pub fn list(&self) -> &[Job] {
        &self.jobs
    }

    /// The most recently registered job, the `fg`/`bg` default.
    pub fn most_recent(&self) -> Option<&Job> {
        self.jobs.last()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
