use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::error::ShellError;
use crate::executor::{self, Flow, WaitOutcome};
use crate::job_control::{ForegroundLease, Pid, ProcessControl};
use crate::jobs::{JobStatus, JobTable};
use crate::pipeline::Stage;
use crate::shell::Shell;

/// Run `cd`, `jobs` or `exit` inside the shell. `None` if `stage` is not one
/// of them.
pub fn run_inline<P: ProcessControl>(
    shell: &mut Shell<P>,
    stage: &Stage,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Option<Flow> {
    match stage.program() {
        "cd" => {
            builtin_cd(stage.argv.get(1).map(String::as_str), stderr);
            Some(Flow::Continue)
        }
        "jobs" => {
            builtin_jobs(&shell.jobs, stdout);
            Some(Flow::Continue)
        }
        "exit" => Some(Flow::Exit),
        _ => None,
    }
}

fn builtin_cd(dir: Option<&str>, stderr: &mut dyn Write) {
    let target = match dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/")),
    };

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {}: {e}", target.display());
    }
}

/// List all tracked jobs in registration order.
fn builtin_jobs(jobs: &JobTable, stdout: &mut dyn Write) {
    for job in jobs.list() {
        let _ = writeln!(stdout, "{}", job.status_line(&job.status.to_string()));
    }
}

// ── Job control builtins ──

/// Resolve `%N`, a bare job id, a bare process-group id or a bare member
/// process id to a job id. No argument means the most recent job.
fn resolve_job<P: ProcessControl>(
    jobs: &JobTable,
    control: &P,
    arg: Option<&str>,
) -> Option<usize> {
    let Some(arg) = arg else {
        return jobs.most_recent().map(|j| j.id);
    };

    if let Some(id) = arg.strip_prefix('%') {
        let id = id.parse::<usize>().ok()?;
        return jobs.find_by_id(id).map(|j| j.id);
    }

    let number = arg.parse::<u32>().ok()?;
    if let Some(job) = jobs.find_by_id(number as usize) {
        return Some(job.id);
    }

    let pid = Pid::try_from(number).ok().filter(|&pid| pid > 0)?;
    jobs.find_by_group(pid)
        .or_else(|| jobs.find_by_member(pid, |pid| control.group_of(pid)))
        .map(|j| j.id)
}

/// `fg`: give the job the terminal, continue it, and wait for it like any
/// foreground pipeline.
pub fn foreground<P: ProcessControl>(
    shell: &mut Shell<P>,
    arg: Option<&str>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) {
    let Some(id) = resolve_job(&shell.jobs, &shell.control, arg) else {
        let _ = writeln!(stderr, "{}", ShellError::NoSuchJob { command: "fg" });
        return;
    };
    let Some(job) = shell.jobs.get_mut(id) else {
        return;
    };

    let pgid = job.pgid;
    let members = job.members().to_vec();
    job.status = JobStatus::Running;

    let outcome = {
        let mut lease = ForegroundLease::new(&mut shell.control, pgid);
        if let Err(source) = lease.signal_group(pgid, libc::SIGCONT) {
            let _ = writeln!(stderr, "fg: {}", ShellError::Signal { pgid, source });
        }
        executor::wait_for_group(&mut *lease, pgid, members)
    };

    if let WaitOutcome::Stopped { members } = outcome {
        let id = shell.jobs.register(pgid, "", members, JobStatus::Stopped);
        if let Some(job) = shell.jobs.find_by_id(id) {
            let _ = writeln!(stdout, "{}", job.status_line("Stopped"));
        }
        return;
    }

    if !shell.control.group_exists(pgid) {
        debug!(pgid, "foreground job finished");
        shell.jobs.remove_by_group(pgid);
    }
}

/// `bg`: continue a job without waiting for it.
pub fn background<P: ProcessControl>(
    shell: &mut Shell<P>,
    arg: Option<&str>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) {
    let Some(id) = resolve_job(&shell.jobs, &shell.control, arg) else {
        let _ = writeln!(stderr, "{}", ShellError::NoSuchJob { command: "bg" });
        return;
    };
    let Some(pgid) = shell.jobs.find_by_id(id).map(|j| j.pgid) else {
        return;
    };

    if let Err(source) = shell.control.signal_group(pgid, libc::SIGCONT) {
        let _ = writeln!(stderr, "bg: {}", ShellError::Signal { pgid, source });
        return;
    }

    if let Some(job) = shell.jobs.get_mut(id) {
        job.status = JobStatus::Running;
        let _ = writeln!(stdout, "{}", job.notice("Continued in background"));
    }
}
