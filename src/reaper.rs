use std::io::Write;

use tracing::{debug, warn};

use crate::job_control::ProcessControl;
use crate::jobs::JobStatus;
use crate::shell::Shell;
use crate::signals::ChildNotifier;
use crate::status::StateChange;

/// If a child changed state since the last call, collect every pending
/// change and bring the job table up to date, printing one line per job
/// transition. Changes for processes no job owns are skipped.
pub fn drain<P: ProcessControl>(
    shell: &mut Shell<P>,
    notifier: &ChildNotifier,
    stdout: &mut dyn Write,
) {
    if !notifier.take() {
        return;
    }

    loop {
        let (pid, change) = match shell.control.poll_child() {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "polling children failed");
                break;
            }
        };

        let control = &shell.control;
        let Some(id) = shell
            .jobs
            .find_by_member(pid, |pid| control.group_of(pid))
            .map(|job| job.id)
        else {
            debug!(pid, ?change, "state change for untracked process");
            continue;
        };
        let Some(job) = shell.jobs.get_mut(id) else {
            continue;
        };

        match change {
            StateChange::Terminated(code) => {
                debug!(pid, code, job = id, "job member exited");
                if job.member_exited(pid) {
                    job.status = JobStatus::Done;
                    let _ = writeln!(stdout, "{}", job.status_line(&job.status.to_string()));
                    let pgid = job.pgid;
                    shell.jobs.remove_by_group(pgid);
                }
            }
            StateChange::Stopped => {
                if job.status != JobStatus::Stopped {
                    job.status = JobStatus::Stopped;
                    let _ = writeln!(stdout, "{}", job.status_line("Stopped"));
                }
            }
            StateChange::Continued => {
                if job.status != JobStatus::Running {
                    job.status = JobStatus::Running;
                    let _ = writeln!(stdout, "{}", job.status_line("Continued"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControl;

    fn drain_to_string(shell: &mut Shell<FakeControl>, notifier: &ChildNotifier) -> String {
        let mut out = Vec::new();
        drain(shell, notifier, &mut out);
        String::from_utf8(out).unwrap()
    }

    fn notified() -> ChildNotifier {
        let notifier = ChildNotifier::new();
        notifier.notify();
        notifier
    }

    #[test]
    fn nothing_happens_without_a_notification() {
        let mut shell = Shell::new(FakeControl::new());
        shell.jobs.register(10, "sleep 1", vec![10], JobStatus::Running);
        shell.control.child_events.push_back((10, StateChange::Terminated(0)));

        let out = drain_to_string(&mut shell, &ChildNotifier::new());

        assert!(out.is_empty());
        assert_eq!(shell.jobs.list().len(), 1);
        assert_eq!(shell.control.child_events.len(), 1);
    }

    #[test]
    fn single_process_job_is_done_and_removed() {
        let mut shell = Shell::new(FakeControl::new());
        shell.jobs.register(10, "sleep 1", vec![10], JobStatus::Running);
        shell.control.child_events.push_back((10, StateChange::Terminated(0)));

        let notifier = notified();
        let out = drain_to_string(&mut shell, &notifier);

        assert_eq!(out, "[1] 10 Done    sleep 1\n");
        assert!(shell.jobs.is_empty());
        assert!(!notifier.take());
    }

    #[test]
    fn job_is_removed_only_when_every_member_exited() {
        let mut shell = Shell::new(FakeControl::new());
        shell.jobs.register(20, "yes | head", vec![20, 21], JobStatus::Running);
        shell.control.child_events.push_back((21, StateChange::Terminated(0)));

        let out = drain_to_string(&mut shell, &notified());
        assert!(out.is_empty());
        assert_eq!(shell.jobs.find_by_group(20).unwrap().members(), &[20]);

        shell.control.child_events.push_back((20, StateChange::Terminated(141)));
        let out = drain_to_string(&mut shell, &notified());
        assert_eq!(out, "[1] 20 Done    yes | head\n");
        assert!(shell.jobs.is_empty());
    }

    #[test]
    fn stop_and_continue_update_status_once_per_job() {
        let mut shell = Shell::new(FakeControl::new());
        shell.jobs.register(30, "a | b", vec![30, 31], JobStatus::Running);
        shell.control.child_events.extend([
            (30, StateChange::Stopped),
            (31, StateChange::Stopped),
        ]);

        let out = drain_to_string(&mut shell, &notified());
        assert_eq!(out, "[1] 30 Stopped    a | b\n");
        assert_eq!(shell.jobs.find_by_id(1).unwrap().status, JobStatus::Stopped);

        shell.control.child_events.extend([
            (30, StateChange::Continued),
            (31, StateChange::Continued),
        ]);
        let out = drain_to_string(&mut shell, &notified());
        assert_eq!(out, "[1] 30 Continued    a | b\n");
        assert_eq!(shell.jobs.find_by_id(1).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn untracked_processes_are_skipped() {
        let mut shell = Shell::new(FakeControl::new());
        shell.jobs.register(40, "sleep 9", vec![40], JobStatus::Running);
        shell.control.child_events.extend([
            (99, StateChange::Terminated(0)),
            (98, StateChange::Stopped),
        ]);

        let out = drain_to_string(&mut shell, &notified());

        assert!(out.is_empty());
        assert_eq!(shell.jobs.list().len(), 1);
        assert!(shell.control.child_events.is_empty());
    }

    #[test]
    fn member_resolved_through_os_group() {
        let mut shell = Shell::new(FakeControl::new());
        shell.jobs.register(50, "sh -c 'sleep 1'", vec![50], JobStatus::Running);
        shell.control.groups.insert(77, 50);
        shell.control.child_events.push_back((77, StateChange::Stopped));

        let out = drain_to_string(&mut shell, &notified());

        assert_eq!(out, "[1] 50 Stopped    sh -c 'sleep 1'\n");
    }
}
