use std::io::{self, Write};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use os_pipe::{PipeReader, PipeWriter};
use tracing::{debug, warn};

use crate::builtins;
use crate::error::ShellError;
use crate::job_control::{self, ForegroundLease, GroupEvent, Launched, Pid, ProcessControl};
use crate::jobs::JobStatus;
use crate::pipeline::Stage;
use crate::redirect;
use crate::shell::Shell;
use crate::signals;

/// Whether the main loop should keep reading lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// How a foreground wait on a process group ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Every member has been reaped.
    Finished,
    /// A member stopped; `members` are the ones not yet reaped.
    Stopped { members: Vec<Pid> },
    /// Waiting failed for a reason other than running out of children.
    Failed,
}

/// Run a pipeline, in the foreground or as a background job.
pub fn execute<P: ProcessControl>(
    shell: &mut Shell<P>,
    stages: &[Stage],
    background: bool,
    label: &str,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Flow {
    if stages.is_empty() {
        return Flow::Continue;
    }

    // A trailing `&` does not push a lone builtin out to the OS.
    if let [stage] = stages {
        if let Some(flow) = builtins::run_inline(shell, stage, stdout, stderr) {
            return flow;
        }
    }

    let launched = match shell.control.launch(stages, stderr) {
        Ok(Some(launched)) => launched,
        Ok(None) => return Flow::Continue,
        Err(e) => {
            let _ = writeln!(stderr, "myshell: {e}");
            return Flow::Continue;
        }
    };
    debug!(pgid = launched.pgid, members = ?launched.members, background, "pipeline launched");

    if background {
        let id = shell
            .jobs
            .register(launched.pgid, label, launched.members, JobStatus::Running);
        if let Some(job) = shell.jobs.find_by_id(id) {
            let _ = writeln!(stdout, "{}", job.notice("Started"));
        }
        return Flow::Continue;
    }

    let outcome = {
        let mut lease = ForegroundLease::new(&mut shell.control, launched.pgid);
        wait_for_group(&mut *lease, launched.pgid, launched.members)
    };

    if let WaitOutcome::Stopped { members } = outcome {
        let id = shell
            .jobs
            .register(launched.pgid, label, members, JobStatus::Stopped);
        if let Some(job) = shell.jobs.find_by_id(id) {
            let _ = writeln!(stdout, "{}", job.status_line("Stopped"));
        }
    }

    Flow::Continue
}

/// Wait on `pgid` until every member is gone or one of them stops.
///
/// Members still running when another one stops are left unreaped; the
/// drain pass or a later `fg` picks them up.
pub fn wait_for_group<P: ProcessControl + ?Sized>(
    control: &mut P,
    pgid: Pid,
    mut members: Vec<Pid>,
) -> WaitOutcome {
    loop {
        match control.wait_group(pgid) {
            Ok(GroupEvent::Exited(pid)) => members.retain(|&m| m != pid),
            Ok(GroupEvent::Stopped(pid)) => {
                debug!(pgid, pid, "foreground job stopped");
                return WaitOutcome::Stopped { members };
            }
            Ok(GroupEvent::NoChildren) => return WaitOutcome::Finished,
            Err(e) => {
                warn!(pgid, error = %e, "waiting on foreground job failed");
                return WaitOutcome::Failed;
            }
        }
    }
}

/// Why a single stage produced no process.
enum StageFailure {
    /// Only this stage is affected: bad redirection or program.
    Stage(ShellError),
    /// The OS could not create a process at all; abandon the pipeline.
    Pipeline(ShellError),
}

/// Create one pipe per adjacent stage pair and one process per stage, all in
/// a new process group led by the first process created.
pub fn spawn_pipeline(
    stages: &[Stage],
    stderr: &mut dyn Write,
) -> Result<Option<Launched>, ShellError> {
    let mut readers: Vec<Option<PipeReader>> = Vec::with_capacity(stages.len());
    let mut writers: Vec<Option<PipeWriter>> = Vec::with_capacity(stages.len());
    for _ in 1..stages.len() {
        let (reader, writer) = os_pipe::pipe().map_err(ShellError::Pipe)?;
        readers.push(Some(reader));
        writers.push(Some(writer));
    }

    let mut pgid: Option<Pid> = None;
    let mut members = Vec::with_capacity(stages.len());

    for (i, stage) in stages.iter().enumerate() {
        let pipe_in = if i > 0 { readers[i - 1].take() } else { None };
        let pipe_out = writers.get_mut(i).and_then(Option::take);

        match spawn_stage(stage, pipe_in, pipe_out, pgid) {
            Ok(Some(pid)) => {
                let group = *pgid.get_or_insert(pid);
                if let Err(e) = job_control::set_process_group(pid, group) {
                    warn!(pid, pgid = group, error = %e, "setpgid from parent failed");
                }
                debug!(pid, pgid = group, program = stage.program(), "stage spawned");
                members.push(pid);
            }
            Ok(None) => {}
            Err(StageFailure::Stage(e)) => {
                let _ = writeln!(stderr, "myshell: {e}");
            }
            Err(StageFailure::Pipeline(e)) => {
                if let Some(group) = pgid {
                    if let Err(kill_err) =
                        job_control::signal_process_group(group, libc::SIGTERM)
                    {
                        warn!(pgid = group, error = %kill_err, "partial pipeline cleanup failed");
                    }
                }
                return Err(e);
            }
        }
    }

    // Remaining pipe ends drop here, so the parent holds no descriptors.
    Ok(pgid.map(|pgid| Launched { pgid, members }))
}

/// Spawn one stage. `Ok(None)` for a stage with no words: its redirection
/// targets are still opened (and so created or truncated).
fn spawn_stage(
    stage: &Stage,
    pipe_in: Option<PipeReader>,
    pipe_out: Option<PipeWriter>,
    pgid: Option<Pid>,
) -> Result<Option<Pid>, StageFailure> {
    let input = stage
        .input
        .as_deref()
        .map(redirect::open_input)
        .transpose()
        .map_err(StageFailure::Stage)?;
    let output = stage
        .output
        .as_ref()
        .map(redirect::open_output)
        .transpose()
        .map_err(StageFailure::Stage)?;

    let Some(program) = stage.argv.first() else {
        return Ok(None);
    };

    let mut command = Command::new(program);
    command.args(&stage.argv[1..]).process_group(pgid.unwrap_or(0));

    // An explicit file wins over the pipe for the same stream.
    if let Some(file) = input {
        command.stdin(Stdio::from(file));
    } else if let Some(reader) = pipe_in {
        command.stdin(Stdio::from(reader));
    }
    if let Some(file) = output {
        command.stdout(Stdio::from(file));
    } else if let Some(writer) = pipe_out {
        command.stdout(Stdio::from(writer));
    }

    // SAFETY: restore_child_defaults only calls signal(2), which is
    // async-signal-safe.
    unsafe {
        command.pre_exec(signals::restore_child_defaults);
    }

    match command.spawn() {
        Ok(child) => Ok(Some(child.id() as Pid)),
        Err(e) => Err(classify_spawn_error(program, e)),
    }
}

fn classify_spawn_error(program: &str, source: io::Error) -> StageFailure {
    let program = program.to_string();
    if source.kind() == io::ErrorKind::NotFound {
        return StageFailure::Stage(ShellError::CommandNotFound { program });
    }

    match source.raw_os_error() {
        Some(
            libc::EACCES
            | libc::ENOEXEC
            | libc::ENOTDIR
            | libc::EISDIR
            | libc::ELOOP
            | libc::ENAMETOOLONG
            | libc::ETXTBSY
            | libc::E2BIG,
        ) => StageFailure::Stage(ShellError::Exec { program, source }),
        _ => StageFailure::Pipeline(ShellError::Spawn { program, source }),
    }
}
