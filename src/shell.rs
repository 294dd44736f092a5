use std::io::Write;

use crate::builtins;
use crate::executor::{self, Flow};
use crate::job_control::ProcessControl;
use crate::jobs::JobTable;
use crate::parser;
use crate::pipeline;

/// Shell-wide state: the job table and the OS backend (which owns the
/// terminal). Only the main loop touches it.
pub struct Shell<P: ProcessControl> {
    pub jobs: JobTable,
    pub control: P,
}

impl<P: ProcessControl> Shell<P> {
    pub fn new(control: P) -> Self {
        Self {
            jobs: JobTable::new(),
            control,
        }
    }

    /// Run one raw input line.
    pub fn run_line(
        &mut self,
        input: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Flow {
        let Some(line) = parser::split_background(input) else {
            return Flow::Continue;
        };

        let tokens = parser::tokenize(&line.text);
        match tokens.first().map(String::as_str) {
            None => return Flow::Continue,
            Some("fg") => {
                builtins::foreground(self, tokens.get(1).map(String::as_str), stdout, stderr);
                return Flow::Continue;
            }
            Some("bg") => {
                builtins::background(self, tokens.get(1).map(String::as_str), stdout, stderr);
                return Flow::Continue;
            }
            Some(_) => {}
        }

        let stages = pipeline::build_stages(&tokens);
        executor::execute(self, &stages, line.background, &line.text, stdout, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::testing::FakeControl;

    fn run(shell: &mut Shell<FakeControl>, line: &str) -> (Flow, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let flow = shell.run_line(line, &mut out, &mut err);
        (
            flow,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn blank_and_lone_marker_lines_do_nothing() {
        let mut shell = Shell::new(FakeControl::new());
        for line in ["", "   ", "&", " & "] {
            assert_eq!(run(&mut shell, line).0, Flow::Continue);
        }
        assert!(shell.control.launches.is_empty());
    }

    #[test]
    fn trailing_ampersand_launches_background_job_with_clean_label() {
        let mut shell = Shell::new(FakeControl::new());
        shell.control.next_launch(321, &[321]);

        let (_, out, _) = run(&mut shell, "sleep 5&");

        assert_eq!(out, "[1] 321 Started\n");
        assert_eq!(shell.jobs.list()[0].label, "sleep 5");
        assert_eq!(shell.control.launches[0][0].argv, vec!["sleep", "5"]);
    }

    #[test]
    fn sleep_then_jobs_lists_one_running_entry() {
        let mut shell = Shell::new(FakeControl::new());
        shell.control.next_launch(321, &[321]);

        run(&mut shell, "sleep 5 &");
        let (_, out, _) = run(&mut shell, "jobs");

        assert_eq!(out, "[1] 321 Running    sleep 5\n");
        assert_eq!(shell.jobs.list()[0].status, JobStatus::Running);
    }

    #[test]
    fn fg_and_bg_are_resolved_before_building_stages() {
        let mut shell = Shell::new(FakeControl::new());
        let (_, _, err) = run(&mut shell, "fg");
        assert_eq!(err, "fg: no such job\n");
        let (_, _, err) = run(&mut shell, "bg %3");
        assert_eq!(err, "bg: no such job\n");
        assert!(shell.control.launches.is_empty());
    }

    #[test]
    fn exit_ends_the_loop() {
        let mut shell = Shell::new(FakeControl::new());
        assert_eq!(run(&mut shell, "exit").0, Flow::Exit);
    }
}
