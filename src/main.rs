mod builtins;
mod error;
mod executor;
mod job_control;
mod jobs;
mod logging;
mod parser;
mod pipeline;
mod reaper;
mod redirect;
mod shell;
mod signals;
mod status;
#[cfg(test)]
mod testing;

use std::io::{self, Write};

use crossterm::tty::IsTty;
use tracing::{debug, warn};

use crate::executor::Flow;
use crate::job_control::{Terminal, UnixProcessControl};
use crate::shell::Shell;
use crate::signals::ChildNotifier;

const PROMPT: &str = "myshell> ";

fn main() {
    logging::init();

    if let Err(e) = signals::ignore_job_control_signals() {
        warn!(error = %e, "could not ignore job-control signals");
    }

    if let Err(e) = ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    }) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let notifier = match ChildNotifier::install() {
        Ok(notifier) => notifier,
        Err(e) => {
            warn!(error = %e, "could not install SIGCHLD handler; jobs will not be reaped");
            ChildNotifier::new()
        }
    };

    let stdin = io::stdin();
    let terminal = if stdin.is_tty() {
        Terminal::acquire().unwrap_or_else(|e| {
            warn!(error = %e, "could not take the terminal; job control is limited");
            Terminal::detached()
        })
    } else {
        Terminal::detached()
    };
    debug!(pgid = terminal.shell_pgid(), "shell ready");

    let mut shell = Shell::new(UnixProcessControl::new(terminal));
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    loop {
        reaper::drain(&mut shell, &notifier, &mut stdout);

        print!("{PROMPT}");
        if stdout.flush().is_err() {
            break;
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {
                if shell.run_line(&input, &mut stdout, &mut stderr) == Flow::Exit {
                    break;
                }
            }
            Err(error) => {
                eprintln!("myshell: error reading input: {error}");
                break;
            }
        }
    }

    std::process::exit(0);
}
