use std::io;

use thiserror::Error;

/// Failures the engine reports to the user. None of them end the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// An inter-stage pipe could not be created.
    #[error("pipe: {0}")]
    Pipe(#[source] io::Error),

    /// A process could not be created for a reason unrelated to its program.
    #[error("fork: {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A stage's program does not exist.
    #[error("{program}: command not found")]
    CommandNotFound { program: String },

    /// A stage's program exists but could not be executed.
    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A redirection target could not be opened.
    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },

    /// `fg`/`bg` could not resolve its job reference.
    #[error("{command}: no such job")]
    NoSuchJob { command: &'static str },

    /// A signal could not be delivered to a process group.
    #[error("kill({pgid}): {source}")]
    Signal {
        pgid: i32,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_target() {
        let err = ShellError::Redirect {
            path: "missing.txt".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("missing.txt: "));

        let err = ShellError::NoSuchJob { command: "fg" };
        assert_eq!(err.to_string(), "fg: no such job");
    }
}
