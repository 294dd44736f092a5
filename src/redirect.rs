use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::ShellError;

/// A redirection operator recognised inside a stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    /// `<` — read stdin from a file
    Input,
    /// `>` — write stdout to a file, truncating it
    Truncate,
    /// `>>` — write stdout to a file, appending
    Append,
}

/// Where a stage's stdout goes when it is redirected to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub path: String,
    pub append: bool,
}

/// Recognise a redirection operator token.
pub fn operator(token: &str) -> Option<Operator> {
    match token {
        "<" => Some(Operator::Input),
        ">" => Some(Operator::Truncate),
        ">>" => Some(Operator::Append),
        _ => None,
    }
}

/// Open an input redirection target for reading.
pub fn open_input(path: &str) -> Result<File, ShellError> {
    File::open(path).map_err(|source| ShellError::Redirect {
        path: path.to_string(),
        source,
    })
}

/// Open an output redirection target, creating it (mode 0644) if absent.
pub fn open_output(target: &OutputTarget) -> Result<File, ShellError> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    if target.append {
        options.append(true);
    } else {
        options.truncate(true);
    }

    options
        .open(Path::new(&target.path))
        .map_err(|source| ShellError::Redirect {
            path: target.path.clone(),
            source,
        })
}
