/// A command line with its trailing background marker removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// The trimmed line text without `&`; used as the job label.
    pub text: String,
    /// `true` if the line ended in `&`.
    pub background: bool,
}

/// Trim a raw input line and strip a trailing `&`, with or without a space
/// before it. Returns `None` when nothing is left to run.
pub fn split_background(input: &str) -> Option<Line> {
    let trimmed = input.trim();
    let (text, background) = match trimmed.strip_suffix('&') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };

    if text.is_empty() {
        return None;
    }

    Some(Line {
        text: text.to_string(),
        background,
    })
}

/// Split a line into words on whitespace. No quoting or expansion.
pub fn tokenize(input: &str) -> Vec<String> {
    input.split_whitespace().map(String::from).collect()
}
