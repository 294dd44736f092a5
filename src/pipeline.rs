use crate::redirect::{self, Operator, OutputTarget};

/// One command in a pipeline, with its own redirections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub input: Option<String>,
    pub output: Option<OutputTarget>,
}

impl Stage {
    fn is_empty(&self) -> bool {
        self.argv.is_empty() && self.input.is_none() && self.output.is_none()
    }

    /// The program name, or `""` for a stage with no words.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// Split tokens into pipeline stages on `|`, pulling out `<`, `>` and `>>`.
///
/// A redirection operator with no following token is dropped. A trailing
/// stage with nothing in it (from a dangling `|`) is dropped too, so an
/// empty result means there is nothing to run.
pub fn build_stages(tokens: &[String]) -> Vec<Stage> {
    let mut stages = Vec::new();
    let mut current = Stage::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];

        if token == "|" {
            stages.push(std::mem::take(&mut current));
        } else if let Some(op) = redirect::operator(token) {
            if let Some(path) = tokens.get(i + 1) {
                i += 1;
                match op {
                    Operator::Input => current.input = Some(path.clone()),
                    Operator::Truncate | Operator::Append => {
                        current.output = Some(OutputTarget {
                            path: path.clone(),
                            append: op == Operator::Append,
                        });
                    }
                }
            }
        } else {
            current.argv.push(token.clone());
        }

        i += 1;
    }

    stages.push(current);
    while stages.last().is_some_and(Stage::is_empty) {
        stages.pop();
    }

    stages
}
