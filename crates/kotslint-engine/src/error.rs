//! Engine error types

use miette::Diagnostic;
use thiserror::Error;

/// Main engine error type
///
/// Only [`EngineError::Render`] describes a problem with the author's
/// template. Every other variant means the engine itself failed.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Template environment error: {message}")]
    Environment { message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A template failure that can be reported against the author's file
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(kotslint::template::render))]
pub struct RenderError {
    /// Message shown to the author
    pub message: String,

    /// 1-based line within the rendered document
    pub line: Option<usize>,

    /// The offending line, trimmed and without quote characters, for
    /// locating it in the original file
    pub match_text: Option<String>,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            match_text: None,
        }
    }

    /// Attach the line and derive the match text from `source`
    pub fn at_line(mut self, source: &str, line: usize) -> Self {
        self.line = Some(line);
        self.match_text = source
            .lines()
            .nth(line.saturating_sub(1))
            .map(|l| l.trim().replace(['"', '\''], ""))
            .filter(|l| !l.is_empty());
        self
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_text_strips_quotes() {
        let source = "a: 1\n  key: '{{repl print \"x }}'\n";
        let err = RenderError::new("boom").at_line(source, 2);
        assert_eq!(err.line, Some(2));
        assert_eq!(err.match_text.as_deref(), Some("key: {{repl print x }}"));
    }

    #[test]
    fn test_match_text_out_of_range() {
        let err = RenderError::new("boom").at_line("a: 1\n", 9);
        assert_eq!(err.match_text, None);
    }
}
