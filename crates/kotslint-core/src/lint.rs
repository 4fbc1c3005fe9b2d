//! Lint expressions - the diagnostic every stage produces
//!
//! The JSON shape is consumed by UI clients and must stay stable:
//!
//! ```json
//! {"rule": "invalid-yaml", "type": "error", "message": "...", "path": "a.yaml",
//!  "patch": null, "positions": [{"start": {"line": 7}}]}
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a lint expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintType {
    Error,
    Warn,
    Info,
}

impl LintType {
    /// Parse a severity as written by policy modules
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for LintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintExpressionItemLinePosition {
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintExpressionItemPosition {
    pub start: LintExpressionItemLinePosition,
}

impl LintExpressionItemPosition {
    pub fn line(line: usize) -> Self {
        Self {
            start: LintExpressionItemLinePosition { line },
        }
    }
}

/// A structured finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintExpression {
    /// Stable rule id
    pub rule: String,

    /// Severity
    #[serde(rename = "type")]
    pub lint_type: LintType,

    /// Human readable message
    pub message: String,

    /// Path of the authoring file, empty for bundle-level findings
    #[serde(default)]
    pub path: String,

    /// Structured repair offered by a collaborator
    #[serde(default)]
    pub patch: Option<serde_json::Value>,

    /// 1-based lines in the original file at `path`
    #[serde(default)]
    pub positions: Vec<LintExpressionItemPosition>,
}

impl LintExpression {
    pub fn new(rule: impl Into<String>, lint_type: LintType, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            lint_type,
            message: message.into(),
            path: String::new(),
            patch: None,
            positions: Vec::new(),
        }
    }

    pub fn error(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule, LintType::Error, message)
    }

    pub fn warn(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule, LintType::Warn, message)
    }

    pub fn info(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule, LintType::Info, message)
    }

    /// Attach the authoring file path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Attach a line position. Positions are dropped for bundle-level
    /// expressions and for lines that were not resolved.
    pub fn with_line(mut self, line: Option<usize>) -> Self {
        if let Some(line) = line.filter(|l| *l >= 1)
            && !self.path.is_empty()
        {
            self.positions = vec![LintExpressionItemPosition::line(line)];
        }
        self
    }

    pub fn with_patch(mut self, patch: Option<serde_json::Value>) -> Self {
        self.patch = patch;
        self
    }

    pub fn is_error(&self) -> bool {
        self.lint_type == LintType::Error
    }

    /// First line position, if any
    pub fn line(&self) -> Option<usize> {
        self.positions.first().map(|p| p.start.line)
    }
}

/// Whether any expression has error severity
pub fn has_errors(expressions: &[LintExpression]) -> bool {
    expressions.iter().any(LintExpression::is_error)
}

/// Sort by `(path, line, rule, message)`; unpositioned expressions sort first
pub fn sort_lint_expressions(expressions: &mut [LintExpression]) {
    expressions.sort_by(compare);
}

fn compare(a: &LintExpression, b: &LintExpression) -> Ordering {
    a.path
        .cmp(&b.path)
        .then_with(|| a.line().cmp(&b.line()))
        .then_with(|| a.rule.cmp(&b.rule))
        .then_with(|| a.message.cmp(&b.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let expr = LintExpression::error("invalid-yaml", "bad")
            .with_path("a.yaml")
            .with_line(Some(7));
        let json = serde_json::to_value(&expr).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "rule": "invalid-yaml",
                "type": "error",
                "message": "bad",
                "path": "a.yaml",
                "patch": null,
                "positions": [{"start": {"line": 7}}]
            })
        );
    }

    #[test]
    fn test_bundle_level_has_no_positions() {
        let expr = LintExpression::warn("config-spec", "Missing config spec").with_line(Some(3));
        assert!(expr.positions.is_empty());
    }

    #[test]
    fn test_unresolved_line_is_dropped() {
        let expr = LintExpression::warn("r", "m").with_path("a.yaml").with_line(None);
        assert!(expr.positions.is_empty());
        let zero = LintExpression::warn("r", "m").with_path("a.yaml").with_line(Some(0));
        assert!(zero.positions.is_empty());
    }

    #[test]
    fn test_sort_order() {
        let mut exprs = vec![
            LintExpression::warn("b", "m").with_path("b.yaml").with_line(Some(1)),
            LintExpression::warn("z", "m").with_path("a.yaml").with_line(Some(5)),
            LintExpression::warn("a", "m").with_path("a.yaml").with_line(Some(5)),
            LintExpression::warn("c", "m").with_path("a.yaml"),
        ];
        sort_lint_expressions(&mut exprs);
        let rules: Vec<_> = exprs.iter().map(|e| e.rule.as_str()).collect();
        assert_eq!(rules, vec!["c", "a", "z", "b"]);
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(LintType::parse("warning"), Some(LintType::Warn));
        assert_eq!(LintType::parse("ERROR"), Some(LintType::Error));
        assert_eq!(LintType::parse("fatal"), None);
    }
}
