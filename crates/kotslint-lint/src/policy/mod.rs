//! Policy evaluation
//!
//! A [`PolicyEngine`] looks at a set of documents and returns
//! [`PolicyFinding`]s, a narrow record naming the rule, the document and
//! either a YAML path (`field`) or a literal (`match`) to position on.
//! [`findings_to_lint_expressions`] turns findings into lint expressions
//! positioned against the author's original files.

pub mod rules;
pub mod template;

use kotslint_core::position::{line_for_doc_index, line_for_match, line_for_yaml_path};
use kotslint_core::{DocumentView, File, LintExpression, LintType};
use serde::Deserialize;

use crate::error::Result;

pub use rules::{Rule, RuleContext, RuleSet};
pub use template::{PolicyModule, TemplatePolicy};

/// One finding of a policy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFinding {
    pub rule: String,
    #[serde(rename = "type")]
    pub lint_type: LintType,
    pub message: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub doc_index: usize,
    /// YAML path within the document
    #[serde(default)]
    pub field: String,
    /// Literal text within the document
    #[serde(default, rename = "match")]
    pub match_text: String,
}

impl PolicyFinding {
    pub fn new(rule: &str, lint_type: LintType, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            lint_type,
            message: message.into(),
            path: String::new(),
            doc_index: 0,
            field: String::new(),
            match_text: String::new(),
        }
    }

    /// Attach the document the finding is about
    pub fn in_view(mut self, view: &DocumentView) -> Self {
        self.path = view.path.clone();
        self.doc_index = view.doc_index;
        self
    }

    pub fn at_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn at_match(mut self, text: impl Into<String>) -> Self {
        self.match_text = text.into();
        self
    }
}

/// Evaluates a policy over a document set
pub trait PolicyEngine: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    fn evaluate(&self, views: &[DocumentView]) -> Result<Vec<PolicyFinding>>;
}

/// Translate findings into lint expressions, resolving positions against
/// the original file at each finding's path
pub fn findings_to_lint_expressions(
    findings: Vec<PolicyFinding>,
    files: &[File],
) -> Vec<LintExpression> {
    findings
        .into_iter()
        .map(|finding| {
            let original = files
                .iter()
                .find(|f| f.path == finding.path)
                .map(|f| f.content.as_str());
            let line = original.and_then(|content| {
                if finding.field.is_empty()
                    && finding.match_text.is_empty()
                    && finding.lint_type == LintType::Error
                {
                    line_for_doc_index(content, finding.doc_index)
                } else if !finding.field.is_empty() {
                    line_for_yaml_path(content, finding.doc_index, &finding.field)
                } else if !finding.match_text.is_empty() {
                    line_for_match(content, finding.doc_index, &finding.match_text)
                } else {
                    None
                }
            });

            LintExpression::new(finding.rule, finding.lint_type, finding.message)
                .with_path(finding.path)
                .with_line(line)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: x\n---\napiVersion: v1\nkind: Pod\nspec:\n  containers:\n    - name: a\n      image: nginx:latest\n";

    fn files() -> Vec<File> {
        vec![File::new("pod.yaml", ORIGINAL)]
    }

    fn finding(lint_type: LintType) -> PolicyFinding {
        let mut finding = PolicyFinding::new("r", lint_type, "m");
        finding.path = "pod.yaml".to_string();
        finding.doc_index = 1;
        finding
    }

    #[test]
    fn test_error_without_position_uses_doc_index() {
        let out = findings_to_lint_expressions(vec![finding(LintType::Error)], &files());
        assert_eq!(out[0].line(), Some(6));
    }

    #[test]
    fn test_warning_without_position_has_none() {
        let out = findings_to_lint_expressions(vec![finding(LintType::Warn)], &files());
        assert_eq!(out[0].line(), None);
        assert_eq!(out[0].path, "pod.yaml");
    }

    #[test]
    fn test_field_and_match() {
        let by_field = finding(LintType::Warn).at_field("spec.containers.0.image");
        let by_match = finding(LintType::Info).at_match("nginx:latest");
        let out = findings_to_lint_expressions(vec![by_field, by_match], &files());
        assert_eq!(out[0].line(), Some(11));
        assert_eq!(out[1].line(), Some(11));
    }

    #[test]
    fn test_unknown_path_has_no_position() {
        let mut f = finding(LintType::Error);
        f.path = "missing.yaml".to_string();
        let out = findings_to_lint_expressions(vec![f], &files());
        assert_eq!(out[0].line(), None);
    }
}
