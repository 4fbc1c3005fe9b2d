//! Validation of kots annotations
//!
//! Two annotation families are checked on every document:
//! - `kots.io/creation-phase` and `kots.io/deletion-phase` hold an integer
//!   in -9999..=9999
//! - `kots.io/wait-for-properties` holds `jsonpath=value` pairs

use kotslint_core::position::line_for_match;
use kotslint_core::{DocumentView, LintExpression};
use serde_yaml::Value;

/// Annotation ordering resources at creation
pub const CREATION_PHASE: &str = "kots.io/creation-phase";
/// Annotation ordering resources at deletion
pub const DELETION_PHASE: &str = "kots.io/deletion-phase";
/// Annotation listing properties to wait for after apply
pub const WAIT_FOR_PROPERTIES: &str = "kots.io/wait-for-properties";

const PHASE_RULE: &str = "deployment-phase-annotation";
const WAIT_FOR_PROPERTIES_RULE: &str = "wait-for-properties-annotation";

const MIN_PHASE: i64 = -9999;
const MAX_PHASE: i64 = 9999;

/// Check the annotations of one document. `original` is the content of the
/// file the document came from.
pub fn lint_annotations(view: &DocumentView, original: &str) -> Vec<LintExpression> {
    let Some(document) = view.value() else {
        return Vec::new();
    };
    let Some(annotations) = document
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(Value::as_mapping)
    else {
        return Vec::new();
    };

    let position = |key: &str| line_for_match(original, view.doc_index, key);
    let mut findings = Vec::new();

    for phase in [CREATION_PHASE, DELETION_PHASE] {
        if let Some(value) = annotations.get(phase) {
            let raw = annotation_string(value);
            if parse_phase(&raw).is_none() {
                findings.push(
                    LintExpression::error(
                        PHASE_RULE,
                        format!(
                            "Invalid value \"{raw}\" for annotation \"{phase}\", should be between {MIN_PHASE} and {MAX_PHASE}"
                        ),
                    )
                    .with_path(&view.path)
                    .with_line(position(phase)),
                );
            }
        }
    }

    if let Some(value) = annotations.get(WAIT_FOR_PROPERTIES) {
        if let Err(message) = validate_wait_for_properties(&annotation_string(value)) {
            findings.push(
                LintExpression::error(WAIT_FOR_PROPERTIES_RULE, message)
                    .with_path(&view.path)
                    .with_line(position(WAIT_FOR_PROPERTIES)),
            );
        }
    }

    findings
}

fn annotation_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Phase value, if it is a decimal integer within range
pub fn parse_phase(value: &str) -> Option<i64> {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value
        .parse::<i64>()
        .ok()
        .filter(|phase| (MIN_PHASE..=MAX_PHASE).contains(phase))
}

/// Validate a `kots.io/wait-for-properties` value; the error is the first
/// violation found
pub fn validate_wait_for_properties(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!(
            "Annotation \"{WAIT_FOR_PROPERTIES}\" must not be empty"
        ));
    }

    for pair in value.split(',') {
        let Some((key, expected)) = pair.split_once('=') else {
            return Err(format!(
                "Invalid property \"{pair}\" in annotation \"{WAIT_FOR_PROPERTIES}\", expected jsonpath=value"
            ));
        };
        if !is_jsonpath(key) {
            return Err(format!(
                "Invalid jsonpath \"{key}\" in annotation \"{WAIT_FOR_PROPERTIES}\""
            ));
        }
        if expected.is_empty() {
            return Err(format!(
                "Missing value for \"{key}\" in annotation \"{WAIT_FOR_PROPERTIES}\""
            ));
        }
    }

    Ok(())
}

/// A kubectl-style jsonpath: `.a.b[0]`, optionally wrapped in braces
fn is_jsonpath(key: &str) -> bool {
    let inner = key
        .strip_prefix('{')
        .and_then(|k| k.strip_suffix('}'))
        .unwrap_or(key);
    if !inner.starts_with('.') || inner.len() < 2 || inner.chars().any(char::is_whitespace) {
        return false;
    }

    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            '{' | '}' => return false,
            _ => {}
        }
    }
    depth == 0 && !inner.contains("..") && !inner.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(content: &str) -> Vec<LintExpression> {
        let view = DocumentView {
            path: "deploy.yaml".to_string(),
            name: "deploy.yaml".to_string(),
            doc_index: 0,
            content: content.to_string(),
        };
        lint_annotations(&view, content)
    }

    #[test]
    fn test_phase_out_of_range() {
        let content = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n  annotations:\n    kots.io/creation-phase: \"10000\"\n";
        let findings = lint(content);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "deployment-phase-annotation");
        assert!(findings[0].is_error());
        assert!(findings[0].message.contains("should be between -9999 and 9999"));
        assert_eq!(findings[0].line(), Some(6));
    }

    #[test]
    fn test_phase_values() {
        assert_eq!(parse_phase("-9999"), Some(-9999));
        assert_eq!(parse_phase("9999"), Some(9999));
        assert_eq!(parse_phase("+5"), Some(5));
        assert_eq!(parse_phase("10000"), None);
        assert_eq!(parse_phase("1.5"), None);
        assert_eq!(parse_phase("abc"), None);
        assert_eq!(parse_phase(""), None);
        assert_eq!(parse_phase("-"), None);
    }

    #[test]
    fn test_numeric_phase_is_accepted() {
        let content = "metadata:\n  annotations:\n    kots.io/deletion-phase: -3\n";
        assert!(lint(content).is_empty());
    }

    #[test]
    fn test_wait_for_properties() {
        assert!(validate_wait_for_properties(".status.phase=Running").is_ok());
        assert!(validate_wait_for_properties("{.status.phase}=Running,.status.ready=true").is_ok());
        assert!(validate_wait_for_properties(".items[0].name=x").is_ok());

        assert!(validate_wait_for_properties("").unwrap_err().contains("must not be empty"));
        assert!(validate_wait_for_properties("status").unwrap_err().contains("expected jsonpath=value"));
        assert!(validate_wait_for_properties("status=1").unwrap_err().contains("Invalid jsonpath"));
        assert!(validate_wait_for_properties(".a[0=1").unwrap_err().contains("Invalid jsonpath"));
        assert!(validate_wait_for_properties(".a=").unwrap_err().contains("Missing value"));
    }

    #[test]
    fn test_first_wait_for_violation_only() {
        let content = "metadata:\n  annotations:\n    kots.io/wait-for-properties: \"bad,.a=\"\n";
        let findings = lint(content);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "wait-for-properties-annotation");
        assert_eq!(findings[0].line(), Some(3));
    }
}
