//! Caller-supplied policy modules
//!
//! Enterprise policies are MiniJinja templates. Each module is prepended
//! with a fixed preamble providing a `lint(...)` macro; the template walks
//! `files` and calls `lint` once per finding. Every call emits one YAML list
//! item, so the rendered output decodes as a list of [`PolicyFinding`]s.
//!
//! ```jinja
//! {% for file in files %}
//!   {% if file.value and file.value.kind == "Deployment" %}
//!     {{ lint("my-rule", "warn", "Found a deployment", path=file.path,
//!             docIndex=file.docIndex, field="kind") }}
//!   {% endif %}
//! {% endfor %}
//! ```

use minijinja::{AutoEscape, Environment, Error, ErrorKind, Value, context};
use serde::{Deserialize, Serialize};

use kotslint_core::DocumentView;

use super::{PolicyEngine, PolicyFinding};
use crate::error::{LintError, Result};

/// Shared by every module and not configurable per request
const PREAMBLE: &str = r#"{%- macro lint(rule, type, message, path="", docIndex=0, field="", match="") %}
- {{ {"rule": rule, "type": type, "message": message, "path": path, "docIndex": docIndex, "field": field, "match": match} | tojson }}
{% endmacro -%}
"#;

/// A named policy module as sent by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyModule {
    pub name: String,
    pub policy: String,
}

/// One document as policies see it
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyFile<'a> {
    path: &'a str,
    name: &'a str,
    doc_index: usize,
    content: &'a str,
    value: Option<serde_yaml::Value>,
}

/// Serialize a value as compact JSON
fn tojson(value: Value) -> std::result::Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    serde_json::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// A compiled policy module
pub struct TemplatePolicy {
    name: String,
    env: Environment<'static>,
}

impl TemplatePolicy {
    /// Compile a module with the preamble. A module that does not compile is
    /// the caller's mistake.
    pub fn compile(module: &PolicyModule) -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("tojson", tojson);

        let source = format!("{PREAMBLE}{}", module.policy);
        env.add_template_owned(module.name.clone(), source)
            .map_err(|e| LintError::InvalidPolicy {
                name: module.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: module.name.clone(),
            env,
        })
    }

    fn failure(&self, message: impl Into<String>) -> LintError {
        LintError::Policy {
            name: self.name.clone(),
            message: message.into(),
        }
    }
}

impl PolicyEngine for TemplatePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, views: &[DocumentView]) -> Result<Vec<PolicyFinding>> {
        let files: Vec<PolicyFile<'_>> = views
            .iter()
            .map(|view| PolicyFile {
                path: &view.path,
                name: &view.name,
                doc_index: view.doc_index,
                content: &view.content,
                value: view.value(),
            })
            .collect();

        let template = self
            .env
            .get_template(&self.name)
            .map_err(|e| self.failure(e.to_string()))?;
        let output = template
            .render(context! { files => Value::from_serialize(&files) })
            .map_err(|e| self.failure(e.to_string()))?;

        let findings: Vec<PolicyFinding> = if output.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str(&output)
                .map_err(|e| self.failure(format!("invalid policy output: {e}")))?
        };

        tracing::debug!(policy = %self.name, findings = findings.len(), "evaluated policy");
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kotslint_core::LintType;

    fn module(policy: &str) -> PolicyModule {
        PolicyModule {
            name: "replicas".to_string(),
            policy: policy.to_string(),
        }
    }

    fn views() -> Vec<DocumentView> {
        vec![
            DocumentView {
                path: "web.yaml".to_string(),
                name: "web.yaml".to_string(),
                doc_index: 0,
                content: "apiVersion: apps/v1\nkind: Deployment\nspec:\n  replicas: 5\n".to_string(),
            },
            DocumentView {
                path: "cm.yaml".to_string(),
                name: "cm.yaml".to_string(),
                doc_index: 0,
                content: "apiVersion: v1\nkind: ConfigMap\n".to_string(),
            },
        ]
    }

    const REPLICAS: &str = r#"{% for file in files %}
{% if file.value and file.value.kind == "Deployment" and file.value.spec.replicas > 3 %}
{{ lint("too-many-replicas", "warn", "Too many replicas", path=file.path, docIndex=file.docIndex, field="spec.replicas") }}
{% endif %}
{% endfor %}"#;

    #[test]
    fn test_policy_findings() {
        let policy = TemplatePolicy::compile(&module(REPLICAS)).unwrap();
        let findings = policy.evaluate(&views()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "too-many-replicas");
        assert_eq!(findings[0].lint_type, LintType::Warn);
        assert_eq!(findings[0].path, "web.yaml");
        assert_eq!(findings[0].field, "spec.replicas");
        assert_eq!(findings[0].match_text, "");
    }

    #[test]
    fn test_policy_without_findings() {
        let policy = TemplatePolicy::compile(&module("{# nothing to report #}")).unwrap();
        assert!(policy.evaluate(&views()).unwrap().is_empty());
    }

    #[test]
    fn test_policy_with_match_and_quotes() {
        let policy = TemplatePolicy::compile(&module(
            r#"{{ lint("quoted", "info", "say \"hi\"", path="cm.yaml", match="kind: ConfigMap") }}"#,
        ))
        .unwrap();
        let findings = policy.evaluate(&views()).unwrap();

        assert_eq!(findings[0].message, "say \"hi\"");
        assert_eq!(findings[0].match_text, "kind: ConfigMap");
    }

    #[test]
    fn test_syntax_error_is_invalid_policy() {
        let err = TemplatePolicy::compile(&module("{% if %}")).err().unwrap();
        assert!(matches!(err, LintError::InvalidPolicy { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unparseable_output_is_policy_error() {
        let policy = TemplatePolicy::compile(&module("not: [valid")).unwrap();
        let err = policy.evaluate(&views()).unwrap_err();
        assert!(matches!(err, LintError::Policy { .. }));
    }
}
