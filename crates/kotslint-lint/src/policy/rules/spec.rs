//! Document shape and release-wide presence rules

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use kotslint_core::{LintType, ReleaseKind};

use super::{Rule, RuleContext, value_at};
use crate::policy::PolicyFinding;

/// Rules every document set gets
pub fn shape_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(MissingKind), Box::new(MissingApiVersion)]
}

/// Shape rules plus release-wide presence checks
pub fn pre_render_rules() -> Vec<Box<dyn Rule>> {
    let mut rules = shape_rules();
    rules.extend([
        Box::new(MissingSpec::CONFIG) as Box<dyn Rule>,
        Box::new(MissingSpec::PREFLIGHT),
        Box::new(MissingSpec::TROUBLESHOOT),
        Box::new(MissingSpec::APPLICATION),
    ]);
    rules
}

/// Rules over the literal text of unrendered documents
pub fn content_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(HardcodedNamespace), Box::new(MayContainSecrets)]
}

pub fn post_render_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(InvalidRenderedYaml)]
}

/// Templated values are resolved at deploy time
pub(crate) fn is_templated(value: &str) -> bool {
    value.contains("repl{{") || value.contains("{{repl") || value.contains("{{")
}

/// `missing-kind-field`
pub struct MissingKind;

impl Rule for MissingKind {
    fn id(&self) -> &'static str {
        "missing-kind-field"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        ctx.values()
            .filter(|(_, value)| value.get("kind").is_none())
            .map(|(view, _)| self.finding("Missing kind field").in_view(view))
            .collect()
    }
}

/// `missing-api-version-field`
pub struct MissingApiVersion;

impl Rule for MissingApiVersion {
    fn id(&self) -> &'static str {
        "missing-api-version-field"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        ctx.values()
            .filter(|(_, value)| value.get("apiVersion").is_none())
            .map(|(view, _)| self.finding("Missing apiVersion field").in_view(view))
            .collect()
    }
}

/// A release should carry one document of each of these kinds
pub struct MissingSpec {
    id: &'static str,
    kind: ReleaseKind,
    message: &'static str,
}

impl MissingSpec {
    const CONFIG: Self = Self {
        id: "config-spec",
        kind: ReleaseKind::Config,
        message: "Missing config spec",
    };
    const PREFLIGHT: Self = Self {
        id: "preflight-spec",
        kind: ReleaseKind::Preflight,
        message: "Missing preflight spec",
    };
    const TROUBLESHOOT: Self = Self {
        id: "troubleshoot-spec",
        kind: ReleaseKind::SupportBundle,
        message: "Missing troubleshoot spec",
    };
    const APPLICATION: Self = Self {
        id: "application-spec",
        kind: ReleaseKind::Application,
        message: "Missing application spec",
    };
}

impl Rule for MissingSpec {
    fn id(&self) -> &'static str {
        self.id
    }

    fn lint_type(&self) -> LintType {
        LintType::Warn
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let present = ctx
            .values()
            .any(|(_, value)| ReleaseKind::of_value(value) == self.kind);
        if present {
            Vec::new()
        } else {
            vec![PolicyFinding::new(self.id, self.lint_type(), self.message)]
        }
    }
}

/// `hardcoded-namespace`
pub struct HardcodedNamespace;

impl Rule for HardcodedNamespace {
    fn id(&self) -> &'static str {
        "hardcoded-namespace"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        ctx.values()
            .filter(|(_, value)| {
                value_at(value, "metadata.namespace")
                    .and_then(Value::as_str)
                    .is_some_and(|ns| !ns.is_empty() && !is_templated(ns))
            })
            .map(|(view, _)| {
                self.finding("Found a hardcoded namespace")
                    .in_view(view)
                    .at_field("metadata.namespace")
            })
            .collect()
    }
}

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^\s*(?:-\s*)?["']?[\w.-]*(?:password|passwd|secret|token|apikey|api_key|access_key)["']?\s*:\s*["']?([^\s"'#]+)"#,
    )
    .expect("valid secret assignment regex")
});

/// `may-contain-secrets`
pub struct MayContainSecrets;

impl Rule for MayContainSecrets {
    fn id(&self) -> &'static str {
        "may-contain-secrets"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for document in &ctx.documents {
            let is_config = document
                .value
                .as_ref()
                .is_some_and(|v| ReleaseKind::of_value(v) == ReleaseKind::Config);
            if is_config {
                continue;
            }

            for line in document.view.content.lines() {
                let Some(captures) = SECRET_ASSIGNMENT.captures(line) else {
                    continue;
                };
                let value = &captures[1];
                if is_templated(value) || value.starts_with('$') {
                    continue;
                }
                findings.push(
                    self.finding("It looks like there might be secrets in this file")
                        .in_view(document.view)
                        .at_match(line.trim()),
                );
            }
        }
        findings
    }
}

/// `invalid-rendered-yaml`
pub struct InvalidRenderedYaml;

impl Rule for InvalidRenderedYaml {
    fn id(&self) -> &'static str {
        "invalid-rendered-yaml"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        ctx.documents
            .iter()
            .filter(|d| d.view.is_yaml())
            .filter_map(|d| {
                serde_yaml::from_str::<Value>(&d.view.content)
                    .err()
                    .map(|e| self.finding(e.to_string()).in_view(d.view))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RuleSet;
    use kotslint_core::DocumentView;

    fn view(path: &str, content: &str) -> DocumentView {
        DocumentView {
            path: path.to_string(),
            name: path.to_string(),
            doc_index: 0,
            content: content.to_string(),
        }
    }

    fn run(rule: &dyn Rule, views: &[DocumentView]) -> Vec<PolicyFinding> {
        rule.check(&RuleContext::new(views))
    }

    #[test]
    fn test_missing_specs() {
        let views = vec![view(
            "app.yaml",
            "apiVersion: kots.io/v1beta1\nkind: Application\nmetadata:\n  name: app\n",
        )];
        let findings = RuleSet::new("t", pre_render_rules()).evaluate_context(&RuleContext::new(&views));
        let rules: Vec<_> = findings.iter().map(|f| f.rule.as_str()).collect();
        assert_eq!(rules, vec!["config-spec", "preflight-spec", "troubleshoot-spec"]);
        assert!(findings.iter().all(|f| f.path.is_empty()));
        assert!(findings.iter().all(|f| f.lint_type == LintType::Warn));
    }

    #[test]
    fn test_hardcoded_namespace() {
        let views = vec![
            view("a.yaml", "kind: ConfigMap\nmetadata:\n  namespace: prod\n"),
            view("b.yaml", "kind: ConfigMap\nmetadata:\n  namespace: repl{{ Namespace }}\n"),
        ];
        let findings = run(&HardcodedNamespace, &views);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, "a.yaml");
        assert_eq!(findings[0].field, "metadata.namespace");
    }

    #[test]
    fn test_may_contain_secrets() {
        let views = vec![view(
            "deploy.yaml",
            "kind: Deployment\nspec:\n  env:\n    - DB_PASSWORD: hunter2\n    - API_TOKEN: repl{{ ConfigOption \"token\" }}\n    - secretName: creds\n",
        )];
        let findings = run(&MayContainSecrets, &views);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].match_text, "- DB_PASSWORD: hunter2");
    }

    #[test]
    fn test_invalid_rendered_yaml() {
        let views = vec![
            view("ok.yaml", "a: b\n"),
            view("bad.yaml", "a: b\n c: d\n"),
        ];
        let findings = run(&InvalidRenderedYaml, &views);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, "bad.yaml");
    }
}
