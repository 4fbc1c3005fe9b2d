//! Cluster installer lint
//!
//! [`InstallerLinter`] is the seam for installer-spec linters. [`KurlLinter`]
//! checks kURL `Installer` documents: exactly one Kubernetes distribution,
//! known add-ons only, and well-formed add-on versions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use serde_yaml::Value;

use kotslint_core::kinds::KURL_GROUPS;
use kotslint_core::position::{line_for_doc_index, line_for_yaml_path};
use kotslint_core::{DocumentView, GroupVersionKind, LintExpression};

/// One finding of an installer linter
#[derive(Debug, Clone, PartialEq)]
pub struct InstallerOutput {
    /// Finding type, becomes the rule suffix
    pub kind: String,
    pub message: String,
    /// YAML path within the document, if the finding has one
    pub field: Option<String>,
    /// JSON patch repairing the finding
    pub patch: Option<serde_json::Value>,
}

/// Why an installer linter produced no findings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerLintError {
    /// The document is not an installer spec
    NotAnInstaller,
    /// The document could not be decoded
    Decode(String),
}

/// Lints installer specs
pub trait InstallerLinter: Send + Sync {
    fn lint(&self, content: &str) -> Result<Vec<InstallerOutput>, InstallerLintError>;
}

const DISTRIBUTIONS: &[&str] = &["kubernetes", "k3s", "rke2"];

const ADD_ONS: &[&str] = &[
    "antrea",
    "aws",
    "calico",
    "certManager",
    "collectd",
    "containerd",
    "contour",
    "docker",
    "ekco",
    "flannel",
    "fluentd",
    "goldpinger",
    "helm",
    "kotsadm",
    "longhorn",
    "metricsServer",
    "minio",
    "openebs",
    "prometheus",
    "registry",
    "rook",
    "selinuxConfig",
    "sonobuoy",
    "velero",
    "weave",
];

/// Installer settings that are not add-ons
const SETTINGS: &[&str] = &["kurl", "firewalldConfig", "iptablesConfig"];

static ADD_ON_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(latest|\d+\.\d+\.(\d+|x)([-+][0-9A-Za-z.\-+]+)?|\d+\.(\d+|x))$")
        .expect("valid add-on version regex")
});

/// Native linter for kURL installer specs
#[derive(Debug, Default, Clone, Copy)]
pub struct KurlLinter;

impl InstallerLinter for KurlLinter {
    fn lint(&self, content: &str) -> Result<Vec<InstallerOutput>, InstallerLintError> {
        let document: Value =
            serde_yaml::from_str(content).map_err(|e| InstallerLintError::Decode(e.to_string()))?;
        let is_installer = GroupVersionKind::of(&document)
            .is_some_and(|gvk| gvk.kind == "Installer" && gvk.in_groups(KURL_GROUPS));
        if !is_installer {
            return Err(InstallerLintError::NotAnInstaller);
        }

        let Some(spec) = document.get("spec").and_then(Value::as_mapping) else {
            return Ok(vec![InstallerOutput {
                kind: "missing-kubernetes-distribution".to_string(),
                message: "No Kubernetes distribution specified".to_string(),
                field: None,
                patch: None,
            }]);
        };

        let mut outputs = Vec::new();
        let mut distributions = Vec::new();

        for (key, value) in spec {
            let Some(name) = key.as_str() else {
                continue;
            };
            if DISTRIBUTIONS.contains(&name) {
                distributions.push(name);
            } else if !ADD_ONS.contains(&name) && !SETTINGS.contains(&name) {
                outputs.push(InstallerOutput {
                    kind: "unknown-add-on".to_string(),
                    message: format!("Unknown add-on \"{name}\""),
                    field: Some(format!("spec.{name}")),
                    patch: Some(json!([{ "op": "remove", "path": format!("/spec/{name}") }])),
                });
                continue;
            }

            if SETTINGS.contains(&name) {
                continue;
            }
            if let Some(version) = value.get("version") {
                let version = match version {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => String::new(),
                };
                if !ADD_ON_VERSION.is_match(&version) {
                    outputs.push(InstallerOutput {
                        kind: "invalid-version".to_string(),
                        message: format!("Invalid version \"{version}\" for \"{name}\""),
                        field: Some(format!("spec.{name}.version")),
                        patch: None,
                    });
                }
            }
        }

        match distributions.len() {
            0 => outputs.insert(
                0,
                InstallerOutput {
                    kind: "missing-kubernetes-distribution".to_string(),
                    message: "No Kubernetes distribution specified".to_string(),
                    field: Some("spec".to_string()),
                    patch: None,
                },
            ),
            1 => {}
            _ => outputs.insert(
                0,
                InstallerOutput {
                    kind: "multiple-kubernetes-distributions".to_string(),
                    message: format!(
                        "Multiple Kubernetes distributions specified: {}",
                        distributions.join(", ")
                    ),
                    field: Some("spec".to_string()),
                    patch: None,
                },
            ),
        }

        Ok(outputs)
    }
}

/// Run `linter` over one document and translate its findings. Documents that
/// are not installers contribute nothing.
pub fn lint_installer(
    linter: &dyn InstallerLinter,
    view: &DocumentView,
    original: &str,
) -> Vec<LintExpression> {
    let outputs = match linter.lint(&view.content) {
        Ok(outputs) => outputs,
        Err(InstallerLintError::NotAnInstaller) => return Vec::new(),
        Err(InstallerLintError::Decode(message)) => {
            tracing::debug!(path = %view.path, %message, "installer linter could not decode document");
            return Vec::new();
        }
    };

    outputs
        .into_iter()
        .map(|output| {
            let line = match &output.field {
                Some(field) => line_for_yaml_path(original, view.doc_index, field),
                None => line_for_doc_index(original, view.doc_index),
            };
            LintExpression::error(
                format!("kubernetes-installer-{}", output.kind),
                output.message,
            )
            .with_path(&view.path)
            .with_line(line)
            .with_patch(output.patch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(content: &str) -> Vec<LintExpression> {
        let view = DocumentView {
            path: "installer.yaml".to_string(),
            name: "installer.yaml".to_string(),
            doc_index: 0,
            content: content.to_string(),
        };
        lint_installer(&KurlLinter, &view, content)
    }

    #[test]
    fn test_valid_installer() {
        let content = "apiVersion: cluster.kurl.sh/v1beta1\nkind: Installer\nmetadata:\n  name: app\nspec:\n  kubernetes:\n    version: 1.29.x\n  containerd:\n    version: 1.6.28\n  kotsadm:\n    version: latest\n";
        assert!(lint(content).is_empty());
    }

    #[test]
    fn test_not_an_installer_is_skipped() {
        assert!(lint("apiVersion: v1\nkind: ConfigMap\n").is_empty());
        assert!(lint("not: [valid").is_empty());
    }

    #[test]
    fn test_unknown_add_on_has_patch() {
        let content = "apiVersion: cluster.kurl.sh/v1beta1\nkind: Installer\nspec:\n  kubernetes:\n    version: 1.29.x\n  frobnicator:\n    version: 1.0.0\n";
        let findings = lint(content);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "kubernetes-installer-unknown-add-on");
        assert!(findings[0].is_error());
        assert_eq!(findings[0].line(), Some(6));
        assert_eq!(
            findings[0].patch,
            Some(json!([{ "op": "remove", "path": "/spec/frobnicator" }]))
        );
    }

    #[test]
    fn test_distributions() {
        let none = "apiVersion: kurl.sh/v1beta1\nkind: Installer\nspec:\n  weave:\n    version: 2.8.1\n";
        assert_eq!(
            lint(none)[0].rule,
            "kubernetes-installer-missing-kubernetes-distribution"
        );

        let many = "apiVersion: kurl.sh/v1beta1\nkind: Installer\nspec:\n  kubernetes:\n    version: 1.29.x\n  k3s:\n    version: 1.24.x\n";
        assert_eq!(
            lint(many)[0].rule,
            "kubernetes-installer-multiple-kubernetes-distributions"
        );
    }

    #[test]
    fn test_invalid_version() {
        let content = "apiVersion: kurl.sh/v1beta1\nkind: Installer\nspec:\n  kubernetes:\n    version: one.two\n";
        let findings = lint(content);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "kubernetes-installer-invalid-version");
        assert_eq!(findings[0].line(), Some(5));
    }
}
