//! Rules over the kots Application and HelmChart manifests

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde_yaml::Value;

use kotslint_core::kinds::scalar_string;
use kotslint_core::{DocumentView, LintType, ReleaseKind};

use super::{Rule, RuleContext, kind_of, value_at};
use crate::policy::PolicyFinding;

pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(KotsVersion::TARGET),
        Box::new(KotsVersion::MIN),
        Box::new(ApplicationIcon),
        Box::new(StatusInformers),
        Box::new(NonexistentStatusInformer),
        Box::new(InvalidHelmReleaseName),
        Box::new(DuplicateHelmReleaseName),
    ]
}

const MAX_RELEASE_NAME_LENGTH: usize = 53;

static RELEASE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid release name regex")
});

fn applications<'c, 'a>(ctx: &'c RuleContext<'a>) -> Vec<(&'a DocumentView, &'c Value)> {
    ctx.values()
        .filter(|(_, value)| ReleaseKind::of_value(value) == ReleaseKind::Application)
        .collect()
}

/// Parse a version the way release tags spell it
fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().trim_start_matches('v')).ok()
}

/// `invalid-target-kots-version` and `invalid-min-kots-version`
pub struct KotsVersion {
    id: &'static str,
    field: &'static str,
    label: &'static str,
}

impl KotsVersion {
    const TARGET: Self = Self {
        id: "invalid-target-kots-version",
        field: "spec.targetKotsVersion",
        label: "Target",
    };
    const MIN: Self = Self {
        id: "invalid-min-kots-version",
        field: "spec.minKotsVersion",
        label: "Minimum",
    };
}

impl Rule for KotsVersion {
    fn id(&self) -> &'static str {
        self.id
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, app) in applications(ctx) {
            let Some(raw) = value_at(app, self.field).and_then(scalar_string) else {
                continue;
            };
            let finding = |message: String| {
                PolicyFinding::new(self.id, self.lint_type(), message)
                    .in_view(view)
                    .at_field(self.field)
            };

            let Some(version) = parse_version(&raw) else {
                findings.push(finding(format!(
                    "{} KOTS version must be a valid semver",
                    self.label
                )));
                continue;
            };

            if self.field == KotsVersion::MIN.field {
                let target = value_at(app, KotsVersion::TARGET.field)
                    .and_then(scalar_string)
                    .and_then(|t| parse_version(&t));
                if target.is_some_and(|target| version > target) {
                    findings.push(finding(
                        "Minimum KOTS version must not be greater than the target KOTS version"
                            .to_string(),
                    ));
                }
            }
        }
        findings
    }
}

/// `application-icon`
pub struct ApplicationIcon;

impl Rule for ApplicationIcon {
    fn id(&self) -> &'static str {
        "application-icon"
    }

    fn lint_type(&self) -> LintType {
        LintType::Warn
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        applications(ctx)
            .into_iter()
            .filter(|(_, app)| {
                value_at(app, "spec.icon")
                    .and_then(scalar_string)
                    .is_none_or(|icon| icon.trim().is_empty())
            })
            .map(|(view, _)| self.finding("Missing application icon").in_view(view))
            .collect()
    }
}

/// `application-statusInformers`
pub struct StatusInformers;

impl Rule for StatusInformers {
    fn id(&self) -> &'static str {
        "application-statusInformers"
    }

    fn lint_type(&self) -> LintType {
        LintType::Warn
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        applications(ctx)
            .into_iter()
            .filter(|(_, app)| {
                value_at(app, "spec.statusInformers")
                    .and_then(Value::as_sequence)
                    .is_none_or(|informers| informers.is_empty())
            })
            .map(|(view, _)| {
                self.finding("Missing application statusInformers")
                    .in_view(view)
            })
            .collect()
    }
}

/// `nonexistent-status-informer-object`
pub struct NonexistentStatusInformer;

impl NonexistentStatusInformer {
    /// Kind and name of an informer written as `[namespace/]kind/name`
    fn target(informer: &str) -> Option<(String, &str)> {
        let parts: Vec<&str> = informer.split('/').collect();
        let (kind, name) = match parts.as_slice() {
            [kind, name] | [_, kind, name] => (*kind, *name),
            _ => return None,
        };
        let kind = match kind.to_lowercase().as_str() {
            "deploy" | "deployment" | "deployments" => "deployment",
            "sts" | "statefulset" | "statefulsets" => "statefulset",
            "ds" | "daemonset" | "daemonsets" => "daemonset",
            "svc" | "service" | "services" => "service",
            "ing" | "ingress" | "ingresses" => "ingress",
            "pvc" | "persistentvolumeclaim" | "persistentvolumeclaims" => "persistentvolumeclaim",
            other => return Some((other.to_string(), name)),
        };
        Some((kind.to_string(), name))
    }
}

impl Rule for NonexistentStatusInformer {
    fn id(&self) -> &'static str {
        "nonexistent-status-informer-object"
    }

    fn lint_type(&self) -> LintType {
        LintType::Warn
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let objects: Vec<(String, String)> = ctx
            .values()
            .filter_map(|(_, value)| {
                let kind = kind_of(value)?.to_lowercase();
                let name = value_at(value, "metadata.name").and_then(scalar_string)?;
                Some((kind, name))
            })
            .collect();

        let mut findings = Vec::new();
        for (view, app) in applications(ctx) {
            let Some(informers) = value_at(app, "spec.statusInformers").and_then(Value::as_sequence)
            else {
                continue;
            };
            for (i, informer) in informers.iter().enumerate() {
                let Some(informer) = informer.as_str().filter(|s| !s.trim().is_empty()) else {
                    continue;
                };
                let Some((kind, name)) = Self::target(informer.trim()) else {
                    continue;
                };
                let exists = objects.iter().any(|(k, n)| *k == kind && n == name);
                if !exists {
                    findings.push(
                        self.finding(
                            "Status informer points to a nonexistent kubernetes object. \
                             If this is a Helm resource, this warning can be ignored.",
                        )
                        .in_view(view)
                        .at_field(format!("spec.statusInformers.{i}")),
                    );
                }
            }
        }
        findings
    }
}

/// Release name of a HelmChart manifest and the field it was read from
fn release_name(chart: &Value) -> Option<(String, &'static str)> {
    for field in ["spec.releaseName", "spec.chart.releaseName"] {
        if let Some(name) = value_at(chart, field).and_then(scalar_string) {
            return Some((name, field));
        }
    }
    None
}

fn helm_charts<'c, 'a>(ctx: &'c RuleContext<'a>) -> Vec<(&'a DocumentView, &'c Value)> {
    ctx.values()
        .filter(|(_, value)| ReleaseKind::of_value(value) == ReleaseKind::HelmChart)
        .collect()
}

/// `invalid-helm-release-name`
pub struct InvalidHelmReleaseName;

impl Rule for InvalidHelmReleaseName {
    fn id(&self) -> &'static str {
        "invalid-helm-release-name"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        helm_charts(ctx)
            .into_iter()
            .filter_map(|(view, chart)| {
                let (name, field) = release_name(chart)?;
                let valid = name.len() <= MAX_RELEASE_NAME_LENGTH && RELEASE_NAME.is_match(&name);
                (!valid).then(|| {
                    self.finding(format!(
                        "Invalid Helm release name, must match regex {} and the length must not be longer than {MAX_RELEASE_NAME_LENGTH}",
                        RELEASE_NAME.as_str()
                    ))
                    .in_view(view)
                    .at_field(field)
                })
            })
            .collect()
    }
}

/// `duplicate-helm-release-name`
pub struct DuplicateHelmReleaseName;

impl Rule for DuplicateHelmReleaseName {
    fn id(&self) -> &'static str {
        "duplicate-helm-release-name"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut first_use: HashMap<String, &DocumentView> = HashMap::new();
        let mut findings = Vec::new();

        for (view, chart) in helm_charts(ctx) {
            let (name, field) = match release_name(chart) {
                Some(found) => found,
                None => match value_at(chart, "spec.chart.name").and_then(scalar_string) {
                    Some(name) => (name, "spec.chart.name"),
                    None => continue,
                },
            };

            match first_use.get(&name) {
                Some(first) => findings.push(
                    self.finding(format!(
                        "Release name \"{name}\" is already used in {}",
                        first.path
                    ))
                    .in_view(view)
                    .at_field(field),
                ),
                None => {
                    first_use.insert(name, view);
                }
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn application(spec: &str) -> DocumentView {
        view(
            "kots-app.yaml",
            &format!("apiVersion: kots.io/v1beta1\nkind: Application\nmetadata:\n  name: app\nspec:\n{spec}"),
        )
    }

    #[test]
    fn test_kots_versions() {
        let app = application("  targetKotsVersion: 1.100.0\n  minKotsVersion: 1.101.0\n");
        assert!(run(&KotsVersion::TARGET, &[app.clone()]).is_empty());
        let min = run(&KotsVersion::MIN, &[app]);
        assert_eq!(min.len(), 1);
        assert_eq!(min[0].field, "spec.minKotsVersion");

        let bad = application("  targetKotsVersion: latest\n");
        let target = run(&KotsVersion::TARGET, &[bad]);
        assert_eq!(target[0].message, "Target KOTS version must be a valid semver");
    }

    #[test]
    fn test_icon_and_status_informers() {
        let app = application("  title: App\n");
        assert_eq!(run(&ApplicationIcon, &[app.clone()]).len(), 1);
        assert_eq!(run(&StatusInformers, &[app]).len(), 1);

        let complete = application("  icon: https://example.com/icon.png\n  statusInformers:\n    - deployment/web\n");
        assert!(run(&ApplicationIcon, &[complete.clone()]).is_empty());
        assert!(run(&StatusInformers, &[complete]).is_empty());
    }

    #[test]
    fn test_nonexistent_status_informer() {
        let app = application("  statusInformers:\n    - deployment/web\n    - ns/svc/web\n    - statefulset/db\n");
        let deployment = view("web.yaml", "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n");
        let service = view("svc.yaml", "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n");

        let findings = run(&NonexistentStatusInformer, &[app, deployment, service]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field, "spec.statusInformers.2");
    }

    #[test]
    fn test_helm_release_names() {
        let chart = |path: &str, release: &str| {
            view(
                path,
                &format!("apiVersion: kots.io/v1beta2\nkind: HelmChart\nspec:\n  chart:\n    name: web\n    chartVersion: 1.0.0\n  releaseName: {release}\n"),
            )
        };
        let views = [
            chart("a.yaml", "web"),
            chart("b.yaml", "web"),
            chart("c.yaml", "Not_Valid"),
        ];

        let invalid = run(&InvalidHelmReleaseName, &views);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].path, "c.yaml");
        assert_eq!(invalid[0].field, "spec.releaseName");

        let duplicate = run(&DuplicateHelmReleaseName, &views);
        assert_eq!(duplicate.len(), 1);
        assert_eq!(duplicate[0].path, "b.yaml");
        assert!(duplicate[0].message.contains("a.yaml"));
    }
}
