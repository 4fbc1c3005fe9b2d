//! Workload rules: containers, volumes and replicas

use serde_yaml::Value;

use kotslint_core::{DocumentView, LintType};

use super::{Rule, RuleContext, kind_of, value_at};
use crate::policy::PolicyFinding;

pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ImageLatestTag),
        Box::new(LocalImageName),
        Box::new(Resources),
        Box::new(ResourceLimits),
        Box::new(ResourceRequests),
        Box::new(Privileged),
        Box::new(AllowPrivilegeEscalation),
        Box::new(HostPathVolumes),
        Box::new(DockerSockVolume),
        Box::new(SingleReplica),
    ]
}

/// Path of the pod spec within a workload of `kind`
fn pod_spec_path(kind: &str) -> Option<&'static str> {
    match kind {
        "Pod" => Some("spec"),
        "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Job"
        | "ReplicationController" => Some("spec.template.spec"),
        "CronJob" => Some("spec.jobTemplate.spec.template.spec"),
        _ => None,
    }
}

/// One container of a workload with its YAML path
struct Container<'v> {
    view: &'v DocumentView,
    field: String,
    value: &'v Value,
}

/// Containers and init containers of every workload
fn containers<'v>(ctx: &'v RuleContext<'_>) -> Vec<Container<'v>> {
    let mut out = Vec::new();
    for (view, value) in ctx.values() {
        let Some(pod) = kind_of(value).and_then(pod_spec_path) else {
            continue;
        };
        for key in ["containers", "initContainers"] {
            let Some(list) = value_at(value, &format!("{pod}.{key}")).and_then(Value::as_sequence)
            else {
                continue;
            };
            for (i, container) in list.iter().enumerate() {
                out.push(Container {
                    view,
                    field: format!("{pod}.{key}.{i}"),
                    value: container,
                });
            }
        }
    }
    out
}

/// Host path volumes of every workload, with the path of their `hostPath`
fn host_path_volumes<'v>(ctx: &'v RuleContext<'_>) -> Vec<(&'v DocumentView, String, &'v Value)> {
    let mut out = Vec::new();
    for (view, value) in ctx.values() {
        let Some(pod) = kind_of(value).and_then(pod_spec_path) else {
            continue;
        };
        let Some(volumes) = value_at(value, &format!("{pod}.volumes")).and_then(Value::as_sequence)
        else {
            continue;
        };
        for (i, volume) in volumes.iter().enumerate() {
            if let Some(host_path) = volume.get("hostPath") {
                out.push((view, format!("{pod}.volumes.{i}.hostPath"), host_path));
            }
        }
    }
    out
}

fn image_of(container: &Value) -> Option<&str> {
    container.get("image").and_then(Value::as_str)
}

/// `container-image-latest-tag`
pub struct ImageLatestTag;

impl Rule for ImageLatestTag {
    fn id(&self) -> &'static str {
        "container-image-latest-tag"
    }

    fn lint_type(&self) -> LintType {
        LintType::Warn
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| image_of(c.value).is_some_and(|image| image.ends_with(":latest")))
            .map(|c| {
                self.finding("Container has image with \"latest\" tag")
                    .in_view(c.view)
                    .at_field(format!("{}.image", c.field))
            })
            .collect()
    }
}

/// `container-image-local-image-name`
///
/// `LocalImageName` resolves at deploy time, so the rendered image is empty;
/// the rule reads the image from the unrendered document.
pub struct LocalImageName;

impl Rule for LocalImageName {
    fn id(&self) -> &'static str {
        "container-image-local-image-name"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| {
                let source = ctx.source_of(c.view);
                serde_yaml::from_str::<Value>(&source.content)
                    .ok()
                    .as_ref()
                    .and_then(|v| value_at(v, &format!("{}.image", c.field)))
                    .and_then(Value::as_str)
                    .is_some_and(|image| image.contains("LocalImageName"))
            })
            .map(|c| {
                self.finding("Container image utilizes LocalImageName")
                    .in_view(c.view)
                    .at_field(format!("{}.image", c.field))
            })
            .collect()
    }
}

/// `container-resources`
pub struct Resources;

impl Rule for Resources {
    fn id(&self) -> &'static str {
        "container-resources"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| c.value.get("resources").is_none())
            .map(|c| {
                self.finding("Missing container resources")
                    .in_view(c.view)
                    .at_field(c.field)
            })
            .collect()
    }
}

/// `container-resource-limits`
pub struct ResourceLimits;

impl Rule for ResourceLimits {
    fn id(&self) -> &'static str {
        "container-resource-limits"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| {
                c.value
                    .get("resources")
                    .is_some_and(|r| r.get("limits").is_none())
            })
            .map(|c| {
                self.finding("Missing resource limits")
                    .in_view(c.view)
                    .at_field(format!("{}.resources", c.field))
            })
            .collect()
    }
}

/// `container-resource-requests`
pub struct ResourceRequests;

impl Rule for ResourceRequests {
    fn id(&self) -> &'static str {
        "container-resource-requests"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| {
                c.value
                    .get("resources")
                    .is_some_and(|r| r.get("requests").is_none())
            })
            .map(|c| {
                self.finding("Missing requests resource")
                    .in_view(c.view)
                    .at_field(format!("{}.resources", c.field))
            })
            .collect()
    }
}

fn security_flag(container: &Value, flag: &str) -> bool {
    container
        .get("securityContext")
        .and_then(|sc| sc.get(flag))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// `privileged`
pub struct Privileged;

impl Rule for Privileged {
    fn id(&self) -> &'static str {
        "privileged"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| security_flag(c.value, "privileged"))
            .map(|c| {
                self.finding("User-defined container runs in privileged mode")
                    .in_view(c.view)
                    .at_field(format!("{}.securityContext.privileged", c.field))
            })
            .collect()
    }
}

/// `allow-privilege-escalation`
pub struct AllowPrivilegeEscalation;

impl Rule for AllowPrivilegeEscalation {
    fn id(&self) -> &'static str {
        "allow-privilege-escalation"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        containers(ctx)
            .into_iter()
            .filter(|c| security_flag(c.value, "allowPrivilegeEscalation"))
            .map(|c| {
                self.finding("Allows privilege escalation")
                    .in_view(c.view)
                    .at_field(format!("{}.securityContext.allowPrivilegeEscalation", c.field))
            })
            .collect()
    }
}

/// `volumes-host-paths`
pub struct HostPathVolumes;

impl Rule for HostPathVolumes {
    fn id(&self) -> &'static str {
        "volumes-host-paths"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        host_path_volumes(ctx)
            .into_iter()
            .map(|(view, field, _)| {
                self.finding("Volume has hostpath")
                    .in_view(view)
                    .at_field(field)
            })
            .collect()
    }
}

/// `volume-docker-sock`
pub struct DockerSockVolume;

impl Rule for DockerSockVolume {
    fn id(&self) -> &'static str {
        "volume-docker-sock"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        host_path_volumes(ctx)
            .into_iter()
            .filter(|(_, _, host_path)| {
                host_path.get("path").and_then(Value::as_str) == Some("/var/run/docker.sock")
            })
            .map(|(view, field, _)| {
                self.finding("Volume mounts docker.sock")
                    .in_view(view)
                    .at_field(format!("{field}.path"))
            })
            .collect()
    }
}

/// `replicas-1`
pub struct SingleReplica;

impl Rule for SingleReplica {
    fn id(&self) -> &'static str {
        "replicas-1"
    }

    fn lint_type(&self) -> LintType {
        LintType::Info
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        ctx.values()
            .filter(|(_, value)| {
                matches!(
                    kind_of(value),
                    Some("Deployment" | "StatefulSet" | "ReplicaSet")
                )
            })
            .filter(|(_, value)| value_at(value, "spec.replicas").and_then(Value::as_i64) == Some(1))
            .map(|(view, _)| {
                self.finding("Found Replicas 1")
                    .in_view(view)
                    .at_field("spec.replicas")
            })
            .collect()
    }
}
