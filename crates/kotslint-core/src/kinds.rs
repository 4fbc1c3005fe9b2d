//! Typed views of the release kinds the linter understands
//!
//! Most documents are linted as untyped YAML. The handful of kinds that drive
//! pipeline behaviour (the configuration spec, the application manifest, Helm
//! chart manifests, installer specs) are recognised here by group and kind.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::document::DocumentView;

pub const KOTS_GROUP: &str = "kots.io";
pub const EMBEDDED_CLUSTER_GROUP: &str = "embeddedcluster.replicated.com";
pub const KURL_GROUPS: &[&str] = &["cluster.kurl.sh", "kurl.sh"];
pub const TROUBLESHOOT_GROUPS: &[&str] = &["troubleshoot.sh", "troubleshoot.replicated.com"];
pub const APP_GROUP: &str = "app.k8s.io";

/// Kubernetes group, version and kind of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Build from an `apiVersion` string (`apps/v1`, `v1`) and a kind
    pub fn parse(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    /// Read `apiVersion` and `kind` from a decoded document
    pub fn of(value: &Value) -> Option<Self> {
        let api_version = value.get("apiVersion")?.as_str()?;
        let kind = value.get("kind")?.as_str()?;
        Some(Self::parse(api_version, kind))
    }

    pub fn of_view(view: &DocumentView) -> Option<Self> {
        view.kind_info().map(|(api, kind)| Self::parse(&api, &kind))
    }

    pub fn is(&self, group: &str, kind: &str) -> bool {
        self.group == group && self.kind == kind
    }

    pub fn in_groups(&self, groups: &[&str]) -> bool {
        groups.contains(&self.group.as_str())
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// The release kinds that change how the pipeline treats a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    Config,
    Application,
    HelmChart,
    EmbeddedClusterConfig,
    Installer,
    Preflight,
    SupportBundle,
    Other,
}

impl ReleaseKind {
    pub fn of(gvk: &GroupVersionKind) -> Self {
        match (gvk.group.as_str(), gvk.kind.as_str()) {
            (KOTS_GROUP, "Config") => Self::Config,
            (KOTS_GROUP, "Application") => Self::Application,
            (KOTS_GROUP, "HelmChart") => Self::HelmChart,
            (EMBEDDED_CLUSTER_GROUP, "Config") => Self::EmbeddedClusterConfig,
            (_, "Installer") if gvk.in_groups(KURL_GROUPS) => Self::Installer,
            (_, "Preflight") if gvk.in_groups(TROUBLESHOOT_GROUPS) => Self::Preflight,
            (_, "SupportBundle") if gvk.in_groups(TROUBLESHOOT_GROUPS) => Self::SupportBundle,
            _ => Self::Other,
        }
    }

    pub fn of_value(value: &Value) -> Self {
        GroupVersionKind::of(value).map_or(Self::Other, |gvk| Self::of(&gvk))
    }
}

/// Render a YAML scalar the way template functions see it
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn deserialize_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_string(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a string, number or boolean")),
    }
}

/// A `kots.io` Config document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub spec: ConfigSpecBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSpecBody {
    #[serde(default)]
    pub groups: Vec<ConfigGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigGroup {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub when: Option<String>,
    #[serde(default)]
    pub items: Vec<ConfigItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigItem {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub default: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub when: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub templates: Vec<RepeatTemplate>,
    #[serde(default)]
    pub values_by_group: IndexMap<String, IndexMap<String, Value>>,
    #[serde(default)]
    pub validation: Option<ConfigItemValidation>,
    /// Choices of `select_one`/`radio` items
    #[serde(default)]
    pub items: Vec<ConfigChildItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatTemplate {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub yaml_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigItemValidation {
    #[serde(default)]
    pub regex: Option<RegexValidator>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegexValidator {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigChildItem {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub default: Option<String>,
}

impl ConfigSpec {
    /// Decode a Config document into the typed schema
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Every item across every group, in declaration order
    pub fn items(&self) -> impl Iterator<Item = &ConfigItem> {
        self.spec.groups.iter().flat_map(|g| g.items.iter())
    }

    /// Substitution defaults: an item's `value`, else its `default`, else
    /// the empty string. Repeatable items also contribute their
    /// `valuesByGroup` entries.
    pub fn option_defaults(&self) -> IndexMap<String, String> {
        let mut defaults = IndexMap::new();
        for item in self.items() {
            let value = item
                .value
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| item.default.clone())
                .unwrap_or_default();
            defaults.insert(item.name.clone(), value);

            for entries in item.values_by_group.values() {
                for (name, value) in entries {
                    defaults.insert(name.clone(), scalar_string(value).unwrap_or_default());
                }
            }
        }
        defaults
    }

    /// Names an expression may refer to with `ConfigOption`
    pub fn option_names(&self) -> HashSet<String> {
        self.option_defaults().into_keys().collect()
    }
}

/// Typed view of `spec.chart` on a HelmChart manifest
pub fn helm_chart_ref(value: &Value) -> Option<(String, String)> {
    let chart = value.get("spec")?.get("chart")?;
    let name = chart.get("name").and_then(scalar_string)?;
    let version = chart
        .get("chartVersion")
        .and_then(scalar_string)
        .unwrap_or_default();
    Some((name, version))
}

/// Read a string at a dot-separated path of mapping keys
pub fn string_at(value: &Value, path: &str) -> Option<String> {
    let mut current = value;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    scalar_string(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"apiVersion: kots.io/v1beta1
kind: Config
metadata:
  name: config
spec:
  groups:
    - name: example
      title: Example
      items:
        - name: a_templated_text
          type: text
          default: a templated value
        - name: replicas
          type: text
          default: 3
        - name: overridden
          type: text
          default: d
          value: v
        - name: no_default
          type: bool
        - name: ports
          type: text
          repeatable: true
          valuesByGroup:
            ports:
              port-1: "80"
"#;

    #[test]
    fn test_parse_group_version_kind() {
        let gvk = GroupVersionKind::parse("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.api_version(), "apps/v1");

        let core = GroupVersionKind::parse("v1", "Service");
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");
    }

    #[test]
    fn test_release_kind() {
        let kind = |api: &str, k: &str| ReleaseKind::of(&GroupVersionKind::parse(api, k));
        assert_eq!(kind("kots.io/v1beta1", "Config"), ReleaseKind::Config);
        assert_eq!(kind("kots.io/v1beta2", "HelmChart"), ReleaseKind::HelmChart);
        assert_eq!(
            kind("embeddedcluster.replicated.com/v1beta1", "Config"),
            ReleaseKind::EmbeddedClusterConfig
        );
        assert_eq!(kind("cluster.kurl.sh/v1beta1", "Installer"), ReleaseKind::Installer);
        assert_eq!(kind("troubleshoot.sh/v1beta2", "Preflight"), ReleaseKind::Preflight);
        assert_eq!(kind("v1", "Config"), ReleaseKind::Other);
    }

    #[test]
    fn test_option_defaults() {
        let config = ConfigSpec::from_yaml(CONFIG).unwrap();
        let defaults = config.option_defaults();

        assert_eq!(defaults["a_templated_text"], "a templated value");
        assert_eq!(defaults["replicas"], "3");
        assert_eq!(defaults["overridden"], "v");
        assert_eq!(defaults["no_default"], "");
        assert_eq!(defaults["port-1"], "80");
        assert!(config.option_names().contains("ports"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = "apiVersion: kots.io/v1beta1\nkind: Config\nspec:\n  groups: not-a-list\n";
        assert!(ConfigSpec::from_yaml(bad).is_err());

        let nested = "apiVersion: kots.io/v1beta1\nkind: Config\nspec:\n  groups:\n    - name: g\n      items:\n        - name: x\n          default: {a: 1}\n";
        assert!(ConfigSpec::from_yaml(nested).is_err());
    }

    #[test]
    fn test_helm_chart_ref() {
        let value: Value = serde_yaml::from_str(
            "apiVersion: kots.io/v1beta2\nkind: HelmChart\nspec:\n  chart:\n    name: nginx\n    chartVersion: 1.2.3\n",
        )
        .unwrap();
        assert_eq!(
            helm_chart_ref(&value),
            Some(("nginx".to_string(), "1.2.3".to_string()))
        );
        assert_eq!(string_at(&value, "spec.chart.name").as_deref(), Some("nginx"));
    }
}
