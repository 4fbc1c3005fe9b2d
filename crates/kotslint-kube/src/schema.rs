//! Embedded JSON schemas and their on-disk store
//!
//! Schemas ship inside the binary and are unpacked once at startup into a
//! directory owned by the caller. Validation reads them back from disk by
//! file name, `<kind>-<group>-<version>.json`.

use std::path::{Path, PathBuf};

use kotslint_core::GroupVersionKind;

use crate::error::{KubeError, Result};

/// Kubernetes version the embedded schemas describe
pub const KUBERNETES_VERSION: &str = "1.31.0";

macro_rules! embed {
    ($family:literal, $name:literal) => {
        (
            concat!($name, ".json"),
            include_str!(concat!("../schemas/", $family, "/", $name, ".json")),
        )
    };
}

static KUBERNETES_SCHEMAS: &[(&str, &str)] = &[
    embed!("kubernetes", "configmap-v1"),
    embed!("kubernetes", "cronjob-batch-v1"),
    embed!("kubernetes", "daemonset-apps-v1"),
    embed!("kubernetes", "deployment-apps-v1"),
    embed!("kubernetes", "ingress-networking-v1"),
    embed!("kubernetes", "job-batch-v1"),
    embed!("kubernetes", "networkpolicy-networking-v1"),
    embed!("kubernetes", "persistentvolumeclaim-v1"),
    embed!("kubernetes", "pod-v1"),
    embed!("kubernetes", "replicaset-apps-v1"),
    embed!("kubernetes", "secret-v1"),
    embed!("kubernetes", "service-v1"),
    embed!("kubernetes", "serviceaccount-v1"),
    embed!("kubernetes", "statefulset-apps-v1"),
    embed!("kubernetes", "storageclass-storage-v1"),
];

static TROUBLESHOOT_SCHEMAS: &[(&str, &str)] = &[
    embed!("troubleshoot", "analyzer-troubleshoot-v1beta1"),
    embed!("troubleshoot", "analyzer-troubleshoot-v1beta2"),
    embed!("troubleshoot", "collector-troubleshoot-v1beta1"),
    embed!("troubleshoot", "collector-troubleshoot-v1beta2"),
    embed!("troubleshoot", "hostpreflight-troubleshoot-v1beta1"),
    embed!("troubleshoot", "hostpreflight-troubleshoot-v1beta2"),
    embed!("troubleshoot", "preflight-troubleshoot-v1beta1"),
    embed!("troubleshoot", "preflight-troubleshoot-v1beta2"),
    embed!("troubleshoot", "redactor-troubleshoot-v1beta1"),
    embed!("troubleshoot", "redactor-troubleshoot-v1beta2"),
    embed!("troubleshoot", "supportbundle-troubleshoot-v1beta1"),
    embed!("troubleshoot", "supportbundle-troubleshoot-v1beta2"),
];

/// A family of schemas validated together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFamily {
    /// Kubernetes resources, strict variants
    Kubernetes,
    /// Troubleshoot specs (support bundles, preflights, ...)
    Troubleshoot,
}

impl SchemaFamily {
    /// Directory of this family below the store root
    pub fn dir_name(&self) -> String {
        match self {
            Self::Kubernetes => format!("kubernetes-json-schema/v{KUBERNETES_VERSION}-standalone-strict"),
            Self::Troubleshoot => "troubleshoot-json-schema".to_string(),
        }
    }

    fn embedded(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Kubernetes => KUBERNETES_SCHEMAS,
            Self::Troubleshoot => TROUBLESHOOT_SCHEMAS,
        }
    }
}

/// File name of the schema for a kind: lowercase, first DNS label of the
/// group, core group omitted
pub fn schema_file_name(gvk: &GroupVersionKind) -> String {
    let kind = gvk.kind.to_lowercase();
    let version = gvk.version.to_lowercase();
    match gvk.group.split('.').next().filter(|label| !label.is_empty()) {
        Some(label) => format!("{kind}-{}-{version}.json", label.to_lowercase()),
        None => format!("{kind}-{version}.json"),
    }
}

/// Unpacked schemas rooted at a directory
#[derive(Debug, Clone)]
pub struct SchemaStore {
    root: PathBuf,
}

impl SchemaStore {
    /// Write every embedded schema below `root`
    pub fn unpack(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { root: root.into() };
        for family in [SchemaFamily::Kubernetes, SchemaFamily::Troubleshoot] {
            let dir = store.family_dir(family);
            std::fs::create_dir_all(&dir).map_err(|source| KubeError::SchemaStore {
                path: dir.clone(),
                source,
            })?;
            for (name, content) in family.embedded() {
                let path = dir.join(name);
                std::fs::write(&path, content)
                    .map_err(|source| KubeError::SchemaStore { path, source })?;
            }
        }
        tracing::info!(root = %store.root.display(), "unpacked schemas");
        Ok(store)
    }

    /// Use schemas previously unpacked below `root`
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn family_dir(&self, family: SchemaFamily) -> PathBuf {
        self.root.join(family.dir_name())
    }

    /// Path where the schema for `gvk` would live
    pub fn schema_path(&self, family: SchemaFamily, gvk: &GroupVersionKind) -> PathBuf {
        self.family_dir(family).join(schema_file_name(gvk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_file_name() {
        assert_eq!(
            schema_file_name(&GroupVersionKind::parse("apps/v1", "Deployment")),
            "deployment-apps-v1.json"
        );
        assert_eq!(
            schema_file_name(&GroupVersionKind::parse("v1", "ConfigMap")),
            "configmap-v1.json"
        );
        assert_eq!(
            schema_file_name(&GroupVersionKind::parse("networking.k8s.io/v1", "Ingress")),
            "ingress-networking-v1.json"
        );
        assert_eq!(
            schema_file_name(&GroupVersionKind::parse("troubleshoot.sh/v1beta2", "SupportBundle")),
            "supportbundle-troubleshoot-v1beta2.json"
        );
    }

    #[test]
    fn test_embedded_schemas_parse() {
        for (name, content) in KUBERNETES_SCHEMAS.iter().chain(TROUBLESHOOT_SCHEMAS) {
            let value: serde_json::Value = serde_json::from_str(content).unwrap();
            assert!(value.get("properties").is_some(), "{name}");
        }
    }

    #[test]
    fn test_unpack() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::unpack(dir.path()).unwrap();
        let path = store.schema_path(
            SchemaFamily::Kubernetes,
            &GroupVersionKind::parse("apps/v1", "Deployment"),
        );
        assert!(path.is_file());
        assert!(store
            .schema_path(
                SchemaFamily::Troubleshoot,
                &GroupVersionKind::parse("troubleshoot.sh/v1beta2", "Preflight"),
            )
            .is_file());
    }
}
