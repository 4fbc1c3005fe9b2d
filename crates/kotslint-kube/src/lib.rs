//! kots-lint Kube - Kubernetes-facing lint stages
//!
//! This crate provides the stages that judge rendered documents as
//! Kubernetes resources:
//! - `schema`: embedded JSON schemas unpacked to an on-disk store
//! - `validate`: strict schema validation with stable rule ids
//! - `annotations`: kots phase and wait-for-properties annotations
//! - `helm`: chart archive and HelmChart manifest cross-check
//! - `installer`: cluster installer spec lint

pub mod annotations;
pub mod error;
pub mod helm;
pub mod installer;
pub mod schema;
pub mod validate;

pub use annotations::lint_annotations;
pub use error::{KubeError, Result};
pub use helm::lint_helm_charts;
pub use installer::{InstallerLintError, InstallerLinter, InstallerOutput, KurlLinter, lint_installer};
pub use schema::{KUBERNETES_VERSION, SchemaFamily, SchemaStore, schema_file_name};
pub use validate::SchemaValidator;
