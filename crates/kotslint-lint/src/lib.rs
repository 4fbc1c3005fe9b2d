//! kots-lint Lint - The lint pipeline
//!
//! This crate ties the stages together:
//! - `policy`: built-in rule queries and caller-supplied policy modules
//! - `yaml`: strict YAML well-formedness
//! - `stages`: render, versions, annotations, schema and installer stages
//! - `pipeline`: the [`Linter`] entry points and their gating order

pub mod error;
pub mod pipeline;
pub mod policy;
pub mod stages;
pub mod yaml;

pub use error::{LintError, Result};
pub use pipeline::{LintResult, Linter, TROUBLESHOOT_SPEC_PATH};
pub use policy::{
    PolicyEngine, PolicyFinding, PolicyModule, Rule, RuleSet, TemplatePolicy,
    findings_to_lint_expressions,
};
pub use tokio_util::sync::CancellationToken;
pub use yaml::lint_yaml;
