//! Built-in lint rules
//!
//! Rules are grouped by what they inspect:
//!
//! - `spec`: document shape and release-wide presence checks
//! - `config`: the kots Config spec and option references
//! - `workload`: containers, volumes and replicas of workloads
//! - `application`: the kots Application and HelmChart manifests
//!
//! A [`RuleSet`] is a prepared query: an ordered list of rules evaluated
//! together over one document set.

pub mod application;
pub mod config;
pub mod spec;
pub mod workload;

use std::collections::HashMap;

use kotslint_core::{DocumentView, LintType};
use serde_yaml::Value;

use super::{PolicyEngine, PolicyFinding};
use crate::error::Result;

/// A document decoded once for all rules
#[derive(Debug)]
pub struct Document<'a> {
    pub view: &'a DocumentView,
    /// `None` when the content is not a YAML mapping
    pub value: Option<Value>,
}

/// Everything a rule may look at
#[derive(Debug)]
pub struct RuleContext<'a> {
    pub documents: Vec<Document<'a>>,
    /// Documents before rendering, keyed by `(path, doc_index)`, when the
    /// rules run over rendered documents
    sources: HashMap<(&'a str, usize), &'a DocumentView>,
}

impl<'a> RuleContext<'a> {
    pub fn new(views: &'a [DocumentView]) -> Self {
        let documents = views
            .iter()
            .map(|view| Document {
                view,
                value: serde_yaml::from_str::<Value>(&view.content)
                    .ok()
                    .filter(Value::is_mapping),
            })
            .collect();
        Self {
            documents,
            sources: HashMap::new(),
        }
    }

    /// Attach the unrendered documents the rendered ones came from
    pub fn with_sources(mut self, sources: &'a [DocumentView]) -> Self {
        self.sources = sources
            .iter()
            .map(|view| ((view.path.as_str(), view.doc_index), view))
            .collect();
        self
    }

    /// Unrendered form of a document, or the document itself
    pub fn source_of(&self, view: &'a DocumentView) -> &'a DocumentView {
        self.sources
            .get(&(view.path.as_str(), view.doc_index))
            .copied()
            .unwrap_or(view)
    }

    /// Decoded documents only
    pub fn values(&self) -> impl Iterator<Item = (&'a DocumentView, &Value)> {
        self.documents
            .iter()
            .filter_map(|d| d.value.as_ref().map(|value| (d.view, value)))
    }
}

/// A lint rule
pub trait Rule: Send + Sync {
    /// Rule id reported in lint expressions
    fn id(&self) -> &'static str;

    fn lint_type(&self) -> LintType;

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding>;

    /// A finding of this rule
    fn finding(&self, message: impl Into<String>) -> PolicyFinding
    where
        Self: Sized,
    {
        PolicyFinding::new(self.id(), self.lint_type(), message)
    }
}

/// An ordered set of rules evaluated as one query
pub struct RuleSet {
    name: &'static str,
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(name: &'static str, rules: Vec<Box<dyn Rule>>) -> Self {
        Self { name, rules }
    }

    /// Rules run over split documents before rendering
    pub fn pre_render() -> Self {
        let mut rules = spec::pre_render_rules();
        rules.extend(config::rules());
        rules.extend(spec::content_rules());
        Self::new("pre-render", rules)
    }

    /// Rules run over rendered documents
    pub fn post_render() -> Self {
        let mut rules = spec::post_render_rules();
        rules.extend(workload::rules());
        rules.extend(application::rules());
        Self::new("post-render", rules)
    }

    /// Rules run over chart files extracted from archives
    pub fn builders() -> Self {
        let mut rules = spec::shape_rules();
        rules.extend(workload::rules());
        Self::new("builders", rules)
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Evaluate with a prepared context
    pub fn evaluate_context(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let order: HashMap<(&str, usize), usize> = ctx
            .documents
            .iter()
            .enumerate()
            .map(|(i, d)| ((d.view.path.as_str(), d.view.doc_index), i))
            .collect();

        let mut findings: Vec<(usize, PolicyFinding)> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check(ctx))
            .map(|finding| {
                let position = order
                    .get(&(finding.path.as_str(), finding.doc_index))
                    .copied()
                    .unwrap_or(usize::MAX);
                (position, finding)
            })
            .collect();

        findings.sort_by_key(|(position, _)| *position);
        findings.into_iter().map(|(_, finding)| finding).collect()
    }
}

impl PolicyEngine for RuleSet {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate(&self, views: &[DocumentView]) -> Result<Vec<PolicyFinding>> {
        Ok(self.evaluate_context(&RuleContext::new(views)))
    }
}

/// Read a value at a dot-separated path of keys and list indices
pub fn value_at<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(index) if current.is_sequence() => current.get(index)?,
            _ => current.get(segment)?,
        };
    }
    Some(current)
}

/// `kind` of a decoded document
pub fn kind_of(value: &Value) -> Option<&str> {
    value.get("kind").and_then(Value::as_str)
}
