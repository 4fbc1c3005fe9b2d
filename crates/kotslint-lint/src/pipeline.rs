//! Stage orchestration
//!
//! [`Linter`] runs the stages of each entry point in a fixed order. A gating
//! stage that reports at least one error ends the run: the diagnostics so far
//! are returned with `is_linting_complete = false`.
//!
//! The full release pipeline:
//!
//! 1. YAML well-formedness (gate)
//! 2. pre-render rules (gate)
//! 3. render (gate)
//! 4. chart archive cross-check (gate)
//! 5. release versions (gate)
//! 6. annotations (gate)
//! 7. post-render rules (gate)
//! 8. schema validation
//! 9. installer lint

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use kotslint_core::{
    DocumentView, File, LintExpression, flatten, has_errors, partition, sort_lint_expressions,
    split_all, split_lenient,
};
use kotslint_kube::{
    InstallerLinter, KurlLinter, SchemaFamily, SchemaStore, SchemaValidator, lint_helm_charts,
};
use kotslint_repo::ReleaseIndex;

use crate::error::Result;
use crate::policy::{
    PolicyEngine, PolicyModule, RuleContext, RuleSet, TemplatePolicy,
    findings_to_lint_expressions,
};
use crate::stages::{self, check_cancelled};
use crate::yaml::lint_yaml;

/// Path given to the spec of a troubleshoot lint request
pub const TROUBLESHOOT_SPEC_PATH: &str = "spec.yaml";

/// Outcome of a lint request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintResult {
    pub lint_expressions: Vec<LintExpression>,
    /// False when a gating stage stopped the run
    pub is_linting_complete: bool,
}

/// Diagnostics accumulated across the stages of one run
#[derive(Default)]
struct Run {
    lint_expressions: Vec<LintExpression>,
}

impl Run {
    /// Record a stage's output; true when the stage gates the run
    fn gate(&mut self, stage: &str, output: Vec<LintExpression>) -> bool {
        let gated = has_errors(&output);
        self.record(stage, output, gated);
        gated
    }

    /// Record the output of a stage that never gates
    fn add(&mut self, stage: &str, output: Vec<LintExpression>) {
        self.record(stage, output, false);
    }

    fn record(&mut self, stage: &str, mut output: Vec<LintExpression>, gated: bool) {
        sort_lint_expressions(&mut output);
        tracing::debug!(stage, count = output.len(), gated, "stage finished");
        self.lint_expressions.extend(output);
    }

    fn finish(self, complete: bool) -> LintResult {
        LintResult {
            lint_expressions: self.lint_expressions,
            is_linting_complete: complete,
        }
    }
}

/// Runs lint pipelines. Build once and share between requests.
pub struct Linter {
    pre_render: RuleSet,
    post_render: RuleSet,
    builders: RuleSet,
    kubernetes: SchemaValidator,
    troubleshoot: SchemaValidator,
    release_index: Option<ReleaseIndex>,
    installer: Box<dyn InstallerLinter>,
}

impl Linter {
    /// Create a linter validating against schemas in `store`
    pub fn new(store: SchemaStore) -> Self {
        Self {
            pre_render: RuleSet::pre_render(),
            post_render: RuleSet::post_render(),
            builders: RuleSet::builders(),
            kubernetes: SchemaValidator::new(store.clone(), SchemaFamily::Kubernetes),
            troubleshoot: SchemaValidator::new(store, SchemaFamily::Troubleshoot),
            release_index: None,
            installer: Box::new(KurlLinter),
        }
    }

    /// Check declared release versions against `index`. Without an index
    /// the version stage is skipped.
    pub fn with_release_index(mut self, index: ReleaseIndex) -> Self {
        self.release_index = Some(index);
        self
    }

    pub fn with_installer_linter(mut self, linter: Box<dyn InstallerLinter>) -> Self {
        self.installer = linter;
        self
    }

    /// Lint a complete release
    pub async fn lint_release(
        &self,
        files: &[File],
        cancel: &CancellationToken,
    ) -> Result<LintResult> {
        let files = flatten(files);
        let (yaml_files, _) = partition(&files);
        let mut run = Run::default();

        check_cancelled(cancel)?;
        if run.gate("yaml", lint_yaml(&files)) {
            return Ok(run.finish(false));
        }

        let (views, _) = split_all(&yaml_files);

        check_cancelled(cancel)?;
        let findings = self.pre_render.evaluate(&views)?;
        if run.gate("pre-render", findings_to_lint_expressions(findings, &files)) {
            return Ok(run.finish(false));
        }

        let rendered = stages::render(&files, &views, cancel)?;
        if run.gate("render", rendered.lint_expressions) {
            return Ok(run.finish(false));
        }
        let rendered = rendered.views;

        check_cancelled(cancel)?;
        if run.gate("helm", lint_helm_charts(&files, &rendered)) {
            return Ok(run.finish(false));
        }

        if let Some(index) = &self.release_index {
            let versions = stages::lint_versions(index, &files, &rendered, cancel).await?;
            if run.gate("versions", versions) {
                return Ok(run.finish(false));
            }
        }

        check_cancelled(cancel)?;
        if run.gate("annotations", stages::annotations(&files, &rendered)) {
            return Ok(run.finish(false));
        }

        check_cancelled(cancel)?;
        let ctx = RuleContext::new(&rendered).with_sources(&views);
        let findings = self.post_render.evaluate_context(&ctx);
        if run.gate("post-render", findings_to_lint_expressions(findings, &files)) {
            return Ok(run.finish(false));
        }

        run.add(
            "schema",
            stages::schemas(&self.kubernetes, &files, &rendered, cancel)?,
        );

        check_cancelled(cancel)?;
        run.add(
            "installer",
            stages::installers(self.installer.as_ref(), &files, &rendered),
        );

        Ok(run.finish(true))
    }

    /// Lint a raw troubleshoot spec (support bundle, preflight, ...)
    pub fn lint_troubleshoot(&self, spec: &str, cancel: &CancellationToken) -> Result<LintResult> {
        let files = vec![File::new(TROUBLESHOOT_SPEC_PATH, spec)];
        let mut run = Run::default();

        check_cancelled(cancel)?;
        if run.gate("yaml", lint_yaml(&files)) {
            return Ok(run.finish(false));
        }

        let views: Vec<DocumentView> = files.iter().flat_map(split_lenient).collect();
        run.add(
            "schema",
            stages::schemas(&self.troubleshoot, &files, &views, cancel)?,
        );

        Ok(run.finish(true))
    }

    /// Render a release and evaluate caller-supplied policies over it.
    ///
    /// Every policy is compiled before anything is linted, so a policy that
    /// does not compile fails the request.
    pub fn lint_enterprise(
        &self,
        files: &[File],
        policies: &[PolicyModule],
        cancel: &CancellationToken,
    ) -> Result<LintResult> {
        let compiled = policies
            .iter()
            .map(TemplatePolicy::compile)
            .collect::<Result<Vec<_>>>()?;

        let files = flatten(files);
        let (yaml_files, _) = partition(&files);
        let mut run = Run::default();

        let (views, invalid) = split_all(&yaml_files);
        if run.gate("yaml", invalid) {
            return Ok(run.finish(false));
        }

        let rendered = stages::render(&files, &views, cancel)?;
        if run.gate("render", rendered.lint_expressions) {
            return Ok(run.finish(false));
        }

        for policy in &compiled {
            check_cancelled(cancel)?;
            let findings = policy.evaluate(&rendered.views)?;
            run.add(policy.name(), findings_to_lint_expressions(findings, &files));
        }

        Ok(run.finish(true))
    }

    /// Lint chart files extracted from builder archives
    pub fn lint_builders(&self, files: &[File], cancel: &CancellationToken) -> Result<LintResult> {
        let files = flatten(files);
        let mut run = Run::default();

        let mut views = Vec::new();
        for file in files.iter().filter(|f| f.is_yaml()) {
            check_cancelled(cancel)?;
            views.extend(split_lenient(file));
        }

        let findings = self.builders.evaluate(&views)?;
        run.add("builders", findings_to_lint_expressions(findings, &files));

        Ok(run.finish(true))
    }
}
