//! Pipeline stages wrapping the engine, kube and repo crates
//!
//! Every stage takes the flattened release files (for positions) and a
//! document set, and returns lint expressions positioned against the
//! author's original files.

use semver::Version;
use tokio_util::sync::CancellationToken;

use kotslint_core::kinds::string_at;
use kotslint_core::position::{line_for_doc_index, line_for_match, line_for_yaml_path};
use kotslint_core::{ConfigSpec, DocumentView, File, LintExpression, ReleaseKind};
use kotslint_engine::{EngineError, Renderer, locate_config};
use kotslint_kube::{InstallerLinter, SchemaValidator, lint_annotations, lint_installer};
use kotslint_repo::{Product, ReleaseIndex};

use crate::error::{LintError, Result};

/// Content of the original file at `path`
pub fn original<'a>(files: &'a [File], path: &str) -> &'a str {
    files
        .iter()
        .find(|f| f.path == path)
        .map_or("", |f| f.content.as_str())
}

/// Fail with [`LintError::Cancelled`] once the token fired
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(LintError::Cancelled)
    } else {
        Ok(())
    }
}

/// Rendered documents and the diagnostics of rendering
#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub views: Vec<DocumentView>,
    pub lint_expressions: Vec<LintExpression>,
}

/// Render every YAML document with the defaults of the release's Config.
///
/// A Config that does not decode into the typed schema is reported as
/// `config-is-invalid` and rendering continues with no option values.
pub fn render(
    files: &[File],
    views: &[DocumentView],
    cancel: &CancellationToken,
) -> Result<RenderOutcome> {
    let mut outcome = RenderOutcome::default();

    let config = match locate_config(views) {
        Some(view) => match ConfigSpec::from_yaml(&view.content) {
            Ok(spec) => Some(spec),
            Err(e) => {
                let line = line_for_doc_index(original(files, &view.path), view.doc_index);
                outcome.lint_expressions.push(
                    LintExpression::error("config-is-invalid", e.to_string())
                        .with_path(&view.path)
                        .with_line(line),
                );
                None
            }
        },
        None => None,
    };
    let renderer = Renderer::from_config(config.as_ref());

    for view in views.iter().filter(|v| v.is_yaml()) {
        check_cancelled(cancel)?;
        match renderer.render_view(view) {
            Ok(rendered) => outcome.views.push(rendered),
            Err(EngineError::Render(e)) => {
                let content = original(files, &view.path);
                let line = e
                    .match_text
                    .as_deref()
                    .and_then(|text| line_for_match(content, view.doc_index, text))
                    .or_else(|| line_for_doc_index(content, view.doc_index));
                outcome.lint_expressions.push(
                    LintExpression::error("unable-to-render", e.message)
                        .with_path(&view.path)
                        .with_line(line),
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(outcome)
}

/// A version field of a release manifest
struct VersionField {
    field: &'static str,
    product: Product,
    rule: &'static str,
    message: &'static str,
}

const APPLICATION_VERSIONS: &[VersionField] = &[
    VersionField {
        field: "spec.targetKotsVersion",
        product: Product::Kots,
        rule: "non-existent-target-kots-version",
        message: "Target KOTS version not found",
    },
    VersionField {
        field: "spec.minKotsVersion",
        product: Product::Kots,
        rule: "non-existent-min-kots-version",
        message: "Minimum KOTS version not found",
    },
];

const EMBEDDED_CLUSTER_VERSIONS: &[VersionField] = &[VersionField {
    field: "spec.version",
    product: Product::EmbeddedCluster,
    rule: "non-existent-embedded-cluster-version",
    message: "Embedded Cluster version not found",
}];

/// A declared release version and where it was declared
struct DeclaredVersion<'a> {
    view: &'a DocumentView,
    field: &'static VersionField,
    version: String,
}

fn declared_versions(views: &[DocumentView]) -> Vec<DeclaredVersion<'_>> {
    let mut declared = Vec::new();
    for view in views {
        let Some(value) = view.value() else {
            continue;
        };
        let fields = match ReleaseKind::of_value(&value) {
            ReleaseKind::Application => APPLICATION_VERSIONS,
            ReleaseKind::EmbeddedClusterConfig => EMBEDDED_CLUSTER_VERSIONS,
            _ => continue,
        };

        for field in fields {
            let Some(version) = string_at(&value, field.field) else {
                continue;
            };
            let version = version.trim().to_string();
            if Version::parse(version.trim_start_matches('v')).is_err() {
                continue;
            }
            declared.push(DeclaredVersion {
                view,
                field,
                version,
            });
        }
    }
    declared
}

/// Check that declared KOTS and embedded cluster versions were released.
///
/// Lookup failures are logged and skipped; only a definite "not found"
/// becomes a diagnostic.
pub async fn lint_versions(
    index: &ReleaseIndex,
    files: &[File],
    views: &[DocumentView],
    cancel: &CancellationToken,
) -> Result<Vec<LintExpression>> {
    let mut findings = Vec::new();

    for declared in declared_versions(views) {
        let exists = tokio::select! {
            _ = cancel.cancelled() => return Err(LintError::Cancelled),
            result = index.version_exists(declared.field.product, &declared.version) => result,
        };

        match exists {
            Ok(true) => {}
            Ok(false) => {
                let line = line_for_yaml_path(
                    original(files, &declared.view.path),
                    declared.view.doc_index,
                    declared.field.field,
                );
                findings.push(
                    LintExpression::error(declared.field.rule, declared.field.message)
                        .with_path(&declared.view.path)
                        .with_line(line),
                );
            }
            Err(e) => {
                tracing::warn!(
                    version = %declared.version,
                    product = declared.field.product.repository(),
                    error = %e,
                    "release version lookup failed"
                );
            }
        }
    }

    Ok(findings)
}

/// Phase and wait-for-properties annotations
pub fn annotations(files: &[File], views: &[DocumentView]) -> Vec<LintExpression> {
    views
        .iter()
        .flat_map(|view| lint_annotations(view, original(files, &view.path)))
        .collect()
}

/// Schema validation of every document against one family
pub fn schemas(
    validator: &SchemaValidator,
    files: &[File],
    views: &[DocumentView],
    cancel: &CancellationToken,
) -> Result<Vec<LintExpression>> {
    let mut findings = Vec::new();
    for view in views {
        check_cancelled(cancel)?;
        findings.extend(validator.validate_view(view, original(files, &view.path)));
    }
    Ok(findings)
}

/// Installer lint of every document
pub fn installers(
    linter: &dyn InstallerLinter,
    files: &[File],
    views: &[DocumentView],
) -> Vec<LintExpression> {
    views
        .iter()
        .flat_map(|view| lint_installer(linter, view, original(files, &view.path)))
        .collect()
}
