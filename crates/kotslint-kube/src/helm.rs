//! Cross-check of chart archives against HelmChart manifests

use std::collections::HashSet;

use kotslint_core::archive::read_chart_ref;
use kotslint_core::kinds::helm_chart_ref;
use kotslint_core::position::line_for_yaml_path;
use kotslint_core::{ChartRef, DocumentView, File, LintExpression, ReleaseKind};

/// Every HelmChart manifest needs an archive with the same name and version,
/// and every archive needs a manifest. `files` holds the flattened release
/// files and is used both for archives and for positions.
///
/// An archive whose chart cannot be read is reported as
/// `helm-archive-invalid` and left out of the cross-check.
pub fn lint_helm_charts(files: &[File], rendered: &[DocumentView]) -> Vec<LintExpression> {
    let mut findings = Vec::new();

    let mut archives = Vec::new();
    for file in files.iter().filter(|f| f.is_tar_gz()) {
        match read_chart_ref(&file.path, &file.archive_bytes()) {
            Ok(chart) => archives.push((file, chart)),
            Err(e) => {
                tracing::debug!(path = %file.path, error = %e, "unreadable chart archive");
                findings.push(
                    LintExpression::error(
                        "helm-archive-invalid",
                        format!("Could not read helm archive: {e}"),
                    )
                    .with_path(&file.path),
                );
            }
        }
    }

    let manifests: Vec<(&DocumentView, ChartRef)> = rendered
        .iter()
        .filter_map(|view| {
            let value = view.value()?;
            if ReleaseKind::of_value(&value) != ReleaseKind::HelmChart {
                return None;
            }
            let (name, version) = helm_chart_ref(&value)?;
            Some((view, ChartRef { name, version }))
        })
        .collect();

    let archived: HashSet<&ChartRef> = archives.iter().map(|(_, chart)| chart).collect();
    let declared: HashSet<&ChartRef> = manifests.iter().map(|(_, chart)| chart).collect();

    for (view, chart) in &manifests {
        if archived.contains(chart) {
            continue;
        }
        let line = files
            .iter()
            .find(|f| f.path == view.path)
            .and_then(|f| line_for_yaml_path(&f.content, view.doc_index, "spec.chart"));
        findings.push(
            LintExpression::error(
                "helm-archive-missing",
                format!(
                    "Could not find helm archive for chart '{}' version '{}'",
                    chart.name, chart.version
                ),
            )
            .with_path(&view.path)
            .with_line(line),
        );
    }

    for (file, chart) in &archives {
        if declared.contains(chart) {
            continue;
        }
        findings.push(
            LintExpression::error(
                "helm-chart-missing",
                format!(
                    "Could not find helm chart manifest for archive '{}' version '{}'",
                    chart.name, chart.version
                ),
            )
            .with_path(&file.path),
        );
    }

    tracing::debug!(
        archives = archives.len(),
        manifests = manifests.len(),
        findings = findings.len(),
        "cross-checked helm charts"
    );
    findings
}
