//! YAML well-formedness stage

use kotslint_core::{DecodeError, File, LintExpression, split};

/// Strictly decode every YAML file. Decoding of a file stops at its first
/// error, which is reported as one `invalid-yaml` error.
pub fn lint_yaml(files: &[File]) -> Vec<LintExpression> {
    files
        .iter()
        .filter(|file| file.is_yaml())
        .filter_map(|file| {
            split(file).err().map(|e: DecodeError| {
                tracing::debug!(path = %file.path, line = ?e.line, "invalid yaml");
                e.to_lint_expression("invalid-yaml", &file.path)
            })
        })
        .collect()
}
