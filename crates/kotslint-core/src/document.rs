//! Splitting release files into YAML documents
//!
//! A multi-document file is decoded strictly (duplicate keys are errors) and
//! every document is re-encoded on its own. The resulting [`DocumentView`]
//! keeps the original `path` and a zero-based `doc_index`; it never gets a
//! derived path such as `file.yaml#1`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::file::File;
use crate::lint::LintExpression;

static LINE_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"line (\d+)(?: column \d+)?").expect("valid line hint regex"));

/// One YAML document of a release file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    /// Path of the originating file
    pub path: String,
    /// Basename of the originating file
    pub name: String,
    /// Zero-based index within the originating file
    pub doc_index: usize,
    /// Serialized content of this document
    pub content: String,
}

impl DocumentView {
    /// A view that is the whole file
    pub fn from_file(file: &File) -> Self {
        Self {
            path: file.path.clone(),
            name: file.name.clone(),
            doc_index: file.doc_index,
            content: file.content.clone(),
        }
    }

    /// Same coordinates, new content
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            path: self.path.clone(),
            name: self.name.clone(),
            doc_index: self.doc_index,
            content: content.into(),
        }
    }

    pub fn is_yaml(&self) -> bool {
        crate::file::is_yaml_path(&self.path)
    }

    /// Decode the content; `None` if it is not YAML
    pub fn value(&self) -> Option<serde_yaml::Value> {
        serde_yaml::from_str(&self.content).ok()
    }

    /// `(apiVersion, kind)` when the document is a mapping that declares them
    pub fn kind_info(&self) -> Option<(String, String)> {
        let value = self.value()?;
        let api_version = value.get("apiVersion")?.as_str()?.to_string();
        let kind = value.get("kind")?.as_str()?.to_string();
        Some((api_version, kind))
    }
}

/// A strict-decode failure with a best-effort line hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub message: String,
    pub line: Option<usize>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let line = extract_line_hint(&message);
        Self { message, line }
    }

    /// Error-severity lint expression positioned at the hint
    pub fn to_lint_expression(&self, rule: &str, path: &str) -> LintExpression {
        LintExpression::error(rule, self.message.clone())
            .with_path(path)
            .with_line(self.line)
    }
}

impl From<serde_yaml::Error> for DecodeError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Extract `N` from decoder messages of the form `... at line N column M`
pub fn extract_line_hint(message: &str) -> Option<usize> {
    LINE_HINT
        .captures_iter(message)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Split a file into documents.
///
/// Non-YAML files and YAML files with whitespace-only content produce a
/// single view equal to the file. Empty documents are not emitted but still
/// consume an index.
pub fn split(file: &File) -> Result<Vec<DocumentView>, DecodeError> {
    if !file.is_yaml() || file.content.trim().is_empty() {
        return Ok(vec![DocumentView::from_file(file)]);
    }

    let mut views = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(&file.content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let content = serde_yaml::to_string(&value)?;
        views.push(DocumentView {
            path: file.path.clone(),
            name: file.name.clone(),
            doc_index: index,
            content,
        });
    }

    Ok(views)
}

/// Like [`split`], but a file that fails to decode becomes a single view
pub fn split_lenient(file: &File) -> Vec<DocumentView> {
    split(file).unwrap_or_else(|_| vec![DocumentView::from_file(file)])
}

/// Split every file; the first decode failure per file is reported as an
/// `invalid-yaml` error and that file contributes no views
pub fn split_all(files: &[File]) -> (Vec<DocumentView>, Vec<LintExpression>) {
    let mut views = Vec::new();
    let mut errors = Vec::new();
    for file in files {
        match split(file) {
            Ok(v) => views.extend(v),
            Err(e) => errors.push(e.to_lint_expression("invalid-yaml", &file.path)),
        }
    }
    (views, errors)
}
