//! Release files as submitted by the author
//!
//! A release arrives as a tree of [`File`]s. Interior nodes group other files
//! (for example the members of a directory); only leaves carry content that
//! the linter looks at. Every derived view keeps the leaf's `path`, which is
//! what lets diagnostics point back into the author's original text.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// An author-supplied YAML file or chart archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Basename of the file
    #[serde(default)]
    pub name: String,

    /// Release-relative path, unique across the flattened set
    #[serde(default)]
    pub path: String,

    /// Verbatim content; archives are base64-encoded
    #[serde(default)]
    pub content: String,

    /// Document index, zero for original files
    #[serde(default)]
    pub doc_index: usize,

    /// Nested grouping of files
    #[serde(default)]
    pub children: Vec<File>,
}

impl File {
    /// Create a leaf file
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            name,
            path,
            content: content.into(),
            doc_index: 0,
            children: Vec::new(),
        }
    }

    /// Whether the file is a YAML manifest, judged by extension
    pub fn is_yaml(&self) -> bool {
        is_yaml_path(&self.path)
    }

    /// Whether the file is a gzipped tarball (a chart archive)
    pub fn is_tar_gz(&self) -> bool {
        is_tar_gz_path(&self.path)
    }

    /// Raw archive bytes.
    ///
    /// Archives travel base64-encoded inside `content`; content that is not
    /// valid base64 is taken as the raw bytes.
    pub fn archive_bytes(&self) -> Vec<u8> {
        let trimmed: String = self.content.split_whitespace().collect();
        base64::engine::general_purpose::STANDARD
            .decode(trimmed.as_bytes())
            .unwrap_or_else(|_| self.content.as_bytes().to_vec())
    }

    /// Number of lines in the content (at least one)
    pub fn line_count(&self) -> usize {
        self.content.lines().count().max(1)
    }
}

pub fn is_yaml_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".yaml") || lower.ends_with(".yml")
}

pub fn is_tar_gz_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".tgz") || lower.ends_with(".tar.gz")
}

/// Flatten a file tree into its leaves, depth first.
///
/// Interior files with children are replaced by their descendants; sibling
/// order is preserved.
pub fn flatten(files: &[File]) -> Vec<File> {
    let mut leaves = Vec::new();
    for file in files {
        flatten_into(file, &mut leaves);
    }
    leaves
}

fn flatten_into(file: &File, leaves: &mut Vec<File>) {
    if file.children.is_empty() {
        leaves.push(file.clone());
        return;
    }
    for child in &file.children {
        flatten_into(child, leaves);
    }
}

/// Look up a file of the flat set by path
pub fn get_file<'a>(files: &'a [File], path: &str) -> Result<&'a File> {
    files
        .iter()
        .find(|f| f.path == path)
        .ok_or_else(|| CoreError::FileNotFound {
            path: path.to_string(),
        })
}

/// Split a flat set into (YAML manifests, chart archives); other files are dropped
pub fn partition(files: &[File]) -> (Vec<File>, Vec<File>) {
    let yaml = files.iter().filter(|f| f.is_yaml()).cloned().collect();
    let archives = files.iter().filter(|f| f.is_tar_gz()).cloned().collect();
    (yaml, archives)
}
