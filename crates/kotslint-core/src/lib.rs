//! kots-lint Core - Core types shared by every lint stage
//!
//! This crate provides the foundational types used throughout kots-lint:
//! - `File`: An author-supplied release file, possibly grouping children
//! - `DocumentView`: One YAML document split out of a release file
//! - `LintExpression`: The diagnostic every stage produces
//! - `position`: Mapping of rendered coordinates back to authoring lines
//! - `kinds`: Typed views of the release kinds the linter understands

pub mod archive;
pub mod document;
pub mod error;
pub mod file;
pub mod kinds;
pub mod lint;
pub mod position;

pub use archive::ChartRef;
pub use document::{DecodeError, DocumentView, split, split_all, split_lenient};
pub use error::{CoreError, Result};
pub use file::{File, flatten, get_file, partition};
pub use kinds::{ConfigSpec, GroupVersionKind, ReleaseKind};
pub use lint::{
    LintExpression, LintExpressionItemPosition, LintType, has_errors, sort_lint_expressions,
};
