//! kots-lint Engine - repl template rendering
//!
//! This crate renders the `repl{{ }}` and `{{repl }}` directives found in
//! release files:
//! - A pest grammar and parser for the directive language
//! - Translation to MiniJinja with line structure preserved
//! - The kots template function catalog
//! - Render errors carrying the failing line and its text

pub mod error;
pub mod functions;
pub mod parser;
pub mod render;
pub mod suggestions;
pub mod translate;

pub use error::{EngineError, RenderError, Result};
pub use functions::function_names;
pub use render::{Renderer, locate_config, normalize_yaml};
