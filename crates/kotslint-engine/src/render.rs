//! Rendering release documents

use std::sync::Arc;

use indexmap::IndexMap;
use kotslint_core::kinds::ReleaseKind;
use kotslint_core::{ConfigSpec, DocumentView, GroupVersionKind};
use minijinja::{AutoEscape, Environment, ErrorKind, context};

use crate::error::{EngineError, RenderError, Result};
use crate::functions::{self, function_names};
use crate::parser::{SyntaxError, parse};
use crate::translate::translate;

/// Round-trip YAML content through the decoder so long directives are not
/// split across lines by whatever produced the original text
pub fn normalize_yaml(content: &str) -> Result<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    Ok(serde_yaml::to_string(&value)?)
}

/// First document that is the release's configuration spec
pub fn locate_config(views: &[DocumentView]) -> Option<&DocumentView> {
    views.iter().find(|view| {
        GroupVersionKind::of_view(view)
            .is_some_and(|gvk| ReleaseKind::of(&gvk) == ReleaseKind::Config)
    })
}

/// Renders repl directives against a fixed set of configuration values
pub struct Renderer {
    env: Environment<'static>,
    functions: Vec<&'static str>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(IndexMap::new())
    }
}

impl Renderer {
    /// Create a renderer with explicit option values
    pub fn new(options: IndexMap<String, String>) -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        functions::register(&mut env, Arc::new(options));

        Self {
            env,
            functions: function_names(),
        }
    }

    /// Create a renderer whose options are the defaults of `config`
    pub fn from_config(config: Option<&ConfigSpec>) -> Self {
        Self::new(config.map(ConfigSpec::option_defaults).unwrap_or_default())
    }

    /// Render one template. `name` only appears in messages.
    pub fn render(&self, name: &str, content: &str) -> Result<String> {
        let nodes =
            parse(content, &self.functions).map_err(|e| syntax_error(name, content, e))?;
        let source = translate(&nodes);

        self.env
            .render_named_str(name, &source, context! {})
            .map_err(|e| runtime_error(name, content, e))
    }

    /// Normalize and render a document, keeping its coordinates
    pub fn render_view(&self, view: &DocumentView) -> Result<DocumentView> {
        let normalized = normalize_yaml(&view.content)?;
        let rendered = self.render(&view.path, &normalized)?;
        tracing::debug!(path = %view.path, doc_index = view.doc_index, "rendered document");
        Ok(view.with_content(rendered))
    }
}

fn syntax_error(name: &str, content: &str, e: SyntaxError) -> EngineError {
    let message = format!("template: {name}:{}: {}", e.line, e.message);
    RenderError::new(message).at_line(content, e.line).into()
}

fn runtime_error(name: &str, content: &str, e: minijinja::Error) -> EngineError {
    if e.kind() == ErrorKind::SyntaxError {
        return EngineError::Environment {
            message: e.to_string(),
        };
    }

    let detail = e.detail().map_or_else(|| e.to_string(), str::to_string);
    match e.line() {
        Some(line) => {
            let message = format!("template: {name}:{line}: {detail}");
            RenderError::new(message).at_line(content, line).into()
        }
        None => RenderError::new(format!("template: {name}: {detail}")).into(),
    }
}
