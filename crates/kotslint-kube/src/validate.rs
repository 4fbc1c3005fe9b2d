//! Strict schema validation of rendered documents
//!
//! Findings are reported as `warn` diagnostics whose rule id names the
//! failed keyword (`invalid_type`, `required`, ...). Positions resolve
//! against the original file by YAML path.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};

use kotslint_core::kinds::{
    APP_GROUP, EMBEDDED_CLUSTER_GROUP, KOTS_GROUP, KURL_GROUPS, TROUBLESHOOT_GROUPS,
};
use kotslint_core::position::{line_for_doc_index, line_for_yaml_path};
use kotslint_core::{DocumentView, GroupVersionKind, LintExpression};
use serde_json::Value as JsonValue;

use crate::schema::{SchemaFamily, SchemaStore};

/// Groups whose kinds are never validated against Kubernetes schemas
const NON_KUBERNETES_GROUPS: &[&str] = &[KOTS_GROUP, EMBEDDED_CLUSTER_GROUP, APP_GROUP];

struct CompiledSchema {
    validator: jsonschema::Validator,
    raw: JsonValue,
}

/// Validates documents against one schema family of a store
pub struct SchemaValidator {
    store: SchemaStore,
    family: SchemaFamily,
    compiled: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaValidator {
    pub fn new(store: SchemaStore, family: SchemaFamily) -> Self {
        Self {
            store,
            family,
            compiled: RwLock::new(HashMap::new()),
        }
    }

    pub fn family(&self) -> SchemaFamily {
        self.family
    }

    /// Whether a document of this kind is checked by this family
    fn applies_to(&self, gvk: &GroupVersionKind) -> bool {
        match self.family {
            SchemaFamily::Kubernetes => {
                !(gvk.in_groups(NON_KUBERNETES_GROUPS)
                    || gvk.in_groups(KURL_GROUPS)
                    || gvk.in_groups(TROUBLESHOOT_GROUPS))
            }
            SchemaFamily::Troubleshoot => true,
        }
    }

    /// Validate one rendered document. `original` is the content of the
    /// file the document was split from.
    pub fn validate_view(&self, view: &DocumentView, original: &str) -> Vec<LintExpression> {
        let Some(gvk) = GroupVersionKind::of_view(view) else {
            return Vec::new();
        };
        if gvk.kind.is_empty() || gvk.version.is_empty() || !self.applies_to(&gvk) {
            return Vec::new();
        }

        let schema_path = self.store.schema_path(self.family, &gvk);
        let schema = match self.load(&schema_path) {
            Ok(schema) => schema,
            Err(SchemaLoadError::NotFound) => {
                return vec![
                    LintExpression::warn(
                        "kubeval-schema-not-found",
                        format!(
                            "We currently have no matching schema to lint this type of file ({} {})",
                            gvk.api_version(),
                            gvk.kind
                        ),
                    )
                    .with_path(&view.path)
                    .with_line(line_for_doc_index(original, view.doc_index)),
                ];
            }
            Err(SchemaLoadError::Invalid(message)) => {
                return vec![
                    LintExpression::error("kubeval-error", message)
                        .with_path(&view.path)
                        .with_line(line_for_doc_index(original, view.doc_index)),
                ];
            }
        };

        let instance: JsonValue = match serde_yaml::from_str(&view.content) {
            Ok(instance) => instance,
            Err(e) => {
                return vec![
                    LintExpression::error("kubeval-error", e.to_string())
                        .with_path(&view.path)
                        .with_line(line_for_doc_index(original, view.doc_index)),
                ];
            }
        };

        let mut findings: Vec<LintExpression> = schema
            .validator
            .iter_errors(&instance)
            .map(|error| {
                let instance_path = error.instance_path.to_string();
                let keyword_path = error.schema_path.to_string();
                let finding = describe(&schema.raw, &keyword_path, &error.instance);
                let field = dotted(&instance_path);
                let line = if field.is_empty() {
                    line_for_doc_index(original, view.doc_index)
                } else {
                    line_for_yaml_path(original, view.doc_index, &field)
                };
                LintExpression::warn(finding.rule, finding.message)
                    .with_path(&view.path)
                    .with_line(line)
            })
            .collect();

        findings.sort_by_key(|f| f.line());
        tracing::debug!(
            path = %view.path,
            kind = %gvk.kind,
            findings = findings.len(),
            "validated document"
        );
        findings
    }

    fn load(&self, path: &Path) -> Result<Arc<CompiledSchema>, SchemaLoadError> {
        let key = path.to_string_lossy().into_owned();
        if let Ok(cache) = self.compiled.read() {
            if let Some(compiled) = cache.get(&key) {
                return Ok(Arc::clone(compiled));
            }
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SchemaLoadError::NotFound);
            }
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "unreadable schema");
                return Err(SchemaLoadError::Invalid(format!("failed to read schema: {e}")));
            }
        };
        let raw: JsonValue = serde_json::from_str(&content).map_err(|e| {
            tracing::warn!(path = %key, error = %e, "malformed schema");
            SchemaLoadError::Invalid(format!("failed to parse schema: {e}"))
        })?;
        let validator = jsonschema::validator_for(&raw).map_err(|e| {
            tracing::warn!(path = %key, error = %e, "invalid schema");
            SchemaLoadError::Invalid(format!("failed to compile schema: {e}"))
        })?;

        let compiled = Arc::new(CompiledSchema { validator, raw });
        if let Ok(mut cache) = self.compiled.write() {
            cache.insert(key, Arc::clone(&compiled));
        }
        Ok(compiled)
    }
}

/// Why a schema could not be loaded
enum SchemaLoadError {
    /// No schema exists for the kind
    NotFound,
    /// The schema exists but cannot be read or compiled
    Invalid(String),
}

struct Finding {
    rule: &'static str,
    message: String,
}

/// Turn a JSON pointer into a dotted YAML path
fn dotted(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// JSON type name of an instance
fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn plain(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rule id and message for a failed keyword, read from the schema itself
fn describe(schema: &JsonValue, keyword_path: &str, instance: &JsonValue) -> Finding {
    let keyword = keyword_path.rsplit('/').next().unwrap_or_default();
    let constraint = schema.pointer(keyword_path).unwrap_or(&JsonValue::Null);
    let parent = keyword_path
        .rsplit_once('/')
        .and_then(|(parent, _)| schema.pointer(parent))
        .unwrap_or(&JsonValue::Null);

    match keyword {
        "type" => {
            let expected = match constraint {
                JsonValue::Array(types) => format!(
                    "[{}]",
                    types.iter().map(plain).collect::<Vec<_>>().join(",")
                ),
                other => plain(other),
            };
            Finding {
                rule: "invalid_type",
                message: format!(
                    "Invalid type. Expected: {expected}, given: {}",
                    type_name(instance)
                ),
            }
        }
        "required" => {
            let missing = constraint
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(JsonValue::as_str)
                .find(|key| instance.get(key).is_none())
                .unwrap_or("property");
            Finding {
                rule: "required",
                message: format!("{missing} is required"),
            }
        }
        "additionalProperties" => {
            let known = parent.get("properties");
            let unexpected = instance
                .as_object()
                .into_iter()
                .flat_map(|map| map.keys())
                .find(|key| known.and_then(|p| p.get(key.as_str())).is_none())
                .map_or_else(String::new, |key| key.clone());
            Finding {
                rule: "additional_property_not_allowed",
                message: format!("Additional property {unexpected} is not allowed"),
            }
        }
        "enum" => {
            let allowed = constraint
                .as_array()
                .into_iter()
                .flatten()
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Finding {
                rule: "enum",
                message: format!("must be one of the following: {allowed}"),
            }
        }
        "pattern" => Finding {
            rule: "pattern",
            message: format!("Does not match pattern '{}'", plain(constraint)),
        },
        "format" => Finding {
            rule: "format",
            message: format!("Does not match format '{}'", plain(constraint)),
        },
        "minimum" | "exclusiveMinimum" => Finding {
            rule: "number_gte",
            message: format!("Must be greater than or equal to {}", plain(constraint)),
        },
        "maximum" | "exclusiveMaximum" => Finding {
            rule: "number_lte",
            message: format!("Must be less than or equal to {}", plain(constraint)),
        },
        "minLength" => Finding {
            rule: "string_gte",
            message: format!(
                "String length must be greater than or equal to {}",
                plain(constraint)
            ),
        },
        "maxLength" => Finding {
            rule: "string_lte",
            message: format!(
                "String length must be less than or equal to {}",
                plain(constraint)
            ),
        },
        "minItems" => Finding {
            rule: "array_min_items",
            message: format!("Array must have at least {} items", plain(constraint)),
        },
        "maxItems" => Finding {
            rule: "array_max_items",
            message: format!("Array must have at most {} items", plain(constraint)),
        },
        other => Finding {
            rule: "kubeval-error",
            message: format!("Failed validation of keyword {other}"),
        },
    }
}
