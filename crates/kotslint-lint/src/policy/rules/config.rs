//! Rules over the kots Config spec
//!
//! Findings are positioned on item fields with paths of the form
//! `spec.groups.<g>.items.<i>.<field>`.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use kotslint_core::{ConfigSpec, DocumentView, LintType, ReleaseKind};
use kotslint_core::kinds::ConfigItem;

use super::spec::is_templated;
use super::{Rule, RuleContext};
use crate::policy::PolicyFinding;

pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(OptionNotFound),
        Box::new(InvalidType),
        Box::new(PasswordType),
        Box::new(InvalidRegexValidator),
        Box::new(RegexValidatorInvalidType),
        Box::new(WhenIsInvalid),
        Box::new(RepeatMissingTemplate),
        Box::new(RepeatMissingValuesByGroup),
        Box::new(OptionIsCircular),
    ]
}

const VALID_TYPES: &[&str] = &[
    "text",
    "label",
    "password",
    "file",
    "bool",
    "select_one",
    "select_many",
    "textarea",
    "heading",
    "radio",
    "dropdown",
];

const REGEX_VALIDATOR_TYPES: &[&str] = &["text", "textarea", "password", "file"];

/// `ConfigOption "name"` and its variants, capturing the option name
static OPTION_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"ConfigOption\w*\s+"([^"]+)""#).expect("valid config option reference regex")
});

/// Typed Config documents of the set
fn config_specs<'a>(ctx: &RuleContext<'a>) -> Vec<(&'a DocumentView, ConfigSpec)> {
    ctx.values()
        .filter(|(_, value)| ReleaseKind::of_value(value) == ReleaseKind::Config)
        .filter_map(|(view, value)| {
            serde_yaml::from_value::<ConfigSpec>(value.clone())
                .ok()
                .map(|spec| (view, spec))
        })
        .collect()
}

/// Every item with its YAML path prefix
fn items(spec: &ConfigSpec) -> impl Iterator<Item = (String, &ConfigItem)> {
    spec.spec.groups.iter().enumerate().flat_map(|(g, group)| {
        group
            .items
            .iter()
            .enumerate()
            .map(move |(i, item)| (format!("spec.groups.{g}.items.{i}"), item))
    })
}

/// Option names an expression refers to
fn references(text: &str) -> impl Iterator<Item = &str> {
    OPTION_REFERENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// `config-option-not-found`
pub struct OptionNotFound;

impl Rule for OptionNotFound {
    fn id(&self) -> &'static str {
        "config-option-not-found"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let specs = config_specs(ctx);
        if specs.is_empty() {
            return Vec::new();
        }
        let known: HashSet<String> = specs
            .iter()
            .flat_map(|(_, spec)| spec.option_names())
            .collect();

        let mut findings = Vec::new();
        for document in &ctx.documents {
            let mut seen = HashSet::new();
            for captures in OPTION_REFERENCE.captures_iter(&document.view.content) {
                let name = &captures[1];
                let text = &captures[0];
                if known.contains(name) || !seen.insert(text.to_string()) {
                    continue;
                }
                findings.push(
                    self.finding(format!("Config option \"{name}\" not found"))
                        .in_view(document.view)
                        .at_match(text),
                );
            }
        }
        findings
    }
}

/// `config-option-invalid-type`
pub struct InvalidType;

impl Rule for InvalidType {
    fn id(&self) -> &'static str {
        "config-option-invalid-type"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (field, item) in items(&spec) {
                if item.item_type.is_empty() || VALID_TYPES.contains(&item.item_type.as_str()) {
                    continue;
                }
                findings.push(
                    self.finding(format!(
                        "Config option \"{}\" has an invalid type \"{}\"",
                        item.name, item.item_type
                    ))
                    .in_view(view)
                    .at_field(format!("{field}.type")),
                );
            }
        }
        findings
    }
}

/// `config-option-password-type`
pub struct PasswordType;

impl Rule for PasswordType {
    fn id(&self) -> &'static str {
        "config-option-password-type"
    }

    fn lint_type(&self) -> LintType {
        LintType::Warn
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (field, item) in items(&spec) {
                let looks_like_password = item.name.to_lowercase().contains("password");
                if !looks_like_password || item.item_type == "password" {
                    continue;
                }
                findings.push(
                    self.finding(format!(
                        "Config option \"{}\" should have type \"password\"",
                        item.name
                    ))
                    .in_view(view)
                    .at_field(format!("{field}.name")),
                );
            }
        }
        findings
    }
}

/// `config-option-invalid-regex-validator`
pub struct InvalidRegexValidator;

impl Rule for InvalidRegexValidator {
    fn id(&self) -> &'static str {
        "config-option-invalid-regex-validator"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (field, item) in items(&spec) {
                let Some(validator) = item.validation.as_ref().and_then(|v| v.regex.as_ref())
                else {
                    continue;
                };
                if let Err(e) = Regex::new(&validator.pattern) {
                    tracing::debug!(option = %item.name, error = %e, "invalid regex validator");
                    findings.push(
                        self.finding(format!(
                            "Config option regex validator pattern \"{}\" is invalid",
                            validator.pattern
                        ))
                        .in_view(view)
                        .at_field(format!("{field}.validation.regex.pattern")),
                    );
                }
            }
        }
        findings
    }
}

/// `config-option-regex-validator-invalid-type`
pub struct RegexValidatorInvalidType;

impl Rule for RegexValidatorInvalidType {
    fn id(&self) -> &'static str {
        "config-option-regex-validator-invalid-type"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (field, item) in items(&spec) {
                let has_regex = item.validation.as_ref().is_some_and(|v| v.regex.is_some());
                if !has_regex || REGEX_VALIDATOR_TYPES.contains(&item.item_type.as_str()) {
                    continue;
                }
                findings.push(
                    self.finding(format!(
                        "Config option type should be one of [{}] with regex validator",
                        REGEX_VALIDATOR_TYPES.join(", ")
                    ))
                    .in_view(view)
                    .at_field(format!("{field}.validation")),
                );
            }
        }
        findings
    }
}

fn when_is_valid(when: &str) -> bool {
    matches!(when.trim(), "true" | "false") || is_templated(when)
}

/// `config-option-when-is-invalid`
pub struct WhenIsInvalid;

impl Rule for WhenIsInvalid {
    fn id(&self) -> &'static str {
        "config-option-when-is-invalid"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (g, group) in spec.spec.groups.iter().enumerate() {
                if let Some(when) = group.when.as_deref().filter(|w| !when_is_valid(w)) {
                    findings.push(
                        self.finding(format!("Invalid \"when\" expression: {when}"))
                            .in_view(view)
                            .at_field(format!("spec.groups.{g}.when")),
                    );
                }
            }
            for (field, item) in items(&spec) {
                if let Some(when) = item.when.as_deref().filter(|w| !when_is_valid(w)) {
                    findings.push(
                        self.finding(format!("Invalid \"when\" expression: {when}"))
                            .in_view(view)
                            .at_field(format!("{field}.when")),
                    );
                }
            }
        }
        findings
    }
}

/// `repeat-option-missing-template`
pub struct RepeatMissingTemplate;

impl Rule for RepeatMissingTemplate {
    fn id(&self) -> &'static str {
        "repeat-option-missing-template"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (field, item) in items(&spec) {
                if item.repeatable && item.templates.is_empty() {
                    findings.push(
                        self.finding("Repeatable Config option missing template target")
                            .in_view(view)
                            .at_field(format!("{field}.repeatable")),
                    );
                }
            }
        }
        findings
    }
}

/// `repeat-option-missing-valuesByGroup`
pub struct RepeatMissingValuesByGroup;

impl Rule for RepeatMissingValuesByGroup {
    fn id(&self) -> &'static str {
        "repeat-option-missing-valuesByGroup"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            for (field, item) in items(&spec) {
                if item.repeatable && item.values_by_group.is_empty() {
                    findings.push(
                        self.finding("Repeatable Config option missing valuesByGroup")
                            .in_view(view)
                            .at_field(format!("{field}.repeatable")),
                    );
                }
            }
        }
        findings
    }
}

/// `config-option-is-circular`
pub struct OptionIsCircular;

impl OptionIsCircular {
    /// Options reachable from `start` through default and value references
    /// that lead back to `start`
    fn is_circular(graph: &HashMap<&str, Vec<&str>>, start: &str) -> bool {
        let mut stack: Vec<&str> = graph.get(start).cloned().unwrap_or_default();
        let mut visited = HashSet::new();
        while let Some(name) = stack.pop() {
            if name == start {
                return true;
            }
            if visited.insert(name) {
                if let Some(next) = graph.get(name) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        false
    }
}

impl Rule for OptionIsCircular {
    fn id(&self) -> &'static str {
        "config-option-is-circular"
    }

    fn lint_type(&self) -> LintType {
        LintType::Error
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<PolicyFinding> {
        let mut findings = Vec::new();
        for (view, spec) in config_specs(ctx) {
            let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
            for item in spec.items() {
                let edges = graph.entry(item.name.as_str()).or_default();
                for text in [&item.default, &item.value].into_iter().flatten() {
                    edges.extend(references(text));
                }
            }

            for (field, item) in items(&spec) {
                if !Self::is_circular(&graph, &item.name) {
                    continue;
                }
                let self_reference = graph
                    .get(item.name.as_str())
                    .is_some_and(|edges| edges.contains(&item.name.as_str()));
                let message = if self_reference {
                    format!("Config option \"{}\" references itself", item.name)
                } else {
                    format!(
                        "Config option \"{}\" is part of a circular reference",
                        item.name
                    )
                };
                let refers_in_value = item
                    .value
                    .as_deref()
                    .is_some_and(|v| references(v).next().is_some());
                let target = if refers_in_value { "value" } else { "default" };
                findings.push(
                    self.finding(message)
                        .in_view(view)
                        .at_field(format!("{field}.{target}")),
                );
            }
        }
        findings
    }
}
