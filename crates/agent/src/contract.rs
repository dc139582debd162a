//! Decision Contract Validator.
//!
//! Oracle output is untrusted. [`DecisionValidator::check`] turns an
//! arbitrary JSON value into a well-formed [`Decision`] or reports
//! `DecisionMalformed`; [`DecisionValidator::validate`] is the total variant
//! that answers every failure with [`Decision::fallback`]. Both accept the
//! oracle's snake_case keys (`tool_args`, `missing_fields`) as well as the
//! camelCase wire names.

use std::collections::{BTreeSet, HashSet};

use fleetchat_core::domain::component::Component;
use fleetchat_core::domain::decision::{Decision, Intent};
use fleetchat_core::errors::TurnError;
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedDecision {
    pub decision: Decision,
    /// Non-fatal repairs and observations.
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DecisionValidator {
    known_tools: BTreeSet<String>,
}

impl DecisionValidator {
    pub fn new<I, S>(known_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { known_tools: known_tools.into_iter().map(Into::into).collect() }
    }

    /// Total: never fails, never panics.
    pub fn validate(&self, raw: &Value) -> ValidatedDecision {
        match self.check(raw) {
            Ok(validated) => validated,
            Err(error) => {
                warn!(
                    event_name = "agent.contract.fallback",
                    error = %error,
                    "oracle output failed contract validation"
                );
                ValidatedDecision { decision: Decision::fallback(), warnings: vec![error.to_string()] }
            }
        }
    }

    pub fn check(&self, raw: &Value) -> Result<ValidatedDecision, TurnError> {
        let object = raw.as_object().ok_or_else(|| {
            TurnError::DecisionMalformed(format!("expected a JSON object, found {}", kind_of(raw)))
        })?;

        let message = object
            .get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .ok_or_else(|| {
                TurnError::DecisionMalformed("`message` must be a non-empty string".to_string())
            })?;

        let mut warnings = Vec::new();

        let intent = match object.get("intent") {
            None | Some(Value::Null) => Intent::General,
            Some(Value::String(raw_intent)) => Intent::parse(raw_intent).unwrap_or_else(|| {
                warnings.push(format!("unrecognized intent `{raw_intent}` treated as general"));
                Intent::General
            }),
            Some(other) => {
                warnings.push(format!("intent of type {} treated as general", kind_of(other)));
                Intent::General
            }
        };

        let tool = match object.get("tool") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) if name.trim().is_empty() => None,
            Some(Value::String(name)) => {
                let name = name.trim().to_string();
                if !self.known_tools.contains(&name) {
                    warnings.push(format!("tool `{name}` is not registered"));
                }
                Some(name)
            }
            Some(other) => {
                warnings.push(format!("tool of type {} ignored", kind_of(other)));
                None
            }
        };

        let tool_args = match field(object, "toolArgs", "tool_args") {
            None | Some(Value::Null) => None,
            Some(Value::Object(args)) => Some(args.clone()),
            Some(other) => {
                warnings.push(format!("toolArgs of type {} ignored", kind_of(other)));
                None
            }
        };

        let missing_fields = match field(object, "missingFields", "missing_fields") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => ordered_names(entries, &mut warnings),
            Some(other) => {
                warnings.push(format!("missingFields of type {} ignored", kind_of(other)));
                Vec::new()
            }
        };

        let components = match object.get("components") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => well_formed_components(entries, &mut warnings),
            Some(other) => {
                warnings.push(format!("components of type {} ignored", kind_of(other)));
                Vec::new()
            }
        };

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_default()
            .to_string();

        let decision = Decision {
            id,
            message: message.to_string(),
            intent,
            tool,
            tool_args,
            missing_fields,
            components,
            tool_result: None,
        };

        Ok(ValidatedDecision { decision, warnings })
    }

    pub fn is_registered(&self, tool: &str) -> bool {
        self.known_tools.contains(tool)
    }
}

/// Parses oracle text. Anything that is not JSON becomes a JSON string so it
/// still flows through the contract (and fails it).
pub fn parse_raw(raw: &str) -> Value {
    let trimmed = strip_code_fence(raw.trim());
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn field<'a>(object: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    object.get(camel).or_else(|| object.get(snake))
}

fn ordered_names(entries: &[Value], warnings: &mut Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for entry in entries {
        match entry.as_str().map(str::trim) {
            Some(name) if !name.is_empty() => {
                if seen.insert(name.to_string()) {
                    names.push(name.to_string());
                }
            }
            _ => warnings.push("non-string missingFields entry dropped".to_string()),
        }
    }
    names
}

/// Keeps each top-level tree that parses, is well-formed on its own and does
/// not reuse an id already taken by an earlier tree.
fn well_formed_components(entries: &[Value], warnings: &mut Vec<String>) -> Vec<Component> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut components = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let component = match serde_json::from_value::<Component>(entry.clone()) {
            Ok(component) => component,
            Err(error) => {
                warnings.push(format!("component #{index} dropped: {error}"));
                continue;
            }
        };

        match component.check() {
            Ok(report) => warnings.extend(report.warnings),
            Err(error) => {
                warnings.push(format!("component #{index} dropped: {error}"));
                continue;
            }
        }

        let mut ids = Vec::new();
        collect_ids(&component, &mut ids);
        if let Some(duplicate) = ids.iter().find(|id| taken.contains(id.as_str())) {
            warnings.push(format!("component #{index} dropped: id `{duplicate}` already used"));
            continue;
        }
        taken.extend(ids);
        components.push(component);
    }

    components
}

fn collect_ids(component: &Component, ids: &mut Vec<String>) {
    ids.push(component.id.clone());
    for child in component.children() {
        collect_ids(child, ids);
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
