//! Recursive UI description returned to frontends.
//!
//! On the wire a component is a flat JSON object discriminated by `type`
//! (`{"id": "...", "type": "input", "label": "...", ...}`). In Rust it is a
//! [`Component`] carrying the attributes every node shares plus a
//! [`ComponentKind`] holding the per-type payload. Attributes that are not
//! part of the model are kept in [`Component::attributes`] and written back
//! unchanged, so an unrecognized `type` survives a round trip.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Delivery hint for a submitted form. Opaque to the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ColumnSpec")]
pub struct TableColumn {
    pub key: String,
    pub label: String,
}

impl TableColumn {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self { label: humanize(&key), key }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnSpec {
    Key(String),
    Full { key: String, label: Option<String> },
}

impl From<ColumnSpec> for TableColumn {
    fn from(value: ColumnSpec) -> Self {
        match value {
            ColumnSpec::Key(key) => Self::new(key),
            ColumnSpec::Full { key, label: Some(label) } => Self { key, label },
            ColumnSpec::Full { key, label: None } => Self::new(key),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ComponentKind {
    Form { children: Vec<Component>, api_config: Option<ApiConfig> },
    Input { input_type: Option<String> },
    Button { action: Option<String>, variant: Option<String> },
    Text { value: Option<String> },
    Table { columns: Vec<TableColumn>, rows: Vec<Map<String, Value>> },
    /// Coordinates are absent on a location picker.
    Map { latitude: Option<f64>, longitude: Option<f64> },
    List { items: Vec<Value>, children: Vec<Component> },
    Select { options: Vec<SelectOption> },
    Switch { default_value: Option<bool> },
    Date { date_type: Option<String> },
    /// A `type` the engine does not model. Kept so the frontend can decide.
    Unknown { type_name: String, children: Vec<Component> },
}

impl ComponentKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Form { .. } => "form",
            Self::Input { .. } => "input",
            Self::Button { .. } => "button",
            Self::Text { .. } => "text",
            Self::Table { .. } => "table",
            Self::Map { .. } => "map",
            Self::List { .. } => "list",
            Self::Select { .. } => "select",
            Self::Switch { .. } => "switch",
            Self::Date { .. } => "date",
            Self::Unknown { type_name, .. } => type_name,
        }
    }

    pub fn children(&self) -> &[Component] {
        match self {
            Self::Form { children, .. }
            | Self::List { children, .. }
            | Self::Unknown { children, .. } => children,
            _ => &[],
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawComponent", into = "RawComponent")]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    pub validation: Option<ValidationRule>,
    pub attributes: Map<String, Value>,
}

impl Component {
    pub fn new(id: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            placeholder: None,
            required: false,
            validation: None,
            attributes: Map::new(),
        }
    }

    pub fn text(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(id, ComponentKind::Text { value: Some(value.into()) })
    }

    pub fn table(
        id: impl Into<String>,
        columns: Vec<TableColumn>,
        rows: Vec<Map<String, Value>>,
    ) -> Self {
        Self::new(id, ComponentKind::Table { columns, rows })
    }

    pub fn map(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self::new(id, ComponentKind::Map { latitude: Some(latitude), longitude: Some(longitude) })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    pub fn children(&self) -> &[Component] {
        self.kind.children()
    }

    /// Checks this node and its descendants as one tree.
    pub fn check(&self) -> Result<TreeReport, ComponentError> {
        let mut seen = HashSet::new();
        let mut report = TreeReport::default();
        check_node(self, &mut seen, &mut report)?;
        Ok(report)
    }
}

/// Non-fatal findings from a well-formed tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeReport {
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("component is missing a non-empty `id`")]
    MissingId,
    #[error("component `{id}` is missing `type`")]
    MissingType { id: String },
    #[error("component id `{id}` appears more than once in the same tree")]
    DuplicateId { id: String },
    #[error("component `{id}` of type `{type_name}` cannot have children")]
    ChildrenOnLeaf { id: String, type_name: String },
    #[error("map component `{id}` has out-of-range coordinates")]
    CoordinatesOutOfRange { id: String },
    #[error("component `{id}` has invalid validation rule: {reason}")]
    InvalidValidation { id: String, reason: String },
}

fn check_node<'a>(
    node: &'a Component,
    seen: &mut HashSet<&'a str>,
    report: &mut TreeReport,
) -> Result<(), ComponentError> {
    if node.id.trim().is_empty() {
        return Err(ComponentError::MissingId);
    }
    if !seen.insert(node.id.as_str()) {
        return Err(ComponentError::DuplicateId { id: node.id.clone() });
    }

    if let Some(rule) = &node.validation {
        check_validation(node, rule)?;
    }

    match &node.kind {
        ComponentKind::Map { latitude, longitude } => {
            let in_range = latitude.map_or(true, |lat| (-90.0..=90.0).contains(&lat))
                && longitude.map_or(true, |lng| (-180.0..=180.0).contains(&lng));
            if !in_range {
                return Err(ComponentError::CoordinatesOutOfRange { id: node.id.clone() });
            }
        }
        ComponentKind::Unknown { type_name, .. } => {
            report
                .warnings
                .push(format!("component `{}` has unrecognized type `{type_name}`", node.id));
        }
        _ => {}
    }

    for child in node.children() {
        check_node(child, seen, report)?;
    }
    Ok(())
}

fn check_validation(node: &Component, rule: &ValidationRule) -> Result<(), ComponentError> {
    let invalid =
        |reason: &str| ComponentError::InvalidValidation { id: node.id.clone(), reason: reason.to_string() };

    if matches!(node.kind, ComponentKind::Input { .. }) && rule.min_length == Some(0) {
        return Err(invalid("minLength must be at least 1 on input fields"));
    }
    if let (Some(min), Some(max)) = (rule.min_length, rule.max_length) {
        if min > max {
            return Err(invalid("minLength exceeds maxLength"));
        }
    }
    if let Some(pattern) = &rule.pattern {
        if Regex::new(pattern).is_err() {
            return Err(invalid("pattern is not a valid regular expression"));
        }
    }
    Ok(())
}

/// `cab_model_name` -> `Cab Model Name`.
pub fn humanize(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<Component>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_config: Option<ApiConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<TableColumn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<Map<String, Value>>>,
    #[serde(default, alias = "lat", skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon", skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_type: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RawComponent {
    /// Moves payload fields the chosen kind did not consume into `attributes`.
    fn stash_leftovers(&mut self, attributes: &mut Map<String, Value>) {
        stash(attributes, "apiConfig", self.api_config.take());
        stash(attributes, "inputType", self.input_type.take());
        stash(attributes, "action", self.action.take());
        stash(attributes, "variant", self.variant.take());
        stash(attributes, "value", self.value.take());
        stash(attributes, "columns", self.columns.take());
        stash(attributes, "rows", self.rows.take());
        stash(attributes, "latitude", self.latitude.take());
        stash(attributes, "longitude", self.longitude.take());
        stash(attributes, "items", self.items.take());
        stash(attributes, "options", self.options.take());
        stash(attributes, "defaultValue", self.default_value.take());
        stash(attributes, "dateType", self.date_type.take());
    }
}

fn stash<T: Serialize>(attributes: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value.and_then(|value| serde_json::to_value(value).ok()) {
        attributes.insert(key.to_string(), value);
    }
}

fn text_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

impl TryFrom<RawComponent> for Component {
    type Error = ComponentError;

    fn try_from(mut raw: RawComponent) -> Result<Self, Self::Error> {
        let id = raw.id.take().filter(|id| !id.trim().is_empty()).ok_or(ComponentError::MissingId)?;
        let type_name =
            raw.kind.take().ok_or_else(|| ComponentError::MissingType { id: id.clone() })?;
        let children = raw.children.take().unwrap_or_default();

        let kind = match type_name.as_str() {
            "form" => ComponentKind::Form { children, api_config: raw.api_config.take() },
            "list" => ComponentKind::List { items: raw.items.take().unwrap_or_default(), children },
            known if !children.is_empty() && is_leaf_type(known) => {
                return Err(ComponentError::ChildrenOnLeaf { id, type_name: known.to_string() });
            }
            "input" => ComponentKind::Input { input_type: raw.input_type.take() },
            "button" => {
                ComponentKind::Button { action: raw.action.take(), variant: raw.variant.take() }
            }
            "text" => ComponentKind::Text { value: raw.value.take().map(text_value) },
            "table" => ComponentKind::Table {
                columns: raw.columns.take().unwrap_or_default(),
                rows: raw.rows.take().unwrap_or_default(),
            },
            "map" => ComponentKind::Map {
                latitude: raw.latitude.take(),
                longitude: raw.longitude.take(),
            },
            "select" => ComponentKind::Select { options: raw.options.take().unwrap_or_default() },
            "switch" => ComponentKind::Switch { default_value: raw.default_value.take() },
            "date" => ComponentKind::Date { date_type: raw.date_type.take() },
            _ => ComponentKind::Unknown { type_name: type_name.clone(), children },
        };

        let mut attributes = std::mem::take(&mut raw.extra);
        raw.stash_leftovers(&mut attributes);

        Ok(Self {
            id,
            kind,
            label: raw.label,
            placeholder: raw.placeholder,
            required: raw.required,
            validation: raw.validation,
            attributes,
        })
    }
}

fn is_leaf_type(type_name: &str) -> bool {
    matches!(
        type_name,
        "input" | "button" | "text" | "table" | "map" | "select" | "switch" | "date"
    )
}

impl From<Component> for RawComponent {
    fn from(component: Component) -> Self {
        let mut raw = RawComponent {
            id: Some(component.id),
            kind: Some(component.kind.type_name().to_string()),
            label: component.label,
            placeholder: component.placeholder,
            required: component.required,
            validation: component.validation,
            ..RawComponent::default()
        };

        match component.kind {
            ComponentKind::Form { children, api_config } => {
                raw.children = Some(children);
                raw.api_config = api_config;
            }
            ComponentKind::Input { input_type } => raw.input_type = input_type,
            ComponentKind::Button { action, variant } => {
                raw.action = action;
                raw.variant = variant;
            }
            ComponentKind::Text { value } => raw.value = value.map(Value::String),
            ComponentKind::Table { columns, rows } => {
                raw.columns = Some(columns);
                raw.rows = Some(rows);
            }
            ComponentKind::Map { latitude, longitude } => {
                raw.latitude = latitude;
                raw.longitude = longitude;
            }
            ComponentKind::List { items, children } => {
                raw.items = Some(items);
                raw.children = (!children.is_empty()).then_some(children);
            }
            ComponentKind::Select { options } => raw.options = Some(options),
            ComponentKind::Switch { default_value } => raw.default_value = default_value,
            ComponentKind::Date { date_type } => raw.date_type = date_type,
            ComponentKind::Unknown { children, .. } => {
                raw.children = (!children.is_empty()).then_some(children);
            }
        }

        // Stashed attributes never shadow modelled fields.
        raw.extra = component.attributes;
        for key in [
            "id", "type", "label", "placeholder", "required", "validation", "children",
        ] {
            raw.extra.remove(key);
        }
        raw
    }
}
