use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fleetchat_core::errors::ToolError;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamType {
    Integer { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    String { min_len: Option<usize>, max_len: Option<usize> },
    Boolean,
}

impl ParamType {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::String { .. } => "string",
            Self::Boolean => "boolean",
        }
    }

    /// Human readable bound, e.g. `2-100 characters`.
    pub fn constraint(&self) -> Option<String> {
        match *self {
            Self::Integer { min: Some(min), max: Some(max) } => {
                Some(format!("between {min} and {max}"))
            }
            Self::Integer { min: Some(min), max: None } => Some(format!("at least {min}")),
            Self::Integer { min: None, max: Some(max) } => Some(format!("at most {max}")),
            Self::Float { min: Some(min), max: Some(max) } => {
                Some(format!("between {min} and {max}"))
            }
            Self::Float { min: Some(min), max: None } => Some(format!("at least {min}")),
            Self::Float { min: None, max: Some(max) } => Some(format!("at most {max}")),
            Self::String { min_len: Some(min), max_len: Some(max) } => {
                Some(format!("{min}-{max} characters"))
            }
            Self::String { min_len: Some(min), max_len: None } => {
                Some(format!("at least {min} characters"))
            }
            Self::String { min_len: None, max_len: Some(max) } => {
                Some(format!("at most {max} characters"))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self { name, param_type, required: true, description }
    }

    pub fn optional(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self { name, param_type, required: false, description }
    }
}

/// How a successful result is shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolPresentation {
    Listing,
    Location,
    Mutation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub presentation: ToolPresentation,
    pub mutating: bool,
    /// Optional parameters of which at least one must be supplied.
    pub requires_any: &'static [&'static str],
}

impl ToolDescriptor {
    /// Checks raw arguments against the declared parameters.
    ///
    /// Numeric strings are accepted for numeric parameters since form
    /// submissions arrive as text. Undeclared keys are dropped. The returned
    /// map holds only declared, typed values.
    pub fn validate_args(
        &self,
        raw: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, ToolError> {
        let empty = Map::new();
        let raw = raw.unwrap_or(&empty);
        let mut validated = Map::new();

        for spec in &self.params {
            match raw.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(self.invalid(spec, "is required"));
                    }
                }
                Some(value) => {
                    let checked = self.check_value(spec, value)?;
                    validated.insert(spec.name.to_string(), checked);
                }
            }
        }

        if !self.requires_any.is_empty()
            && !self.requires_any.iter().any(|name| validated.contains_key(*name))
        {
            return Err(ToolError::InvalidArgument {
                tool: self.name.to_string(),
                field: self.requires_any[0].to_string(),
                reason: format!("at least one of {} is required", self.requires_any.join(", ")),
            });
        }

        for key in raw.keys().filter(|key| !self.params.iter().any(|spec| spec.name == *key)) {
            debug!(
                event_name = "agent.tool.undeclared_argument_dropped",
                tool = self.name,
                argument = %key,
                "dropping undeclared tool argument"
            );
        }

        Ok(validated)
    }

    fn check_value(&self, spec: &ParamSpec, value: &Value) -> Result<Value, ToolError> {
        match spec.param_type {
            ParamType::Integer { min, max } => {
                let parsed = match value {
                    Value::Number(number) => number.as_i64().or_else(|| {
                        number.as_f64().filter(|float| float.fract() == 0.0).map(|float| float as i64)
                    }),
                    Value::String(text) => text.trim().parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| self.invalid(spec, "must be an integer"))?;

                if min.is_some_and(|min| parsed < min) || max.is_some_and(|max| parsed > max) {
                    return Err(self.out_of_range(spec));
                }
                Ok(Value::Number(parsed.into()))
            }
            ParamType::Float { min, max } => {
                let parsed = match value {
                    Value::Number(number) => number.as_f64(),
                    Value::String(text) => text.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|float| float.is_finite())
                .ok_or_else(|| self.invalid(spec, "must be a number"))?;

                if min.is_some_and(|min| parsed < min) || max.is_some_and(|max| parsed > max) {
                    return Err(self.out_of_range(spec));
                }
                Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| self.invalid(spec, "must be a number"))
            }
            ParamType::String { min_len, max_len } => {
                let text = value
                    .as_str()
                    .map(str::trim)
                    .ok_or_else(|| self.invalid(spec, "must be a string"))?;
                let length = text.chars().count();

                if min_len.is_some_and(|min| length < min)
                    || max_len.is_some_and(|max| length > max)
                {
                    return Err(self.out_of_range(spec));
                }
                Ok(Value::String(text.to_string()))
            }
            ParamType::Boolean => match value {
                Value::Bool(flag) => Ok(Value::Bool(*flag)),
                Value::String(text) => text
                    .trim()
                    .parse::<bool>()
                    .map(Value::Bool)
                    .map_err(|_| self.invalid(spec, "must be true or false")),
                _ => Err(self.invalid(spec, "must be true or false")),
            },
        }
    }

    fn out_of_range(&self, spec: &ParamSpec) -> ToolError {
        let reason = match spec.param_type.constraint() {
            Some(constraint) => format!("must be {constraint}"),
            None => "is out of range".to_string(),
        };
        self.invalid(spec, &reason)
    }

    fn invalid(&self, spec: &ParamSpec, reason: &str) -> ToolError {
        ToolError::InvalidArgument {
            tool: self.name.to_string(),
            field: spec.name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// One remote call with already validated arguments.
    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.descriptor().name.to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|tool| tool.descriptor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values().map(|tool| tool.descriptor())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A successful dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    pub tool: String,
    pub args: Map<String, Value>,
    pub presentation: ToolPresentation,
    pub result: Value,
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Validates then invokes exactly once. No retries.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        raw_args: Option<&Map<String, Value>>,
    ) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool { tool: tool_name.to_string() })?;
        let descriptor = tool.descriptor();
        let args = descriptor.validate_args(raw_args)?;

        debug!(
            event_name = "agent.tool.invoke",
            tool = tool_name,
            args = %serde_json::Value::Object(args.clone()),
            "invoking tool"
        );

        let result = match tokio::time::timeout(self.timeout, tool.invoke(&args)).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                warn!(
                    event_name = "agent.tool.invoke_failed",
                    tool = tool_name,
                    error = %error,
                    "tool invocation failed"
                );
                return Err(ToolError::ExecutionFailed {
                    tool: tool_name.to_string(),
                    cause: format!("{error:#}"),
                });
            }
            Err(_) => {
                warn!(
                    event_name = "agent.tool.invoke_timeout",
                    tool = tool_name,
                    timeout_secs = self.timeout.as_secs(),
                    "tool invocation timed out"
                );
                return Err(ToolError::ExecutionFailed {
                    tool: tool_name.to_string(),
                    cause: format!("timed out after {}s", self.timeout.as_secs()),
                });
            }
        };

        Ok(ToolOutcome {
            tool: tool_name.to_string(),
            args,
            presentation: descriptor.presentation,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use fleetchat_core::errors::{ToolError, ToolErrorKind};
    use serde_json::{json, Map, Value};

    use super::{
        ParamSpec, ParamType, Tool, ToolDescriptor, ToolDispatcher, ToolPresentation,
        ToolRegistry,
    };

    struct StubTool {
        descriptor: ToolDescriptor,
        calls: Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, args: &Map<String, Value>) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(anyhow!("cab not found"));
            }
            Ok(Value::Object(args.clone()))
        }
    }

    fn location_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "update_cab_location",
            description: "Update a cab position",
            params: vec![
                ParamSpec::required(
                    "cab_id",
                    ParamType::Integer { min: Some(1), max: None },
                    "cab identifier",
                ),
                ParamSpec::required(
                    "current_lat",
                    ParamType::Float { min: Some(-90.0), max: Some(90.0) },
                    "latitude",
                ),
                ParamSpec::optional(
                    "note",
                    ParamType::String { min_len: Some(3), max_len: Some(20) },
                    "free text",
                ),
            ],
            presentation: ToolPresentation::Mutation,
            mutating: true,
            requires_any: &[],
        }
    }

    fn dispatcher_with(fail: bool, delay: Option<Duration>) -> (ToolDispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::default();
        registry.register(StubTool {
            descriptor: location_descriptor(),
            calls: calls.clone(),
            fail,
            delay,
        });
        (ToolDispatcher::new(Arc::new(registry), Duration::from_millis(50)), calls)
    }

    #[test]
    fn validation_coerces_form_strings_and_drops_undeclared_keys() {
        let args = json!({ "cab_id": "7", "current_lat": "12.5", "colour": "red" });
        let validated = location_descriptor()
            .validate_args(args.as_object())
            .expect("arguments are valid");

        assert_eq!(validated.get("cab_id"), Some(&json!(7)));
        assert_eq!(validated.get("current_lat"), Some(&json!(12.5)));
        assert!(!validated.contains_key("colour"));
    }

    #[test]
    fn validation_reports_field_for_missing_and_out_of_range_values() {
        let descriptor = location_descriptor();

        let missing = descriptor.validate_args(json!({ "current_lat": 1.0 }).as_object());
        assert!(matches!(
            missing,
            Err(ToolError::InvalidArgument { ref field, .. }) if field == "cab_id"
        ));

        let out_of_range =
            descriptor.validate_args(json!({ "cab_id": 1, "current_lat": 91.0 }).as_object());
        assert!(matches!(
            out_of_range,
            Err(ToolError::InvalidArgument { ref field, ref reason, .. })
                if field == "current_lat" && reason.contains("between -90 and 90")
        ));

        let short = descriptor
            .validate_args(json!({ "cab_id": 1, "current_lat": 1.0, "note": "ab" }).as_object());
        assert!(matches!(
            short,
            Err(ToolError::InvalidArgument { ref reason, .. }) if reason == "must be 3-20 characters"
        ));

        let zero = descriptor.validate_args(json!({ "cab_id": 0, "current_lat": 1.0 }).as_object());
        assert!(zero.is_err());
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_without_invocation() {
        let (dispatcher, calls) = dispatcher_with(false, None);

        let result = dispatcher.dispatch("launch_rocket", None).await;

        assert_eq!(result.map_err(|error| error.kind()), Err(ToolErrorKind::UnknownTool));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_capability() {
        let (dispatcher, calls) = dispatcher_with(false, None);

        let result = dispatcher
            .dispatch("update_cab_location", json!({ "cab_id": -4 }).as_object())
            .await;

        assert_eq!(result.map_err(|error| error.kind()), Err(ToolErrorKind::InvalidArgument));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_one_of_group_is_rejected_before_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::default();
        registry.register(StubTool {
            descriptor: ToolDescriptor {
                name: "update_cab",
                description: "Update a cab",
                params: vec![
                    ParamSpec::required(
                        "cab_id",
                        ParamType::Integer { min: Some(1), max: None },
                        "cab identifier",
                    ),
                    ParamSpec::optional(
                        "cab_model_name",
                        ParamType::String { min_len: Some(2), max_len: None },
                        "model",
                    ),
                    ParamSpec::optional(
                        "cab_reg_name",
                        ParamType::String { min_len: Some(3), max_len: None },
                        "registration",
                    ),
                ],
                presentation: ToolPresentation::Mutation,
                mutating: true,
                requires_any: &["cab_model_name", "cab_reg_name"],
            },
            calls: calls.clone(),
            fail: false,
            delay: None,
        });
        let dispatcher = ToolDispatcher::new(Arc::new(registry), Duration::from_millis(50));

        let result = dispatcher.dispatch("update_cab", json!({ "cab_id": 4 }).as_object()).await;

        assert_eq!(result.map_err(|error| error.kind()), Err(ToolErrorKind::InvalidArgument));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remote_failure_is_wrapped_and_invoked_once() {
        let (dispatcher, calls) = dispatcher_with(true, None);

        let result = dispatcher
            .dispatch("update_cab_location", json!({ "cab_id": 3, "current_lat": 4.0 }).as_object())
            .await;

        assert!(matches!(
            result,
            Err(ToolError::ExecutionFailed { ref cause, .. }) if cause == "cab not found"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_capability_times_out_as_execution_failure() {
        let (dispatcher, calls) = dispatcher_with(false, Some(Duration::from_millis(500)));

        let result = dispatcher
            .dispatch("update_cab_location", json!({ "cab_id": 3, "current_lat": 4.0 }).as_object())
            .await;

        assert_eq!(result.map_err(|error| error.kind()), Err(ToolErrorKind::ExecutionFailed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_dispatch_carries_validated_args_and_presentation() {
        let (dispatcher, _) = dispatcher_with(false, None);

        let outcome = dispatcher
            .dispatch("update_cab_location", json!({ "cab_id": 3, "current_lat": 4.0 }).as_object())
            .await
            .expect("dispatch succeeds");

        assert_eq!(outcome.presentation, ToolPresentation::Mutation);
        assert_eq!(outcome.result, json!({ "cab_id": 3, "current_lat": 4.0 }));
        assert_eq!(dispatcher.registry().len(), 1);
    }
}
