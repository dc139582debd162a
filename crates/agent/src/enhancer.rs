//! Response Enhancer.
//!
//! Turns a successful [`ToolOutcome`] into the user-facing decision. The
//! deterministic renderer needs nothing external and is also the fallback for
//! the oracle strategy.

use std::sync::Arc;
use std::time::Duration;

use fleetchat_core::config::EnhancementMode;
use fleetchat_core::domain::component::{humanize, Component, TableColumn};
use fleetchat_core::domain::decision::Decision;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::contract::{parse_raw, DecisionValidator};
use crate::llm::EnhancementOracle;
use crate::tools::{ToolOutcome, ToolPresentation};

const LATITUDE_KEYS: [&str; 3] = ["current_lat", "lat", "latitude"];
const LONGITUDE_KEYS: [&str; 4] = ["current_lan", "lng", "lon", "longitude"];

pub const COMPLETION_NOTICE: &str = "Operation completed.";

pub struct ResponseEnhancer {
    mode: EnhancementMode,
    oracle: Option<Arc<dyn EnhancementOracle>>,
    validator: DecisionValidator,
    timeout: Duration,
}

impl ResponseEnhancer {
    pub fn deterministic() -> Self {
        Self {
            mode: EnhancementMode::Deterministic,
            oracle: None,
            validator: DecisionValidator::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_oracle(
        oracle: Arc<dyn EnhancementOracle>,
        validator: DecisionValidator,
        timeout: Duration,
    ) -> Self {
        Self { mode: EnhancementMode::Oracle, oracle: Some(oracle), validator, timeout }
    }

    pub fn mode(&self) -> EnhancementMode {
        self.mode
    }

    /// Never fails. Keeps `intent` and `tool`, replaces `toolArgs` with the
    /// validated arguments, always sets `toolResult`.
    pub async fn enhance(&self, decision: Decision, outcome: &ToolOutcome) -> Decision {
        let Some(oracle) = self.oracle.as_ref().filter(|_| self.mode == EnhancementMode::Oracle)
        else {
            return render(decision, outcome);
        };

        match self.ask_oracle(oracle.as_ref(), &decision, outcome).await {
            Ok(enhanced) => enhanced,
            Err(reason) => {
                warn!(
                    event_name = "agent.enhance.fallback",
                    tool = %outcome.tool,
                    reason = %reason,
                    "enhancement oracle failed; using minimal rendering"
                );
                minimal_rendering(decision, outcome)
            }
        }
    }

    async fn ask_oracle(
        &self,
        oracle: &dyn EnhancementOracle,
        decision: &Decision,
        outcome: &ToolOutcome,
    ) -> Result<Decision, String> {
        let raw = tokio::time::timeout(
            self.timeout,
            oracle.enhance(&outcome.tool, &outcome.result, decision),
        )
        .await
        .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
        .map_err(|error| error.to_string())?;

        debug!(event_name = "agent.enhance.oracle_response", raw = %raw, "enhancement oracle responded");

        let validated = self.validator.check(&parse_raw(&raw)).map_err(|error| error.to_string())?;
        let enhanced = validated.decision;
        Ok(finish(decision.clone(), outcome, enhanced.message, enhanced.components))
    }
}

/// Deterministic presentation chosen by the tool's declared presentation and
/// the result's shape.
pub fn render(decision: Decision, outcome: &ToolOutcome) -> Decision {
    match outcome.presentation {
        ToolPresentation::Listing => match records(&outcome.result) {
            Some(records) => render_listing(decision, outcome, records),
            None => minimal_rendering(decision, outcome),
        },
        ToolPresentation::Location => match coordinates(&outcome.result) {
            Some((latitude, longitude)) => {
                let message = format!("Current location: {latitude}, {longitude}.");
                let map = Component::map("result-map", latitude, longitude).with_label("Location");
                finish(decision, outcome, message, vec![map])
            }
            None => {
                let mut rendered = minimal_rendering(decision, outcome);
                rendered.message = "No location is available for that record.".to_string();
                rendered
            }
        },
        ToolPresentation::Mutation => {
            let summary = mutation_summary(&outcome.tool, &outcome.result);
            let text = Component::text("result", summary.clone()).with_label("Result");
            finish(decision, outcome, summary, vec![text])
        }
    }
}

/// The rendering that is always available: a completion notice and a text
/// dump of the raw result.
pub fn minimal_rendering(decision: Decision, outcome: &ToolOutcome) -> Decision {
    let dump = serde_json::to_string_pretty(&outcome.result)
        .unwrap_or_else(|_| outcome.result.to_string());
    finish(decision, outcome, COMPLETION_NOTICE.to_string(), vec![Component::text("result", dump)])
}

fn finish(
    mut decision: Decision,
    outcome: &ToolOutcome,
    message: String,
    components: Vec<Component>,
) -> Decision {
    decision.message = message;
    decision.components = components;
    decision.tool = Some(outcome.tool.clone());
    decision.tool_args = Some(outcome.args.clone());
    decision.missing_fields.clear();
    decision.tool_result = Some(outcome.result.clone());
    decision
}

fn render_listing(
    decision: Decision,
    outcome: &ToolOutcome,
    records: Vec<Map<String, Value>>,
) -> Decision {
    if records.is_empty() {
        let message = "No records found.".to_string();
        let text = Component::text("result", message.clone());
        return finish(decision, outcome, message, vec![text]);
    }

    let mut columns: Vec<TableColumn> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.iter().any(|column| &column.key == key) {
                columns.push(TableColumn::new(key.clone()));
            }
        }
    }

    let message = match records.len() {
        1 => "Found 1 record.".to_string(),
        count => format!("Found {count} records."),
    };
    let table = Component::table("result-table", columns, records);
    finish(decision, outcome, message, vec![table])
}

/// Objects of a top-level array, or of the first array inside an envelope
/// object such as `{"cabs": [...]}`.
fn records(result: &Value) -> Option<Vec<Map<String, Value>>> {
    match result {
        Value::Array(items) => {
            let records: Vec<_> = items.iter().filter_map(Value::as_object).cloned().collect();
            (records.len() == items.len()).then_some(records)
        }
        Value::Object(object) => object.values().find(|value| value.is_array()).and_then(records),
        _ => None,
    }
}

fn coordinates(result: &Value) -> Option<(f64, f64)> {
    let object = result.as_object()?;
    coordinates_in(object).or_else(|| {
        object.values().filter_map(Value::as_object).find_map(coordinates_in)
    })
}

fn coordinates_in(object: &Map<String, Value>) -> Option<(f64, f64)> {
    let latitude = LATITUDE_KEYS.iter().find_map(|key| object.get(*key).and_then(as_f64))?;
    let longitude = LONGITUDE_KEYS.iter().find_map(|key| object.get(*key).and_then(as_f64))?;
    let in_range = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
    in_range.then_some((latitude, longitude))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn mutation_summary(tool: &str, result: &Value) -> String {
    let reported = match result {
        Value::String(text) => Some(text.as_str()),
        Value::Object(object) => object.get("message").and_then(Value::as_str),
        _ => None,
    };

    match reported.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => text.to_string(),
        None => format!("{} completed successfully.", humanize(tool)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use fleetchat_core::domain::component::ComponentKind;
    use fleetchat_core::domain::decision::{Decision, Intent};
    use serde_json::{json, Value};

    use super::{render, ResponseEnhancer, COMPLETION_NOTICE};
    use crate::contract::DecisionValidator;
    use crate::llm::{EnhancementOracle, OracleError};
    use crate::tools::{ToolOutcome, ToolPresentation};

    enum Reply {
        Raw(&'static str),
        Fail,
        Slow,
    }

    struct StubOracle(Reply);

    #[async_trait]
    impl EnhancementOracle for StubOracle {
        async fn enhance(
            &self,
            _tool: &str,
            _tool_result: &Value,
            _decision: &Decision,
        ) -> Result<String, OracleError> {
            match self.0 {
                Reply::Raw(raw) => Ok(raw.to_string()),
                Reply::Fail => Err(OracleError::Transport("connection reset".to_string())),
                Reply::Slow => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok("{}".to_string())
                }
            }
        }
    }

    fn outcome(tool: &str, presentation: ToolPresentation, result: Value) -> ToolOutcome {
        ToolOutcome {
            tool: tool.to_string(),
            args: json!({ "cab_id": 4 }).as_object().cloned().unwrap_or_default(),
            presentation,
            result,
        }
    }

    fn dispatched(intent: Intent, tool: &str) -> Decision {
        let mut decision = Decision::general("d-1", "Working on it");
        decision.intent = intent;
        decision.tool = Some(tool.to_string());
        decision.tool_args = json!({ "cab_id": "4", "extra": 1 }).as_object().cloned();
        decision
    }

    fn assert_well_formed(decision: &Decision) {
        for component in &decision.components {
            assert!(component.check().is_ok(), "component {} should be well-formed", component.id);
        }
    }

    #[test]
    fn listing_renders_table_with_union_of_fields() {
        let result = json!([
            { "cab_id": 1, "cab_model_name": "Toyota Camry" },
            { "cab_id": 2, "cab_reg_name": "TN05XY9999" }
        ]);
        let rendered = render(
            dispatched(Intent::ViewData, "get_all_cabs"),
            &outcome("get_all_cabs", ToolPresentation::Listing, result.clone()),
        );

        assert_eq!(rendered.message, "Found 2 records.");
        assert_eq!(rendered.intent, Intent::ViewData);
        assert_eq!(rendered.tool_result, Some(result));
        assert_well_formed(&rendered);
        match &rendered.components[0].kind {
            ComponentKind::Table { columns, rows } => {
                let keys: Vec<_> = columns.iter().map(|column| column.key.as_str()).collect();
                assert_eq!(keys, vec!["cab_id", "cab_model_name", "cab_reg_name"]);
                assert_eq!(columns[1].label, "Cab Model Name");
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn envelope_listing_and_empty_listing_are_handled() {
        let rendered = render(
            dispatched(Intent::ViewData, "get_all_cabs"),
            &outcome("get_all_cabs", ToolPresentation::Listing, json!({ "cabs": [] })),
        );

        assert_eq!(rendered.message, "No records found.");
        assert!(matches!(rendered.components[0].kind, ComponentKind::Text { .. }));
    }

    #[test]
    fn location_renders_map_from_fleet_field_names() {
        let rendered = render(
            dispatched(Intent::ViewData, "get_cab_location"),
            &outcome(
                "get_cab_location",
                ToolPresentation::Location,
                json!({ "cab_id": 4, "current_lat": 13.08, "current_lan": "80.27" }),
            ),
        );

        assert_well_formed(&rendered);
        assert!(matches!(
            rendered.components[0].kind,
            ComponentKind::Map { latitude: Some(latitude), longitude: Some(longitude) }
                if (latitude - 13.08).abs() < 1e-9 && (longitude - 80.27).abs() < 1e-9
        ));
    }

    #[test]
    fn location_without_coordinates_falls_back_to_text() {
        let rendered = render(
            dispatched(Intent::ViewData, "get_cab_location"),
            &outcome("get_cab_location", ToolPresentation::Location, json!({ "cab_id": 4 })),
        );

        assert_eq!(rendered.components.len(), 1);
        assert!(matches!(rendered.components[0].kind, ComponentKind::Text { .. }));
    }

    #[test]
    fn mutation_renders_text_summary_and_keeps_validated_args() {
        let rendered = render(
            dispatched(Intent::ExecuteAction, "add_cab"),
            &outcome("add_cab", ToolPresentation::Mutation, json!({ "cab_id": 9 })),
        );

        assert_eq!(rendered.message, "Add Cab completed successfully.");
        assert_eq!(rendered.intent, Intent::ExecuteAction);
        assert_eq!(rendered.tool_args, json!({ "cab_id": 4 }).as_object().cloned());
        assert!(matches!(
            &rendered.components[0].kind,
            ComponentKind::Text { value: Some(value) } if value == "Add Cab completed successfully."
        ));
    }

    #[tokio::test]
    async fn oracle_output_is_validated_and_keeps_dispatch_fields() {
        let enhancer = ResponseEnhancer::with_oracle(
            Arc::new(StubOracle(Reply::Raw(
                r#"{"message":"Cab 4 removed","intent":"general","tool":null,
                    "components":[{"id":"done","type":"text","value":"Removed"}]}"#,
            ))),
            DecisionValidator::default(),
            Duration::from_secs(1),
        );

        let enhanced = enhancer
            .enhance(
                dispatched(Intent::ExecuteAction, "delete_cab"),
                &outcome("delete_cab", ToolPresentation::Mutation, json!({ "deleted": true })),
            )
            .await;

        assert_eq!(enhanced.message, "Cab 4 removed");
        assert_eq!(enhanced.intent, Intent::ExecuteAction);
        assert_eq!(enhanced.tool.as_deref(), Some("delete_cab"));
        assert_eq!(enhanced.components[0].id, "done");
        assert_eq!(enhanced.tool_result, Some(json!({ "deleted": true })));
    }

    #[tokio::test]
    async fn failing_slow_or_malformed_oracle_uses_minimal_rendering() {
        for reply in [Reply::Fail, Reply::Slow, Reply::Raw("not json at all")] {
            let enhancer = ResponseEnhancer::with_oracle(
                Arc::new(StubOracle(reply)),
                DecisionValidator::default(),
                Duration::from_millis(50),
            );

            let enhanced = enhancer
                .enhance(
                    dispatched(Intent::ViewData, "get_all_cabs"),
                    &outcome("get_all_cabs", ToolPresentation::Listing, json!([{ "cab_id": 1 }])),
                )
                .await;

            assert_eq!(enhanced.message, COMPLETION_NOTICE);
            assert_eq!(enhanced.components.len(), 1);
            assert_eq!(enhanced.components[0].id, "result");
            assert_eq!(enhanced.tool_result, Some(json!([{ "cab_id": 1 }])));
        }
    }
}
