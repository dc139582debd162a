use fleetchat_core::domain::component::Component;
use fleetchat_core::domain::decision::{Decision, Intent};

use crate::tools::ToolDescriptor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub tools_enabled: bool,
    pub read_only: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { tools_enabled: true, read_only: false }
    }
}

impl GuardrailPolicy {
    /// Policy verdict for a decision that wants to dispatch `descriptor`.
    /// Unregistered tools are allowed through so the dispatcher reports them.
    pub fn evaluate(&self, decision: &Decision, descriptor: Option<&ToolDescriptor>) -> GuardrailDecision {
        if !decision.wants_dispatch() {
            return GuardrailDecision::Allow;
        }

        if !self.tools_enabled {
            return GuardrailDecision::Degrade {
                reason_code: "tools_disabled",
                user_message:
                    "Cab operations are temporarily unavailable. I can still answer general questions."
                        .to_string(),
                fallback_path: "conversation_only",
            };
        }

        match descriptor {
            Some(descriptor) if descriptor.mutating && self.read_only => GuardrailDecision::Deny {
                reason_code: "read_only_mode",
                user_message: format!(
                    "I can't run `{}` right now because changes are disabled. You can still view cabs and locations.",
                    descriptor.name
                ),
                fallback_path: "read_only_tools",
            },
            _ => GuardrailDecision::Allow,
        }
    }

    /// Coupling repair followed by the policy verdict.
    pub fn apply(&self, decision: Decision, descriptor: Option<&ToolDescriptor>) -> Decision {
        let decision = enforce_coupling(decision);

        match self.evaluate(&decision, descriptor) {
            GuardrailDecision::Allow => decision,
            GuardrailDecision::Degrade { reason_code, user_message, .. } => {
                tracing::info!(
                    event_name = "agent.guardrail.degraded",
                    reason_code,
                    tool = decision.tool.as_deref().unwrap_or_default(),
                    "dispatch degraded by guardrail"
                );
                Decision::general(decision.id, user_message)
            }
            GuardrailDecision::Deny { reason_code, user_message, .. } => {
                tracing::info!(
                    event_name = "agent.guardrail.denied",
                    reason_code,
                    tool = decision.tool.as_deref().unwrap_or_default(),
                    "dispatch denied by guardrail"
                );
                let mut denied = Decision::general(decision.id, user_message.clone());
                denied.components = vec![Component::text("guardrail", user_message)];
                denied
            }
        }
    }
}

/// `tool`/`toolArgs` only with a dispatching intent, `missingFields` only
/// with `collect_data`. A dispatching intent without a tool becomes general.
pub fn enforce_coupling(mut decision: Decision) -> Decision {
    if decision.intent.dispatches() && decision.tool.is_none() {
        decision.intent = Intent::General;
        decision.tool_args = None;
    }
    if !decision.intent.dispatches() {
        decision.tool = None;
        decision.tool_args = None;
    }
    if decision.intent != Intent::CollectData {
        decision.missing_fields.clear();
    }
    decision
}

#[cfg(test)]
mod tests {
    use fleetchat_core::domain::component::ComponentKind;
    use fleetchat_core::domain::decision::{Decision, Intent};
    use serde_json::json;

    use super::{enforce_coupling, GuardrailDecision, GuardrailPolicy};
    use crate::fleet::FleetOperation;

    fn dispatching(intent: Intent, tool: &str) -> Decision {
        let mut decision = Decision::general("d-1", "Working on it");
        decision.intent = intent;
        decision.tool = Some(tool.to_string());
        decision.tool_args = json!({ "cab_id": 2 }).as_object().cloned();
        decision
    }

    #[test]
    fn collect_data_never_carries_a_tool() {
        let mut decision = dispatching(Intent::CollectData, "add_cab");
        decision.missing_fields = vec!["cab_reg_name".to_string()];

        let repaired = enforce_coupling(decision);

        assert!(repaired.tool.is_none());
        assert!(repaired.tool_args.is_none());
        assert_eq!(repaired.missing_fields, vec!["cab_reg_name"]);
    }

    #[test]
    fn execute_action_without_tool_degrades_to_general() {
        let mut decision = Decision::general("d-2", "Deleting");
        decision.intent = Intent::ExecuteAction;
        decision.missing_fields = vec!["cab_id".to_string()];

        let repaired = enforce_coupling(decision);

        assert_eq!(repaired.intent, Intent::General);
        assert!(repaired.missing_fields.is_empty());
    }

    #[test]
    fn disabled_tools_degrade_dispatch() {
        let policy = GuardrailPolicy { tools_enabled: false, read_only: false };
        let descriptor = FleetOperation::ListCabs.descriptor();
        let decision = dispatching(Intent::ViewData, "get_all_cabs");

        let verdict = policy.evaluate(&decision, Some(&descriptor));
        assert!(matches!(
            verdict,
            GuardrailDecision::Degrade { reason_code: "tools_disabled", .. }
        ));

        let applied = policy.apply(decision, Some(&descriptor));
        assert_eq!(applied.intent, Intent::General);
        assert!(applied.tool.is_none());
        assert!(applied.message.contains("temporarily unavailable"));
    }

    #[test]
    fn read_only_denies_mutations_but_allows_reads() {
        let policy = GuardrailPolicy { tools_enabled: true, read_only: true };

        let delete = FleetOperation::DeleteCab.descriptor();
        let denied = policy.apply(dispatching(Intent::ExecuteAction, "delete_cab"), Some(&delete));
        assert_eq!(denied.intent, Intent::General);
        assert!(denied.tool.is_none());
        assert_eq!(denied.components.len(), 1);
        assert!(matches!(denied.components[0].kind, ComponentKind::Text { .. }));

        let location = FleetOperation::GetCabLocation.descriptor();
        let allowed = dispatching(Intent::ViewData, "get_cab_location");
        assert_eq!(policy.evaluate(&allowed, Some(&location)), GuardrailDecision::Allow);
    }
}
