use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fleetchat_agent::conversation::ConversationStore;
use fleetchat_agent::enhancer::ResponseEnhancer;
use fleetchat_agent::fleet::FleetOperation;
use fleetchat_agent::guardrails::GuardrailPolicy;
use fleetchat_agent::llm::{DecisionOracle, OracleError};
use fleetchat_agent::runtime::{AgentRuntime, RuntimeSettings};
use fleetchat_agent::tools::{Tool, ToolDescriptor, ToolDispatcher, ToolRegistry};
use fleetchat_core::domain::decision::Turn;
use serde_json::{json, Map, Value};

struct QueuedOracle {
    replies: Mutex<VecDeque<Value>>,
}

#[async_trait]
impl DecisionOracle for QueuedOracle {
    async fn classify(
        &self,
        _system_prompt: &str,
        _history: &[Turn],
        _user_content: &str,
    ) -> Result<String, OracleError> {
        self.replies
            .lock()
            .map_err(|_| OracleError::EmptyResponse)?
            .pop_front()
            .map(|reply| reply.to_string())
            .ok_or(OracleError::EmptyResponse)
    }
}

struct ListCabsStub {
    descriptor: ToolDescriptor,
}

#[async_trait]
impl Tool for ListCabsStub {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _args: &Map<String, Value>) -> Result<Value> {
        Ok(json!([{ "cab_id": 1, "cab_model_name": "Toyota Camry", "cab_reg_name": "TN01AB1234" }]))
    }
}

fn runtime(replies: Vec<Value>, registry: ToolRegistry) -> Arc<AgentRuntime> {
    Arc::new(AgentRuntime::new(
        Arc::new(QueuedOracle { replies: Mutex::new(replies.into()) }),
        "SYSTEM",
        GuardrailPolicy::default(),
        ToolDispatcher::new(Arc::new(registry), Duration::from_secs(1)),
        ResponseEnhancer::deterministic(),
        Arc::new(ConversationStore::new(20, 6)),
        RuntimeSettings { classify_timeout: Duration::from_secs(1) },
    ))
}

/// Runtime whose oracle replays `replies` in order, with a stubbed
/// `get_all_cabs` tool.
pub fn runtime_with_replies(replies: Vec<Value>) -> Arc<AgentRuntime> {
    let mut registry = ToolRegistry::default();
    registry.register(ListCabsStub { descriptor: FleetOperation::ListCabs.descriptor() });
    runtime(replies, registry)
}

pub fn runtime_without_tools() -> Arc<AgentRuntime> {
    runtime(Vec::new(), ToolRegistry::default())
}
