//! Turn Orchestrator.
//!
//! `Classifying -> Validating -> {Idle | Dispatching} -> {Idle | Enhancing}
//! -> Persisting -> Done`. Every path ends in a well-formed `Decision`; the
//! only path that skips `Persisting` is a conversation store fault.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fleetchat_core::config::{AppConfig, EnhancementMode};
use fleetchat_core::domain::decision::{Decision, Turn};
use fleetchat_core::errors::TurnError;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::contract::{parse_raw, DecisionValidator};
use crate::conversation::ConversationStore;
use crate::enhancer::ResponseEnhancer;
use crate::fleet::{register_fleet_tools, FleetClient};
use crate::guardrails::GuardrailPolicy;
use crate::llm::{
    compose_user_content, DecisionOracle, EnhancementOracle, LlmOracle, OpenAiCompatibleClient,
    OracleError,
};
use crate::prompt;
use crate::tools::{ToolDispatcher, ToolRegistry};

#[derive(Debug, Error)]
pub enum RuntimeBuildError {
    #[error("oracle client could not be created: {0}")]
    Oracle(#[from] OracleError),
    #[error("fleet client could not be created: {0}")]
    Fleet(String),
    #[error("could not read system prompt `{path}`: {source}")]
    SystemPrompt { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnStage {
    Classifying,
    Validating,
    Idle,
    Dispatching,
    Enhancing,
    Persisting,
    Done,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifying => "classifying",
            Self::Validating => "validating",
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Enhancing => "enhancing",
            Self::Persisting => "persisting",
            Self::Done => "done",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub classify_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { classify_timeout: Duration::from_secs(30) }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnRequest {
    pub utterance: String,
    pub form_data: Option<Map<String, Value>>,
    pub conversation_id: Option<String>,
}

impl TurnRequest {
    pub fn new(utterance: impl Into<String>) -> Self {
        Self { utterance: utterance.into(), ..Self::default() }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_form_data(mut self, form_data: Map<String, Value>) -> Self {
        self.form_data = Some(form_data);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnResponse {
    pub conversation_id: String,
    pub decision: Decision,
}

pub struct AgentRuntime {
    oracle: Arc<dyn DecisionOracle>,
    system_prompt: Arc<str>,
    validator: DecisionValidator,
    guardrails: GuardrailPolicy,
    dispatcher: ToolDispatcher,
    enhancer: ResponseEnhancer,
    store: Arc<ConversationStore>,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        system_prompt: impl Into<Arc<str>>,
        guardrails: GuardrailPolicy,
        dispatcher: ToolDispatcher,
        enhancer: ResponseEnhancer,
        store: Arc<ConversationStore>,
        settings: RuntimeSettings,
    ) -> Self {
        let validator = DecisionValidator::new(dispatcher.registry().names());
        Self {
            oracle,
            system_prompt: system_prompt.into(),
            validator,
            guardrails,
            dispatcher,
            enhancer,
            store,
            settings,
        }
    }

    /// Wires the fleet catalogue, the OpenAI-compatible oracle and the
    /// configured enhancement strategy.
    pub fn from_config(config: &AppConfig) -> Result<Self, RuntimeBuildError> {
        let fleet = FleetClient::from_config(&config.fleet)
            .map_err(|error| RuntimeBuildError::Fleet(format!("{error:#}")))?;
        let mut registry = ToolRegistry::default();
        register_fleet_tools(&mut registry, Arc::new(fleet));

        let prose = match &config.llm.system_prompt_path {
            Some(path) => Some(prompt::load_prose(path).map_err(|source| {
                RuntimeBuildError::SystemPrompt { path: path.clone(), source }
            })?),
            None => None,
        };
        let system_prompt = prompt::build_system_prompt(&registry, prose.as_deref());

        let client = OpenAiCompatibleClient::from_config(&config.llm)?;
        let oracle = Arc::new(LlmOracle::new(
            client,
            config.llm.temperature,
            config.enhancement.temperature,
        ));

        let registry = Arc::new(registry);
        let enhancer = match config.enhancement.mode {
            EnhancementMode::Deterministic => ResponseEnhancer::deterministic(),
            EnhancementMode::Oracle => {
                let enhancement_oracle: Arc<dyn EnhancementOracle> = oracle.clone();
                ResponseEnhancer::with_oracle(
                    enhancement_oracle,
                    DecisionValidator::new(registry.names()),
                    Duration::from_secs(config.enhancement.timeout_secs),
                )
            }
        };

        Ok(Self::new(
            oracle,
            system_prompt,
            GuardrailPolicy {
                tools_enabled: config.tools.enabled,
                read_only: config.tools.read_only,
            },
            ToolDispatcher::new(registry, Duration::from_secs(config.fleet.timeout_secs)),
            enhancer,
            Arc::new(ConversationStore::new(
                config.conversation.retention_turns,
                config.conversation.context_turns,
            )),
            RuntimeSettings { classify_timeout: Duration::from_secs(config.llm.timeout_secs) },
        ))
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> bool {
        let cleared = self.store.clear(conversation_id).await;
        info!(
            event_name = "agent.conversation.cleared",
            conversation_id,
            cleared,
            "conversation clear requested"
        );
        cleared
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResponse {
        let conversation_id = request
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let turn_id = format!("turn-{}", Uuid::new_v4());

        let mut lease = self.store.lease(&conversation_id).await;
        let history = match lease.load() {
            Ok(history) => history,
            Err(error) => {
                let decision = error_decision(&turn_id, &error);
                warn!(
                    event_name = "agent.turn.store_fault",
                    conversation_id = %conversation_id,
                    correlation_id = %turn_id,
                    error = %error,
                    "turn aborted before persisting"
                );
                return TurnResponse { conversation_id, decision };
            }
        };

        self.stage(TurnStage::Classifying, &conversation_id, &turn_id);
        let user_content = compose_user_content(&request.utterance, request.form_data.as_ref());
        let raw = self.classify(&history, &user_content, &conversation_id, &turn_id).await;

        self.stage(TurnStage::Validating, &conversation_id, &turn_id);
        let decision = match raw {
            Some(raw) => {
                let validated = self.validator.validate(&parse_raw(&raw));
                for warning in &validated.warnings {
                    debug!(
                        event_name = "agent.contract.warning",
                        conversation_id = %conversation_id,
                        correlation_id = %turn_id,
                        warning = %warning,
                        "oracle output repaired"
                    );
                }
                validated.decision
            }
            None => Decision::fallback(),
        };
        let descriptor = decision.tool.as_deref().and_then(|tool| self.registry().descriptor(tool));
        let decision = self.guardrails.apply(decision, descriptor);

        info!(
            event_name = "agent.turn.classified",
            conversation_id = %conversation_id,
            correlation_id = %turn_id,
            intent = decision.intent.as_str(),
            tool = decision.tool.as_deref().unwrap_or("none"),
            "turn classified"
        );

        let mut decision = if decision.wants_dispatch() {
            // Tool and enhancer events inherit the turn's ids from this span.
            let span = info_span!(
                "turn",
                conversation_id = %conversation_id,
                correlation_id = %turn_id
            );
            self.dispatch_and_enhance(decision, &conversation_id, &turn_id).instrument(span).await
        } else {
            self.stage(TurnStage::Idle, &conversation_id, &turn_id);
            decision
        };
        decision.id = turn_id.clone();

        self.stage(TurnStage::Persisting, &conversation_id, &turn_id);
        let serialized =
            serde_json::to_string(&decision).unwrap_or_else(|_| decision.message.clone());
        lease.append([Turn::user(request.utterance), Turn::assistant(serialized)]);
        drop(lease);

        self.stage(TurnStage::Done, &conversation_id, &turn_id);
        TurnResponse { conversation_id, decision }
    }

    async fn classify(
        &self,
        history: &[Turn],
        user_content: &str,
        conversation_id: &str,
        turn_id: &str,
    ) -> Option<String> {
        let timeout = self.settings.classify_timeout;
        let call = self.oracle.classify(&self.system_prompt, history, user_content);
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout { secs: timeout.as_secs() }),
        };

        match result {
            Ok(raw) => Some(raw),
            Err(error) => {
                let error = TurnError::OracleUnavailable(error.to_string());
                warn!(
                    event_name = "agent.turn.oracle_unavailable",
                    conversation_id,
                    correlation_id = turn_id,
                    error = %error,
                    "decision oracle failed; using fallback decision"
                );
                None
            }
        }
    }

    async fn dispatch_and_enhance(
        &self,
        decision: Decision,
        conversation_id: &str,
        turn_id: &str,
    ) -> Decision {
        self.stage(TurnStage::Dispatching, conversation_id, turn_id);
        let tool = decision.tool.clone().unwrap_or_default();

        match self.dispatcher.dispatch(&tool, decision.tool_args.as_ref()).await {
            Ok(outcome) => {
                info!(
                    event_name = "agent.tool.dispatched",
                    conversation_id,
                    correlation_id = turn_id,
                    tool = %tool,
                    "tool dispatched"
                );
                self.stage(TurnStage::Enhancing, conversation_id, turn_id);
                self.enhancer.enhance(decision, &outcome).await
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.dispatch_failed",
                    conversation_id,
                    correlation_id = turn_id,
                    tool = %tool,
                    kind = ?error.kind(),
                    error = %error,
                    "tool dispatch failed"
                );
                self.stage(TurnStage::Idle, conversation_id, turn_id);
                let detail = error.detail();
                decision.into_error_presentation(TurnError::from(error).user_message().to_string(), detail)
            }
        }
    }

    fn stage(&self, stage: TurnStage, conversation_id: &str, turn_id: &str) {
        debug!(
            event_name = "agent.turn.stage",
            conversation_id,
            correlation_id = turn_id,
            stage = stage.as_str(),
            "turn stage entered"
        );
    }
}

fn error_decision(turn_id: &str, error: &TurnError) -> Decision {
    Decision::general(turn_id, error.user_message()).into_error_presentation(
        error.user_message().to_string(),
        "The conversation history was reset.".to_string(),
    )
}
