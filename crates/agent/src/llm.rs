//! Oracle clients.
//!
//! `LlmClient` is the transport seam (one chat completion per call).
//! `DecisionOracle` and `EnhancementOracle` are the two contracts the turn
//! engine consumes; `LlmOracle` implements both on top of any `LlmClient`.

use std::time::Duration;

use async_trait::async_trait;
use fleetchat_core::config::{LlmConfig, LlmProvider};
use fleetchat_core::domain::decision::{Decision, Role, Turn};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::prompt;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle call timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("oracle transport failure: {0}")]
    Transport(String),
    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle returned no content")]
    EmptyResponse,
    #[error("oracle response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask the provider for a JSON object instead of free text.
    pub json_response: bool,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError>;
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn classify(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_content: &str,
    ) -> Result<String, OracleError>;
}

#[async_trait]
pub trait EnhancementOracle: Send + Sync {
    async fn enhance(
        &self,
        tool: &str,
        tool_result: &Value,
        decision: &Decision,
    ) -> Result<String, OracleError>;
}

/// Chat-completions client for OpenAI and OpenAI-compatible servers such as
/// Ollama's `/v1` endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    timeout_secs: u64,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, OracleError> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(OracleError::Transport("ollama requires llm.base_url".to_string()))
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| OracleError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: request
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                OracleError::Timeout { secs: self.timeout_secs }
            } else {
                OracleError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status: status.as_u16(), body });
        }

        let parsed: CompletionResponse =
            response.json().await.map_err(|error| OracleError::Decode(error.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

/// Both oracle contracts backed by one chat-completions client.
pub struct LlmOracle<C> {
    client: C,
    classify_temperature: f32,
    enhance_temperature: f32,
}

impl<C> LlmOracle<C>
where
    C: LlmClient,
{
    pub fn new(client: C, classify_temperature: f32, enhance_temperature: f32) -> Self {
        Self { client, classify_temperature, enhance_temperature }
    }
}

#[async_trait]
impl<C> DecisionOracle for LlmOracle<C>
where
    C: LlmClient,
{
    async fn classify(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_content: &str,
    ) -> Result<String, OracleError> {
        let messages = classification_messages(system_prompt, history, user_content);
        debug!(
            event_name = "agent.oracle.classify_request",
            history_turns = history.len(),
            user_content = %user_content,
            "sending classification request"
        );

        let raw = self
            .client
            .complete(CompletionRequest {
                messages,
                temperature: self.classify_temperature,
                json_response: true,
            })
            .await?;

        debug!(event_name = "agent.oracle.classify_response", raw = %raw, "oracle responded");
        Ok(raw)
    }
}

#[async_trait]
impl<C> EnhancementOracle for LlmOracle<C>
where
    C: LlmClient,
{
    async fn enhance(
        &self,
        tool: &str,
        tool_result: &Value,
        decision: &Decision,
    ) -> Result<String, OracleError> {
        let messages = vec![
            ChatMessage::system(prompt::ENHANCEMENT_SYSTEM_PROMPT),
            ChatMessage::user(prompt::enhancement_prompt(tool, tool_result, decision)),
        ];

        self.client
            .complete(CompletionRequest {
                messages,
                temperature: self.enhance_temperature,
                json_response: true,
            })
            .await
    }
}

/// System prompt, then history in order, then the current user content.
pub fn classification_messages(
    system_prompt: &str,
    history: &[Turn],
    user_content: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(
        history
            .iter()
            .map(|turn| ChatMessage { role: turn.role.into(), content: turn.content.clone() }),
    );
    messages.push(ChatMessage::user(user_content));
    messages
}

/// Utterance plus the submitted form, when one came with this turn.
pub fn compose_user_content(utterance: &str, form_data: Option<&Map<String, Value>>) -> String {
    match form_data {
        Some(form) if !form.is_empty() => {
            let serialized = Value::Object(form.clone()).to_string();
            format!("{utterance}\n\n[Form data submitted: {serialized}]")
        }
        _ => utterance.to_string(),
    }
}
