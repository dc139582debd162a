use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::component::Component;

pub const FALLBACK_DECISION_ID: &str = "fallback";
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I couldn't process that request. Could you rephrase it or try again?";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    General,
    ViewData,
    CollectData,
    ExecuteAction,
}

impl Intent {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "general" => Some(Self::General),
            "view_data" => Some(Self::ViewData),
            "collect_data" => Some(Self::CollectData),
            "execute_action" => Some(Self::ExecuteAction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::ViewData => "view_data",
            Self::CollectData => "collect_data",
            Self::ExecuteAction => "execute_action",
        }
    }

    /// Intents that may name a tool.
    pub fn dispatches(&self) -> bool {
        matches!(self, Self::ViewData | Self::ExecuteAction)
    }
}

/// One turn's output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: String,
    pub message: String,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Map<String, Value>>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
}

impl Decision {
    pub fn general(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            intent: Intent::General,
            tool: None,
            tool_args: None,
            missing_fields: Vec::new(),
            components: Vec::new(),
            tool_result: None,
        }
    }

    /// The decision returned whenever oracle output cannot be trusted.
    pub fn fallback() -> Self {
        Self::general(FALLBACK_DECISION_ID, FALLBACK_MESSAGE)
    }

    pub fn is_fallback(&self) -> bool {
        self.id == FALLBACK_DECISION_ID && self.message == FALLBACK_MESSAGE
    }

    pub fn wants_dispatch(&self) -> bool {
        self.intent.dispatches() && self.tool.is_some()
    }

    /// Rewrites the decision into a general answer carrying one error text node.
    pub fn into_error_presentation(mut self, message: String, detail: String) -> Self {
        self.intent = Intent::General;
        self.message = message;
        self.tool = None;
        self.tool_args = None;
        self.missing_fields.clear();
        self.components = vec![Component::text("error", detail).with_label("Error")];
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}
