use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArgument,
    ExecutionFailed,
    Disabled,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool `{tool}`")]
    UnknownTool { tool: String },
    #[error("invalid argument `{field}` for `{tool}`: {reason}")]
    InvalidArgument { tool: String, field: String, reason: String },
    #[error("`{tool}` failed: {cause}")]
    ExecutionFailed { tool: String, cause: String },
    #[error("`{tool}` is not available: {reason}")]
    Disabled { tool: String, reason: String },
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::UnknownTool { .. } => ToolErrorKind::UnknownTool,
            Self::InvalidArgument { .. } => ToolErrorKind::InvalidArgument,
            Self::ExecutionFailed { .. } => ToolErrorKind::ExecutionFailed,
            Self::Disabled { .. } => ToolErrorKind::Disabled,
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::UnknownTool { tool }
            | Self::InvalidArgument { tool, .. }
            | Self::ExecutionFailed { tool, .. }
            | Self::Disabled { tool, .. } => tool,
        }
    }

    /// Text placed in the error component shown to the user.
    pub fn detail(&self) -> String {
        match self {
            Self::UnknownTool { tool } => format!("The operation `{tool}` is not supported."),
            Self::InvalidArgument { field, reason, .. } => format!("`{field}` {reason}."),
            Self::ExecutionFailed { cause, .. } => cause.clone(),
            Self::Disabled { reason, .. } => reason.clone(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),
    #[error("oracle decision malformed: {0}")]
    DecisionMalformed(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("conversation store fault for `{conversation_id}`: {reason}")]
    ConversationStoreFault { conversation_id: String, reason: String },
}

impl TurnError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::OracleUnavailable(_) | Self::DecisionMalformed(_) => {
                "Sorry, I couldn't process that request. Could you rephrase it or try again?"
            }
            Self::Tool(ToolError::UnknownTool { .. }) => {
                "Error executing operation: that operation is not supported."
            }
            Self::Tool(ToolError::InvalidArgument { .. }) => {
                "Error executing operation: some details are missing or invalid."
            }
            Self::Tool(ToolError::ExecutionFailed { .. }) => {
                "Error executing operation: the fleet service reported a failure."
            }
            Self::Tool(ToolError::Disabled { .. }) => {
                "That operation is not available right now."
            }
            Self::ConversationStoreFault { .. } => {
                "Something went wrong with this conversation. Please start over."
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}
