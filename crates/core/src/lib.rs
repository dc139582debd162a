pub mod config;
pub mod domain;
pub mod errors;

pub use domain::component::{
    humanize, ApiConfig, Component, ComponentError, ComponentKind, SelectOption, TableColumn,
    TreeReport, ValidationRule,
};
pub use domain::decision::{Decision, Intent, Role, Turn, FALLBACK_DECISION_ID, FALLBACK_MESSAGE};
pub use errors::{InterfaceError, ToolError, ToolErrorKind, TurnError};
