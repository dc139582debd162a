use std::sync::Arc;

use fleetchat_agent::runtime::{AgentRuntime, RuntimeBuildError};
use fleetchat_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runtime(#[from] RuntimeBuildError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        enhancement_mode = ?config.enhancement.mode,
        "starting application bootstrap"
    );

    let agent_runtime = AgentRuntime::from_config(&config)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        tool_count = agent_runtime.registry().len(),
        fleet_base_url = %config.fleet.base_url,
        "agent runtime assembled"
    );

    Ok(Application { config, agent_runtime: Arc::new(agent_runtime) })
}
