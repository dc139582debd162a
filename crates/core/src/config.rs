use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub enhancement: EnhancementConfig,
    pub fleet: FleetConfig,
    pub tools: ToolsConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct EnhancementConfig {
    pub mode: EnhancementMode,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct FleetConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ToolsConfig {
    pub enabled: bool,
    pub read_only: bool,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub retention_turns: usize,
    pub context_turns: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(alias = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementMode {
    Deterministic,
    Oracle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub fleet_base_url: Option<String>,
    pub enhancement_mode: Option<EnhancementMode>,
    pub tools_read_only: Option<bool>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                temperature: 0.3,
                timeout_secs: 30,
                system_prompt_path: None,
            },
            enhancement: EnhancementConfig {
                mode: EnhancementMode::Deterministic,
                temperature: 0.2,
                timeout_secs: 30,
            },
            fleet: FleetConfig { base_url: "http://127.0.0.1:8000".to_string(), timeout_secs: 15 },
            tools: ToolsConfig { enabled: true, read_only: false },
            conversation: ConversationConfig { retention_turns: 20, context_turns: 6 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for EnhancementMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Ok(Self::Deterministic),
            "oracle" => Ok(Self::Oracle),
            other => Err(ConfigError::Validation(format!(
                "unsupported enhancement mode `{other}` (expected deterministic|oracle)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("fleetchat.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Effective configuration as JSON with secrets redacted.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "llm": {
                "provider": self.llm.provider,
                "api_key": if self.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
                "base_url": self.llm.base_url,
                "model": self.llm.model,
                "temperature": self.llm.temperature,
                "timeout_secs": self.llm.timeout_secs,
                "system_prompt_path": self.llm.system_prompt_path,
            },
            "enhancement": {
                "mode": self.enhancement.mode,
                "temperature": self.enhancement.temperature,
                "timeout_secs": self.enhancement.timeout_secs,
            },
            "fleet": {
                "base_url": self.fleet.base_url,
                "timeout_secs": self.fleet.timeout_secs,
            },
            "tools": {
                "enabled": self.tools.enabled,
                "read_only": self.tools.read_only,
            },
            "conversation": {
                "retention_turns": self.conversation.retention_turns,
                "context_turns": self.conversation.context_turns,
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(system_prompt_path) = llm.system_prompt_path {
                self.llm.system_prompt_path = Some(system_prompt_path);
            }
        }

        if let Some(enhancement) = patch.enhancement {
            if let Some(mode) = enhancement.mode {
                self.enhancement.mode = mode;
            }
            if let Some(temperature) = enhancement.temperature {
                self.enhancement.temperature = temperature;
            }
            if let Some(timeout_secs) = enhancement.timeout_secs {
                self.enhancement.timeout_secs = timeout_secs;
            }
        }

        if let Some(fleet) = patch.fleet {
            if let Some(base_url) = fleet.base_url {
                self.fleet.base_url = base_url;
            }
            if let Some(timeout_secs) = fleet.timeout_secs {
                self.fleet.timeout_secs = timeout_secs;
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(enabled) = tools.enabled {
                self.tools.enabled = enabled;
            }
            if let Some(read_only) = tools.read_only {
                self.tools.read_only = read_only;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(retention_turns) = conversation.retention_turns {
                self.conversation.retention_turns = retention_turns;
            }
            if let Some(context_turns) = conversation.context_turns {
                self.conversation.context_turns = context_turns;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FLEETCHAT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("FLEETCHAT_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FLEETCHAT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("FLEETCHAT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("FLEETCHAT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("FLEETCHAT_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("FLEETCHAT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FLEETCHAT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FLEETCHAT_LLM_SYSTEM_PROMPT_PATH") {
            self.llm.system_prompt_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("FLEETCHAT_ENHANCEMENT_MODE") {
            self.enhancement.mode = value.parse()?;
        }
        if let Some(value) = read_env("FLEETCHAT_ENHANCEMENT_TIMEOUT_SECS") {
            self.enhancement.timeout_secs =
                parse_u64("FLEETCHAT_ENHANCEMENT_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLEETCHAT_FLEET_BASE_URL") {
            self.fleet.base_url = value;
        }
        if let Some(value) = read_env("FLEETCHAT_FLEET_TIMEOUT_SECS") {
            self.fleet.timeout_secs = parse_u64("FLEETCHAT_FLEET_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLEETCHAT_TOOLS_ENABLED") {
            self.tools.enabled = parse_bool("FLEETCHAT_TOOLS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FLEETCHAT_TOOLS_READ_ONLY") {
            self.tools.read_only = parse_bool("FLEETCHAT_TOOLS_READ_ONLY", &value)?;
        }

        if let Some(value) = read_env("FLEETCHAT_CONVERSATION_RETENTION_TURNS") {
            self.conversation.retention_turns =
                parse_usize("FLEETCHAT_CONVERSATION_RETENTION_TURNS", &value)?;
        }
        if let Some(value) = read_env("FLEETCHAT_CONVERSATION_CONTEXT_TURNS") {
            self.conversation.context_turns =
                parse_usize("FLEETCHAT_CONVERSATION_CONTEXT_TURNS", &value)?;
        }

        if let Some(value) = read_env("FLEETCHAT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FLEETCHAT_SERVER_PORT") {
            self.server.port = parse_u16("FLEETCHAT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FLEETCHAT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FLEETCHAT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("FLEETCHAT_LOGGING_LEVEL").or_else(|| read_env("FLEETCHAT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FLEETCHAT_LOGGING_FORMAT").or_else(|| read_env("FLEETCHAT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(fleet_base_url) = overrides.fleet_base_url {
            self.fleet.base_url = fleet_base_url;
        }
        if let Some(enhancement_mode) = overrides.enhancement_mode {
            self.enhancement.mode = enhancement_mode;
        }
        if let Some(read_only) = overrides.tools_read_only {
            self.tools.read_only = read_only;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_enhancement(&self.enhancement)?;
        validate_fleet(&self.fleet)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("fleetchat.toml"), PathBuf::from("config/fleetchat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_temperature(key: &str, temperature: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Validation(format!("{key} must be in range 0.0..=2.0")));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;
    validate_temperature("llm.temperature", llm.temperature)?;

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set FLEETCHAT_LLM_API_KEY or OPENAI_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_enhancement(enhancement: &EnhancementConfig) -> Result<(), ConfigError> {
    validate_timeout("enhancement.timeout_secs", enhancement.timeout_secs)?;
    validate_temperature("enhancement.temperature", enhancement.temperature)
}

fn validate_fleet(fleet: &FleetConfig) -> Result<(), ConfigError> {
    if !is_http_url(&fleet.base_url) {
        return Err(ConfigError::Validation(
            "fleet.base_url must start with http:// or https://".to_string(),
        ));
    }
    validate_timeout("fleet.timeout_secs", fleet.timeout_secs)
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.retention_turns == 0 {
        return Err(ConfigError::Validation(
            "conversation.retention_turns must be greater than zero".to_string(),
        ));
    }
    if conversation.context_turns == 0
        || conversation.context_turns > conversation.retention_turns
    {
        return Err(ConfigError::Validation(
            "conversation.context_turns must be in range 1..=conversation.retention_turns"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    enhancement: Option<EnhancementPatch>,
    fleet: Option<FleetPatch>,
    tools: Option<ToolsPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    system_prompt_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct EnhancementPatch {
    mode: Option<EnhancementMode>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FleetPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    enabled: Option<bool>,
    read_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    retention_turns: Option<usize>,
    context_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, EnhancementMode, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_match_reference_windows() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.conversation.retention_turns == 20, "retention defaults to 20 turns")?;
        ensure(config.conversation.context_turns == 6, "context defaults to 6 turns")?;
        ensure(
            config.enhancement.mode == EnhancementMode::Deterministic,
            "enhancement defaults to deterministic rendering",
        )?;
        ensure(config.llm.provider == LlmProvider::Ollama, "provider defaults to ollama")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_FLEETCHAT_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("fleetchat.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
api_key = "${TEST_FLEETCHAT_API_KEY}"
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .llm
                    .api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "sk-from-env")
                    .unwrap_or(false),
                "api key should be interpolated from environment",
            )?;
            ensure(config.llm.model == "gpt-4o-mini", "model should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_FLEETCHAT_API_KEY"]);
        result
    }

    #[test]
    fn unterminated_interpolation_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("fleetchat.toml");
        fs::write(&path, "[fleet]\nbase_url = \"${FLEET_URL\"\n").map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(result, Err(ConfigError::UnterminatedInterpolation)),
            "unterminated interpolation should fail",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FLEETCHAT_LOG_LEVEL", "warn");
        env::set_var("FLEETCHAT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["FLEETCHAT_LOG_LEVEL", "FLEETCHAT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FLEETCHAT_FLEET_BASE_URL", "http://from-env:8000");
        env::set_var("FLEETCHAT_CONVERSATION_RETENTION_TURNS", "30");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("fleetchat.toml");
            fs::write(
                &path,
                r#"
[fleet]
base_url = "http://from-file:8000"

[conversation]
retention_turns = 10
context_turns = 4

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.fleet.base_url == "http://from-env:8000", "env fleet url should win")?;
            ensure(config.conversation.retention_turns == 30, "env retention should win")?;
            ensure(config.conversation.context_turns == 4, "file context turns should apply")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["FLEETCHAT_FLEET_BASE_URL", "FLEETCHAT_CONVERSATION_RETENTION_TURNS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FLEETCHAT_CONVERSATION_CONTEXT_TURNS", "40");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("conversation.context_turns")
            );
            ensure(has_message, "validation failure should mention conversation.context_turns")
        })();

        clear_vars(&["FLEETCHAT_CONVERSATION_CONTEXT_TURNS"]);
        result
    }

    #[test]
    fn openai_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let mentions_key = matches!(
            result,
            Err(ConfigError::Validation(ref message)) if message.contains("llm.api_key")
        );
        ensure(mentions_key, "missing api key should be reported")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug_or_summary() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FLEETCHAT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            let summary = config.redacted_summary().to_string();

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(!summary.contains("sk-secret-value"), "summary should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["FLEETCHAT_LLM_API_KEY"]);
        result
    }
}
