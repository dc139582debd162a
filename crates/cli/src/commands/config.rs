use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fleetchat_core::config::{AppConfig, LoadOptions};
use serde_json::{json, Map, Value};

use crate::commands::{CommandResult, CONFIG_FAILURE};

/// Config keys paired with the env vars that can set them. The first env var
/// present wins the attribution.
const ATTRIBUTED_KEYS: &[(&str, &[&str])] = &[
    ("llm.provider", &["FLEETCHAT_LLM_PROVIDER"]),
    ("llm.api_key", &["FLEETCHAT_LLM_API_KEY", "OPENAI_API_KEY"]),
    ("llm.base_url", &["FLEETCHAT_LLM_BASE_URL"]),
    ("llm.model", &["FLEETCHAT_LLM_MODEL"]),
    ("llm.temperature", &["FLEETCHAT_LLM_TEMPERATURE"]),
    ("llm.timeout_secs", &["FLEETCHAT_LLM_TIMEOUT_SECS"]),
    ("llm.system_prompt_path", &["FLEETCHAT_LLM_SYSTEM_PROMPT_PATH"]),
    ("enhancement.mode", &["FLEETCHAT_ENHANCEMENT_MODE"]),
    ("enhancement.timeout_secs", &["FLEETCHAT_ENHANCEMENT_TIMEOUT_SECS"]),
    ("fleet.base_url", &["FLEETCHAT_FLEET_BASE_URL"]),
    ("fleet.timeout_secs", &["FLEETCHAT_FLEET_TIMEOUT_SECS"]),
    ("tools.enabled", &["FLEETCHAT_TOOLS_ENABLED"]),
    ("tools.read_only", &["FLEETCHAT_TOOLS_READ_ONLY"]),
    ("conversation.retention_turns", &["FLEETCHAT_CONVERSATION_RETENTION_TURNS"]),
    ("conversation.context_turns", &["FLEETCHAT_CONVERSATION_CONTEXT_TURNS"]),
    ("server.bind_address", &["FLEETCHAT_SERVER_BIND_ADDRESS"]),
    ("server.port", &["FLEETCHAT_SERVER_PORT"]),
    ("server.graceful_shutdown_secs", &["FLEETCHAT_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ("logging.level", &["FLEETCHAT_LOGGING_LEVEL", "FLEETCHAT_LOG_LEVEL"]),
    ("logging.format", &["FLEETCHAT_LOGGING_FORMAT", "FLEETCHAT_LOG_FORMAT"]),
];

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                CONFIG_FAILURE,
            );
        }
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources: Map<String, Value> = ATTRIBUTED_KEYS
        .iter()
        .map(|(key_path, env_keys)| {
            let source =
                field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
            (key_path.to_string(), Value::String(source))
        })
        .collect();

    let payload = json!({
        "precedence": "overrides > env > file > default",
        "config_file": config_file_path.map(|path| path.display().to_string()),
        "effective": config.redacted_summary(),
        "sources": sources,
    });

    match serde_json::to_string_pretty(&payload) {
        Ok(output) => CommandResult::raw(0, output),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 1),
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("fleetchat.toml"), PathBuf::from("config/fleetchat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<toml::Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<toml::Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&toml::Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &toml::Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn nested_key_paths_resolve_through_tables() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("valid toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "fleet.base_url"));
    }
}
