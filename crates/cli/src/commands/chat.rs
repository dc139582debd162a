use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use fleetchat_agent::runtime::{AgentRuntime, TurnRequest};
use fleetchat_core::config::{AppConfig, LoadOptions, LogFormat};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use crate::commands::{CommandResult, CONFIG_FAILURE};

pub const FORM_PREFIX: &str = "FORM:";
pub const FORM_UTTERANCE: &str = "Form submitted";

/// One line of operator input, classified.
#[derive(Debug, PartialEq)]
pub enum SessionInput {
    Quit,
    Skip,
    Utterance(String),
    Form(Map<String, Value>),
    InvalidForm(String),
}

pub fn parse_line(line: &str) -> SessionInput {
    let line = line.trim();
    if line.is_empty() {
        return SessionInput::Skip;
    }
    if matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit" | "q") {
        return SessionInput::Quit;
    }

    let Some(raw_form) = line.strip_prefix(FORM_PREFIX) else {
        return SessionInput::Utterance(line.to_string());
    };
    match serde_json::from_str::<Value>(raw_form.trim()) {
        Ok(Value::Object(form)) => SessionInput::Form(form),
        Ok(other) => SessionInput::InvalidForm(format!("expected a JSON object, got `{other}`")),
        Err(error) => SessionInput::InvalidForm(error.to_string()),
    }
}

pub fn run(options: LoadOptions, conversation_id: Option<String>) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("config validation failed: {error}"),
                CONFIG_FAILURE,
            );
        }
    };
    init_logging(&config);

    let runtime = match AgentRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("chat", "runtime_build", error.to_string(), 1),
    };

    let executor = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(executor) => executor,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_build",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match executor.block_on(run_session(&runtime, stdin.lock(), &mut stdout, conversation_id)) {
        Ok(_) => CommandResult::raw(0, ""),
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), 1),
    }
}

/// Drive turns from `input` until EOF or a quit word. Returns the number of
/// turns submitted to the runtime.
pub async fn run_session<R, W>(
    runtime: &AgentRuntime,
    input: R,
    output: &mut W,
    mut conversation_id: Option<String>,
) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "Fleetchat interactive session ({} tools).", runtime.registry().len())?;
    writeln!(output, "Type a request, `{FORM_PREFIX} {{json}}` to submit a form, or `quit` to exit.")?;

    let mut turns = 0;
    let mut lines = input.lines();
    loop {
        write!(output, "\nyou> ")?;
        output.flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read from input")?;

        let request = match parse_line(&line) {
            SessionInput::Quit => break,
            SessionInput::Skip => continue,
            SessionInput::InvalidForm(reason) => {
                writeln!(output, "invalid form data: {reason}")?;
                continue;
            }
            SessionInput::Utterance(utterance) => TurnRequest::new(utterance),
            SessionInput::Form(form) => TurnRequest::new(FORM_UTTERANCE).with_form_data(form),
        };
        let request = match &conversation_id {
            Some(id) => request.in_conversation(id.clone()),
            None => request,
        };

        let response = runtime.handle_turn(request).await;
        turns += 1;

        let decision = &response.decision;
        writeln!(output, "assistant> {}", decision.message)?;
        if let Some(tool) = &decision.tool {
            writeln!(output, "  tool: {tool}")?;
        }
        writeln!(output, "  ui components: {}", decision.components.len())?;

        conversation_id.get_or_insert(response.conversation_id);
    }

    writeln!(output, "Goodbye!")?;
    Ok(turns)
}

fn init_logging(config: &AppConfig) {
    // Logs go to stderr so they never interleave with the session transcript.
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Some(notice) = logging_failure_notice(installed) {
        eprintln!("{notice}");
    }
}

fn logging_failure_notice<E: std::fmt::Display>(installed: Result<(), E>) -> Option<String> {
    installed.err().map(|error| format!("fleetchat: logging disabled, subscriber init failed: {error}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{logging_failure_notice, parse_line, SessionInput};

    #[test]
    fn quit_words_are_case_insensitive() {
        for word in ["quit", "EXIT", "q", "  Quit  "] {
            assert_eq!(parse_line(word), SessionInput::Quit);
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), SessionInput::Skip);
        assert_eq!(parse_line("   "), SessionInput::Skip);
    }

    #[test]
    fn form_lines_carry_object_payloads() {
        let parsed = parse_line(r#"FORM: {"cab_model_name": "Tesla Model 3", "cab_reg_name": "TN05XY9999"}"#);

        let SessionInput::Form(form) = parsed else {
            panic!("expected a form submission");
        };
        assert_eq!(form.get("cab_model_name"), Some(&json!("Tesla Model 3")));
    }

    #[test]
    fn malformed_or_non_object_forms_are_rejected() {
        assert!(matches!(parse_line("FORM: {not json"), SessionInput::InvalidForm(_)));
        assert!(matches!(parse_line("FORM: [1, 2]"), SessionInput::InvalidForm(_)));
    }

    #[test]
    fn subscriber_init_failure_is_reported() {
        let first = tracing_subscriber::fmt().with_writer(std::io::sink).try_init();
        let second = tracing_subscriber::fmt().with_writer(std::io::sink).try_init();
        // Only one global subscriber can be installed per process.
        assert!(first.is_err() || second.is_err());

        let failed = if first.is_err() { first } else { second };
        let notice = logging_failure_notice(failed).expect("failure produces a notice");
        assert!(notice.starts_with("fleetchat: logging disabled"));
        assert_eq!(logging_failure_notice(Ok::<(), String>(())), None);
    }

    #[test]
    fn other_lines_are_utterances() {
        assert_eq!(parse_line("Show all cabs"), SessionInput::Utterance("Show all cabs".to_string()));
    }
}
