pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fleetchat_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "fleetchat",
    about = "Fleetchat operator CLI",
    long_about = "Chat with the fleet assistant from a terminal, inspect effective configuration, and run readiness checks.",
    after_help = "Examples:\n  fleetchat chat\n  fleetchat config\n  fleetchat doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a fleetchat.toml file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session against the configured oracle and fleet API")]
    Chat {
        #[arg(long, help = "Resume turns under an explicit conversation id")]
        conversation_id: Option<String>,
    },
    #[command(about = "Print the effective configuration as JSON with secrets redacted")]
    Config,
    #[command(about = "Validate configuration and summarize the tool registry")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            ..LoadOptions::default()
        }
    }
}

pub fn run() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Chat { conversation_id } => commands::chat::run(options, conversation_id),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
