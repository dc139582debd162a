use std::process::ExitCode;

fn main() -> ExitCode {
    fleetchat_cli::run()
}
