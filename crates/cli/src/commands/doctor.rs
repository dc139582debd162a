use fleetchat_agent::runtime::AgentRuntime;
use fleetchat_core::config::{AppConfig, EnhancementMode, LoadOptions};
use serde::Serialize;

use crate::commands::{escape_json, CommandResult, CONFIG_FAILURE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    tools: Vec<String>,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let (report, config_failed) = build_report(options);

    let exit_code = if config_failed {
        CONFIG_FAILURE
    } else if report.overall_status == CheckStatus::Pass {
        0
    } else {
        1
    };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::raw(exit_code, output)
}

fn build_report(options: LoadOptions) -> (DoctorReport, bool) {
    let mut checks = Vec::new();
    let mut tools = Vec::new();
    let mut config_failed = false;

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_tool_policy(&config));

            match AgentRuntime::from_config(&config) {
                Ok(runtime) => {
                    tools = runtime.registry().names().map(str::to_string).collect();
                    checks.push(check_tool_registry(tools.len()));
                    checks.push(DoctorCheck {
                        name: "system_prompt",
                        status: CheckStatus::Pass,
                        details: format!("{} characters", runtime.system_prompt().len()),
                    });
                }
                Err(error) => {
                    checks.push(DoctorCheck {
                        name: "tool_registry",
                        status: CheckStatus::Fail,
                        details: error.to_string(),
                    });
                }
            }
        }
        Err(error) => {
            config_failed = true;
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "tool_registry",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    (DoctorReport { overall_status, summary, tools, checks }, config_failed)
}

fn check_tool_policy(config: &AppConfig) -> DoctorCheck {
    let mode = match config.enhancement.mode {
        EnhancementMode::Deterministic => "deterministic",
        EnhancementMode::Oracle => "oracle",
    };
    let details = match (config.tools.enabled, config.tools.read_only) {
        (false, _) => format!("tool dispatch disabled; enhancement mode {mode}"),
        (true, true) => format!("read-only tools; enhancement mode {mode}"),
        (true, false) => format!("all tools enabled; enhancement mode {mode}"),
    };
    DoctorCheck { name: "tool_policy", status: CheckStatus::Pass, details }
}

fn check_tool_registry(count: usize) -> DoctorCheck {
    if count == 0 {
        return DoctorCheck {
            name: "tool_registry",
            status: CheckStatus::Fail,
            details: "no tools registered".to_string(),
        };
    }
    DoctorCheck {
        name: "tool_registry",
        status: CheckStatus::Pass,
        details: format!("{count} tools registered"),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }
    if !report.tools.is_empty() {
        lines.push(format!("tools: {}", report.tools.join(", ")));
    }

    lines.join("\n")
}
