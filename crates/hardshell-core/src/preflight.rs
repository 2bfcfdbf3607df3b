use engine::CommandRunner;
use tracing::{info, warn};

use crate::config::{HardshellConfig, RunMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightStatus {
    Pass,
    Warn,
    Fail,
}

/// One environment check run before any rule executes. A `required` check
/// that fails aborts the run.
#[derive(Debug, Clone)]
pub struct PreflightCheck {
    pub name: &'static str,
    pub status: PreflightStatus,
    pub detail: String,
    pub required: bool,
}

pub fn run_preflight<R: CommandRunner>(config: &HardshellConfig, runner: &R) -> Vec<PreflightCheck> {
    let checks = vec![
        check_rules_dir(config),
        check_platform(runner),
        check_defaults_tool(runner),
        check_privileges(config, runner),
    ];
    for check in &checks {
        match check.status {
            PreflightStatus::Pass => {
                info!(name = check.name, detail = %check.detail, "preflight pass")
            }
            PreflightStatus::Warn => {
                warn!(name = check.name, detail = %check.detail, "preflight warning")
            }
            PreflightStatus::Fail => {
                warn!(name = check.name, required = check.required, detail = %check.detail, "preflight failure")
            }
        }
    }
    checks
}

pub fn has_required_failure(checks: &[PreflightCheck]) -> bool {
    checks
        .iter()
        .any(|c| c.required && c.status == PreflightStatus::Fail)
}

fn check_rules_dir(config: &HardshellConfig) -> PreflightCheck {
    if config.rules_dir.is_dir() {
        PreflightCheck {
            name: "rules_dir",
            status: PreflightStatus::Pass,
            detail: format!("rule store at {}", config.rules_dir.display()),
            required: true,
        }
    } else {
        PreflightCheck {
            name: "rules_dir",
            status: PreflightStatus::Fail,
            detail: format!("rule store {} not found", config.rules_dir.display()),
            required: true,
        }
    }
}

fn check_platform<R: CommandRunner>(runner: &R) -> PreflightCheck {
    match runner.run("uname -s") {
        Ok(output) if output.stdout.contains("Darwin") => PreflightCheck {
            name: "platform",
            status: PreflightStatus::Pass,
            detail: "macOS host".to_string(),
            required: false,
        },
        Ok(output) => PreflightCheck {
            name: "platform",
            status: PreflightStatus::Warn,
            detail: format!("not macOS: {}", output.stdout.trim()),
            required: false,
        },
        Err(err) => PreflightCheck {
            name: "platform",
            status: PreflightStatus::Warn,
            detail: format!("could not probe platform: {}", err),
            required: false,
        },
    }
}

fn check_defaults_tool<R: CommandRunner>(runner: &R) -> PreflightCheck {
    match runner.run("command -v defaults") {
        Ok(output) if output.success => PreflightCheck {
            name: "defaults_tool",
            status: PreflightStatus::Pass,
            detail: output.stdout.trim().to_string(),
            required: false,
        },
        _ => PreflightCheck {
            name: "defaults_tool",
            status: PreflightStatus::Warn,
            detail: "defaults not on PATH; preference fixes will fail".to_string(),
            required: false,
        },
    }
}

/// Live remediation needs root; dry-run only warns.
fn check_privileges<R: CommandRunner>(config: &HardshellConfig, runner: &R) -> PreflightCheck {
    let required = config.mode == RunMode::Live;
    match runner.run("id -u") {
        Ok(output) if output.stdout.trim() == "0" => PreflightCheck {
            name: "privileges",
            status: PreflightStatus::Pass,
            detail: "running as root".to_string(),
            required,
        },
        Ok(output) => PreflightCheck {
            name: "privileges",
            status: if required {
                PreflightStatus::Fail
            } else {
                PreflightStatus::Warn
            },
            detail: format!("running as uid {}", output.stdout.trim()),
            required,
        },
        Err(err) => PreflightCheck {
            name: "privileges",
            status: if required {
                PreflightStatus::Fail
            } else {
                PreflightStatus::Warn
            },
            detail: format!("could not determine uid: {}", err),
            required,
        },
    }
}
