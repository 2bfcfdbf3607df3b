use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use catalog::SecurityRule;
use classifier::{classify, SecurityStatus};
use ledger::{now_unix_secs, ChangeRecord, LedgerWriter, PlannedAction, RunStatus};

/// Captured result of one spawned command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// Combined text the token classifier inspects. Some probes report on
    /// stderr, so both streams count.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Capability seam for spawning host commands. Production code uses
/// [`ShellCommandRunner`]; tests substitute scripted fakes.
pub trait CommandRunner {
    fn run(&self, command: &str) -> std::io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &str) -> std::io::Result<CommandOutput> {
        (**self).run(command)
    }
}

#[derive(Debug, Default)]
pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn run(&self, command: &str) -> std::io::Result<CommandOutput> {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Live,
}

/// Terminal per-rule state after one pass of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDisposition {
    /// Check output already matched the expected tokens.
    Compliant,
    /// Non-compliant but the fix is a manual sentinel; never executed.
    ManualRequired,
    /// Non-compliant; fix recorded in the plan ledger instead of running.
    Planned,
    /// Fix executed and the re-run check confirmed the outcome.
    Verified,
    /// Fix was rejected by vetting, failed to run, or exited non-zero.
    RemediationFailed,
    /// The check command could not be spawned at all.
    Unknown,
}

/// One rule's evaluation record, owned by the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub status: SecurityStatus,
    pub raw_output: String,
    pub remediated: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub outcome: RuleOutcome,
    pub disposition: RuleDisposition,
}

/// Summary of one engine invocation.
#[derive(Debug)]
pub struct RunReport {
    pub evaluations: Vec<RuleEvaluation>,
    pub error_count: usize,
    pub status: RunStatus,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.evaluations.iter().map(|eval| &eval.outcome)
    }
}

/// Reject fix text containing shell control characters. Fixes run verbatim
/// under `sh -c`, so composition operators in rule data are treated as
/// injection attempts rather than commands.
pub fn vet_fix_command(fix: &str) -> Result<(), String> {
    const FORBIDDEN: [char; 7] = [';', '|', '&', '>', '<', '`', '$'];
    for ch in fix.chars() {
        if ch == '\n' || ch == '\r' {
            return Err("fix command contains a newline".to_string());
        }
        if FORBIDDEN.contains(&ch) {
            return Err(format!("fix command contains forbidden character '{}'", ch));
        }
    }
    Ok(())
}

/// Derive an inverse command for a `defaults write <domain> <key> ...` fix.
/// Anything else has no generic inverse and the change is recorded as
/// irreversible.
pub fn derive_rollback(fix: &str) -> Option<String> {
    let mut parts = fix.split_whitespace();
    if parts.next() != Some("defaults") || parts.next() != Some("write") {
        return None;
    }
    let domain = parts.next()?;
    let key = parts.next()?;
    Some(format!("defaults delete {} {}", domain, key))
}

/// Terminal run status: errors dominate, then mode, then whether anything
/// actually changed.
pub fn resolve_run_status(error_count: usize, mode: Mode, change_count: usize) -> RunStatus {
    if error_count > 0 {
        RunStatus::Failed
    } else if mode == Mode::DryRun {
        RunStatus::DryRun
    } else if change_count == 0 {
        RunStatus::AlreadyCompliant
    } else {
        RunStatus::AppliedChanges
    }
}

/// Sequential rule evaluator. Checks always re-execute; nothing is cached,
/// so a second run against an unchanged host appends zero change records.
pub struct Engine<R> {
    runner: R,
    mode: Mode,
}

impl<R: CommandRunner> Engine<R> {
    pub fn new(runner: R, mode: Mode) -> Self {
        Self { runner, mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Evaluate `rules` in order, appending to `ledger` as dispositions
    /// demand, and finalize the ledger with the resolved status. Ledger
    /// write failures are fatal; per-rule command failures are not.
    pub fn run(
        &self,
        rules: &[&SecurityRule],
        ledger: &mut LedgerWriter,
    ) -> ledger::Result<RunReport> {
        let mut evaluations = Vec::with_capacity(rules.len());
        let mut error_count = 0usize;

        for rule in rules {
            let evaluation = self.evaluate_rule(rule, ledger, &mut error_count)?;
            debug!(
                rule_id = %evaluation.outcome.rule_id,
                status = %evaluation.outcome.status,
                disposition = ?evaluation.disposition,
                "rule evaluated"
            );
            evaluations.push(evaluation);
        }

        let status = resolve_run_status(error_count, self.mode, ledger.change_count());
        ledger.finalize(status)?;
        info!(
            rules = evaluations.len(),
            errors = error_count,
            changes = ledger.change_count(),
            planned = ledger.plan_count(),
            status = %status,
            "run complete"
        );
        Ok(RunReport {
            evaluations,
            error_count,
            status,
        })
    }

    fn evaluate_rule(
        &self,
        rule: &SecurityRule,
        ledger: &mut LedgerWriter,
        error_count: &mut usize,
    ) -> ledger::Result<RuleEvaluation> {
        let check = match self.runner.run(&rule.check) {
            Ok(output) => output,
            Err(err) => {
                warn!(rule_id = %rule.id, error = %err, "check command failed to run");
                *error_count += 1;
                return Ok(RuleEvaluation {
                    outcome: outcome(rule, SecurityStatus::Unknown, err.to_string(), false),
                    disposition: RuleDisposition::Unknown,
                });
            }
        };

        let raw_output = check.combined();
        let status = classify(&raw_output, &rule.result);
        if status == SecurityStatus::Secure {
            return Ok(RuleEvaluation {
                outcome: outcome(rule, status, raw_output, false),
                disposition: RuleDisposition::Compliant,
            });
        }

        if !rule.has_executable_fix() {
            warn!(rule_id = %rule.id, "non-compliant rule requires manual remediation");
            return Ok(RuleEvaluation {
                outcome: outcome(rule, status, raw_output, false),
                disposition: RuleDisposition::ManualRequired,
            });
        }

        if self.mode == Mode::DryRun {
            ledger.append_plan(PlannedAction {
                component: rule.id.clone(),
                action: format!("would remediate '{}'", rule.title),
                command: rule.fix.clone(),
                timestamp: now_unix_secs(),
            })?;
            return Ok(RuleEvaluation {
                outcome: outcome(rule, status, raw_output, false),
                disposition: RuleDisposition::Planned,
            });
        }

        self.remediate(rule, status, raw_output, ledger, error_count)
    }

    fn remediate(
        &self,
        rule: &SecurityRule,
        checked_status: SecurityStatus,
        raw_output: String,
        ledger: &mut LedgerWriter,
        error_count: &mut usize,
    ) -> ledger::Result<RuleEvaluation> {
        if let Err(reason) = vet_fix_command(&rule.fix) {
            warn!(rule_id = %rule.id, reason, "fix rejected by vetting");
            *error_count += 1;
            return Ok(RuleEvaluation {
                outcome: outcome(rule, checked_status, raw_output, false),
                disposition: RuleDisposition::RemediationFailed,
            });
        }

        let fixed = match self.runner.run(&rule.fix) {
            Ok(output) if output.success => true,
            Ok(output) => {
                warn!(rule_id = %rule.id, stderr = %output.stderr, "fix exited non-zero");
                false
            }
            Err(err) => {
                warn!(rule_id = %rule.id, error = %err, "fix command failed to run");
                false
            }
        };
        if !fixed {
            *error_count += 1;
            return Ok(RuleEvaluation {
                outcome: outcome(rule, checked_status, raw_output, false),
                disposition: RuleDisposition::RemediationFailed,
            });
        }

        let rollback = derive_rollback(&rule.fix).unwrap_or_default();
        ledger.append_change(ChangeRecord {
            component: rule.id.clone(),
            detail: format!("applied fix for '{}'", rule.title),
            rollback_command: rollback,
            timestamp: now_unix_secs(),
        })?;

        // Re-run the check so the outcome reflects the post-fix state.
        let (verified_status, verified_output) = match self.runner.run(&rule.check) {
            Ok(output) => {
                let combined = output.combined();
                (classify(&combined, &rule.result), combined)
            }
            Err(err) => {
                warn!(rule_id = %rule.id, error = %err, "post-fix check failed to run");
                *error_count += 1;
                (SecurityStatus::Unknown, err.to_string())
            }
        };
        info!(rule_id = %rule.id, status = %verified_status, "remediation applied");
        Ok(RuleEvaluation {
            outcome: outcome(rule, verified_status, verified_output, true),
            disposition: RuleDisposition::Verified,
        })
    }
}

fn outcome(
    rule: &SecurityRule,
    status: SecurityStatus,
    raw_output: String,
    remediated: bool,
) -> RuleOutcome {
    RuleOutcome {
        rule_id: rule.id.clone(),
        status,
        raw_output,
        remediated,
        timestamp: now_unix_secs(),
    }
}
