use anyhow::{Context, Result};
use tracing::{info, info_span, warn};

use catalog::{parse_major_version, RuleCatalog};
use classifier::{baseline_status, SecurityStatus};
use engine::{CommandRunner, Engine, RuleDisposition, ShellCommandRunner};
use ledger::{LedgerWriter, RunStatus};

use crate::config::HardshellConfig;
use crate::preflight;

pub fn execute(config: &HardshellConfig) -> Result<RunStatus> {
    let runner = ShellCommandRunner;
    execute_with(config, &runner)
}

/// One full run: preflight, baseline gate, rule selection, engine pass,
/// ledger cleanup. Returns the terminal status; the caller maps it to an
/// exit code.
pub fn execute_with<R: CommandRunner>(config: &HardshellConfig, runner: &R) -> Result<RunStatus> {
    // Every log line from the run carries the script name.
    let span = info_span!("run", script = %config.script_name);
    let _guard = span.enter();

    let checks = preflight::run_preflight(config, runner);
    if preflight::has_required_failure(&checks) {
        warn!("required preflight check failed; aborting before execution");
        return Ok(RunStatus::Failed);
    }

    let os_version = probe_os_version(runner);
    if let Some(minimum) = &config.baseline_minimum_version {
        match gate_baseline(os_version.as_deref(), minimum, config.baseline_enforce) {
            SecurityStatus::Critical => {
                warn!(minimum, "host below mandatory baseline; aborting");
                return Ok(RunStatus::Failed);
            }
            status => {
                if status != SecurityStatus::Secure {
                    warn!(minimum, status = %status, "baseline not confirmed; proceeding");
                }
            }
        }
    }

    let catalog = RuleCatalog::load_dir(&config.rules_dir).with_context(|| {
        format!("failed loading rule store {}", config.rules_dir.display())
    })?;
    let target_major = os_version.as_deref().and_then(parse_major_version);
    let rules = catalog.select(&config.tag, target_major);
    if rules.is_empty() {
        warn!(tag = %config.tag, "no rules matched the requested tag");
    }

    let mut ledger = LedgerWriter::begin_run(&config.run_state_dir, &config.script_name)
        .context("failed creating run ledgers")?;
    let engine = Engine::new(runner, config.mode.engine_mode());
    let report = engine
        .run(&rules, &mut ledger)
        .context("failed persisting run ledgers")?;

    for evaluation in &report.evaluations {
        if evaluation.disposition == RuleDisposition::ManualRequired {
            warn!(
                rule_id = %evaluation.outcome.rule_id,
                "rule requires manual remediation"
            );
        }
    }
    info!(
        rollback_ledger = %ledger.rollback_path().display(),
        plan_ledger = %ledger.plan_path().display(),
        "ledgers written"
    );

    if let Err(err) = ledger::cleanup_old_runs(&config.run_state_dir, config.keep_runs) {
        warn!(error = %err, "run-state cleanup failed");
    }

    Ok(report.status)
}

fn probe_os_version<R: CommandRunner>(runner: &R) -> Option<String> {
    match runner.run("sw_vers -productVersion") {
        Ok(output) if output.success => {
            let version = output.stdout.trim().to_string();
            if version.is_empty() {
                None
            } else {
                Some(version)
            }
        }
        Ok(output) => {
            warn!(stderr = %output.stderr.trim(), "version probe exited non-zero");
            None
        }
        Err(err) => {
            warn!(error = %err, "could not probe OS version");
            None
        }
    }
}

fn gate_baseline(current: Option<&str>, minimum: &str, enforce: bool) -> SecurityStatus {
    match current {
        Some(version) => baseline_status(version, minimum, enforce),
        None => SecurityStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use engine::CommandOutput;
    use tempfile::TempDir;

    use crate::config::RunMode;

    struct MapRunner {
        outputs: HashMap<&'static str, &'static str>,
    }

    impl MapRunner {
        fn new(entries: &[(&'static str, &'static str)]) -> Self {
            let mut outputs = HashMap::from([
                ("uname -s", "Darwin\n"),
                ("command -v defaults", "/usr/bin/defaults\n"),
                ("id -u", "0\n"),
                ("sw_vers -productVersion", "26.3\n"),
            ]);
            outputs.extend(entries.iter().copied());
            Self { outputs }
        }
    }

    impl CommandRunner for MapRunner {
        fn run(&self, command: &str) -> std::io::Result<CommandOutput> {
            let stdout = self
                .outputs
                .get(command)
                .unwrap_or_else(|| panic!("unscripted command: {}", command));
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                success: true,
            })
        }
    }

    fn write_rule(dir: &TempDir, file: &str, body: &str) {
        std::fs::write(dir.path().join(file), body).expect("write rule");
    }

    fn test_config(rules: &TempDir, state: &TempDir, mode: RunMode) -> HardshellConfig {
        HardshellConfig {
            mode,
            rules_dir: rules.path().to_path_buf(),
            run_state_dir: state.path().to_path_buf(),
            ..Default::default()
        }
    }

    const FIREWALL_RULE: &str = "\
id: firewall_enable
title: Enable the application firewall
severity: high
check: check-firewall
fix: defaults write com.apple.alf globalstate -int 1
tags:
  - firewall
result:
  - enabled
";

    #[test]
    fn dry_run_plans_and_writes_both_ledgers() {
        let rules = TempDir::new().expect("tempdir");
        let state = TempDir::new().expect("tempdir");
        write_rule(&rules, "firewall_enable.yaml", FIREWALL_RULE);
        let config = test_config(&rules, &state, RunMode::DryRun);
        let runner = MapRunner::new(&[("check-firewall", "disabled\n")]);

        let status = execute_with(&config, &runner).expect("run");
        assert_eq!(status, RunStatus::DryRun);

        let names: Vec<String> = std::fs::read_dir(state.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("_plan.json")));
        assert!(names.iter().any(|n| n.ends_with("_rollback.json")));
    }

    #[test]
    fn compliant_host_reports_already_compliant() {
        let rules = TempDir::new().expect("tempdir");
        let state = TempDir::new().expect("tempdir");
        write_rule(&rules, "firewall_enable.yaml", FIREWALL_RULE);
        let config = test_config(&rules, &state, RunMode::Live);
        let runner = MapRunner::new(&[("check-firewall", "enabled\n")]);

        let status = execute_with(&config, &runner).expect("run");
        assert_eq!(status, RunStatus::AlreadyCompliant);
        assert_eq!(status.exit_code(), 10);
    }

    #[test]
    fn enforced_baseline_miss_aborts_before_any_ledger() {
        let rules = TempDir::new().expect("tempdir");
        let state = TempDir::new().expect("tempdir");
        write_rule(&rules, "firewall_enable.yaml", FIREWALL_RULE);
        let mut config = test_config(&rules, &state, RunMode::Live);
        config.baseline_minimum_version = Some("27.0".to_string());
        config.baseline_enforce = true;
        let runner = MapRunner::new(&[]);

        let status = execute_with(&config, &runner).expect("run");
        assert_eq!(status, RunStatus::Failed);
        assert_eq!(
            std::fs::read_dir(state.path()).expect("read dir").count(),
            0
        );
    }

    #[test]
    fn unenforced_baseline_miss_proceeds() {
        let rules = TempDir::new().expect("tempdir");
        let state = TempDir::new().expect("tempdir");
        write_rule(&rules, "firewall_enable.yaml", FIREWALL_RULE);
        let mut config = test_config(&rules, &state, RunMode::Live);
        config.baseline_minimum_version = Some("27.0".to_string());
        let runner = MapRunner::new(&[("check-firewall", "enabled\n")]);

        let status = execute_with(&config, &runner).expect("run");
        assert_eq!(status, RunStatus::AlreadyCompliant);
    }

    #[test]
    fn version_incompatible_rules_are_skipped() {
        let rules = TempDir::new().expect("tempdir");
        let state = TempDir::new().expect("tempdir");
        write_rule(
            &rules,
            "legacy_only.yaml",
            "\
id: legacy_only
title: Legacy control
check: check-legacy
fix: manual
macos: \"25\"
result:
  - ok
",
        );
        let config = test_config(&rules, &state, RunMode::Live);
        // check-legacy is deliberately unscripted; a skip must not run it.
        let runner = MapRunner::new(&[]);

        let status = execute_with(&config, &runner).expect("run");
        assert_eq!(status, RunStatus::AlreadyCompliant);
    }

    #[derive(Clone, Default)]
    struct BufferWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl BufferWriter {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8 logs")
        }
    }

    impl std::io::Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BufferWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn json_log_lines_carry_the_script_name() {
        let rules = TempDir::new().expect("tempdir");
        let state = TempDir::new().expect("tempdir");
        write_rule(&rules, "firewall_enable.yaml", FIREWALL_RULE);
        let config = test_config(&rules, &state, RunMode::DryRun);
        let runner = MapRunner::new(&[("check-firewall", "disabled\n")]);

        let buffer = BufferWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(buffer.clone())
            .finish();
        let status = tracing::subscriber::with_default(subscriber, || {
            execute_with(&config, &runner)
        })
        .expect("run");
        assert_eq!(status, RunStatus::DryRun);

        let raw = buffer.contents();
        let mut saw_script = false;
        for line in raw.lines() {
            let value: serde_json::Value = serde_json::from_str(line).expect("json log line");
            assert!(value.get("timestamp").is_some());
            assert!(value.get("level").is_some());
            if value["span"]["script"] == "hardening" {
                saw_script = true;
            }
        }
        assert!(saw_script, "no log line carried the script name: {}", raw);
    }

    #[test]
    fn missing_rule_store_fails_preflight() {
        let state = TempDir::new().expect("tempdir");
        let mut config = HardshellConfig::default();
        config.rules_dir = "/definitely/not/a/real/dir".into();
        config.run_state_dir = state.path().to_path_buf();
        let runner = MapRunner::new(&[]);

        let status = execute_with(&config, &runner).expect("run");
        assert_eq!(status, RunStatus::Failed);
        assert_eq!(status.exit_code(), 1);
    }
}
