use super::types::{HardshellConfig, LogFormat, RunMode};

impl Default for HardshellConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::DryRun,
            tag: "all_rules".to_string(),
            script_name: "hardening".to_string(),
            rules_dir: "rules".into(),
            run_state_dir: std::env::temp_dir().join("hardshell"),
            keep_runs: 10,
            log_format: LogFormat::Human,
            baseline_minimum_version: None,
            baseline_enforce: false,
        }
    }
}
