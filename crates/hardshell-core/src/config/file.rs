use anyhow::{Context, Result};
use serde::Deserialize;

use super::types::HardshellConfig;
use super::util::{env_non_empty, non_empty, parse_log_format, parse_mode};

impl HardshellConfig {
    /// Apply the optional TOML config file named by `HARDSHELL_CONFIG`.
    /// No variable means no file; a named-but-unreadable file is an error.
    pub(super) fn apply_file_config(&mut self) -> Result<bool> {
        let Some(path) = env_non_empty("HARDSHELL_CONFIG") else {
            return Ok(false);
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading config file {}", path))?;
        self.apply_file_str(&raw)
            .with_context(|| format!("failed parsing TOML config {}", path))?;
        Ok(true)
    }

    pub(super) fn apply_file_str(&mut self, raw: &str) -> Result<()> {
        let file_cfg: FileConfig = toml::from_str(raw)?;
        self.apply_file_run(file_cfg.run);
        self.apply_file_rules(file_cfg.rules);
        self.apply_file_state(file_cfg.state);
        self.apply_file_baseline(file_cfg.baseline);
        self.apply_file_logging(file_cfg.logging);
        Ok(())
    }

    fn apply_file_run(&mut self, run: Option<FileRunConfig>) {
        let Some(run) = run else {
            return;
        };
        if let Some(v) = non_empty(run.mode) {
            self.mode = parse_mode(&v);
        }
        if let Some(v) = non_empty(run.tag) {
            self.tag = v;
        }
        if let Some(v) = non_empty(run.script_name) {
            self.script_name = v;
        }
    }

    fn apply_file_rules(&mut self, rules: Option<FileRulesConfig>) {
        let Some(rules) = rules else {
            return;
        };
        if let Some(v) = non_empty(rules.dir) {
            self.rules_dir = v.into();
        }
    }

    fn apply_file_state(&mut self, state: Option<FileStateConfig>) {
        let Some(state) = state else {
            return;
        };
        if let Some(v) = non_empty(state.dir) {
            self.run_state_dir = v.into();
        }
        if let Some(v) = state.keep_runs {
            self.keep_runs = v;
        }
    }

    fn apply_file_baseline(&mut self, baseline: Option<FileBaselineConfig>) {
        let Some(baseline) = baseline else {
            return;
        };
        if let Some(v) = non_empty(baseline.minimum_version) {
            self.baseline_minimum_version = Some(v);
        }
        if let Some(v) = baseline.enforce {
            self.baseline_enforce = v;
        }
    }

    fn apply_file_logging(&mut self, logging: Option<FileLoggingConfig>) {
        let Some(logging) = logging else {
            return;
        };
        if let Some(v) = non_empty(logging.format) {
            self.log_format = parse_log_format(&v);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    run: Option<FileRunConfig>,
    #[serde(default)]
    rules: Option<FileRulesConfig>,
    #[serde(default)]
    state: Option<FileStateConfig>,
    #[serde(default)]
    baseline: Option<FileBaselineConfig>,
    #[serde(default)]
    logging: Option<FileLoggingConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileRunConfig {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    script_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileRulesConfig {
    #[serde(default)]
    dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileStateConfig {
    #[serde(default)]
    dir: Option<String>,
    #[serde(default)]
    keep_runs: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileBaselineConfig {
    #[serde(default)]
    minimum_version: Option<String>,
    #[serde(default)]
    enforce: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileLoggingConfig {
    #[serde(default)]
    format: Option<String>,
}
