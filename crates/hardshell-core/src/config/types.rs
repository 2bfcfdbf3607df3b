use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Live,
}

impl RunMode {
    pub fn engine_mode(self) -> engine::Mode {
        match self {
            Self::DryRun => engine::Mode::DryRun,
            Self::Live => engine::Mode::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone)]
pub struct HardshellConfig {
    pub mode: RunMode,
    /// Rule tag to run; `all_rules` selects the whole catalog.
    pub tag: String,
    /// Label embedded in ledger filenames.
    pub script_name: String,
    pub rules_dir: PathBuf,
    pub run_state_dir: PathBuf,
    /// Ledger pairs retained after cleanup.
    pub keep_runs: usize,
    pub log_format: LogFormat,
    pub baseline_minimum_version: Option<String>,
    pub baseline_enforce: bool,
}
