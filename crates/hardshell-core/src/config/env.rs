use super::types::HardshellConfig;
use super::util::{env_non_empty, env_usize, parse_bool, parse_log_format, parse_mode};

impl HardshellConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_non_empty("HARDSHELL_MODE") {
            self.mode = parse_mode(&v);
        }
        if let Some(v) = env_non_empty("HARDSHELL_TAG") {
            self.tag = v;
        }
        if let Some(v) = env_non_empty("HARDSHELL_SCRIPT_NAME") {
            self.script_name = v;
        }
        if let Some(v) = env_non_empty("HARDSHELL_RULES_DIR") {
            self.rules_dir = v.into();
        }
        if let Some(v) = env_non_empty("HARDSHELL_RUN_STATE_DIR") {
            self.run_state_dir = v.into();
        }
        if let Some(v) = env_usize("HARDSHELL_KEEP_RUNS") {
            self.keep_runs = v;
        }
        if let Some(v) = env_non_empty("HARDSHELL_LOG_FORMAT") {
            self.log_format = parse_log_format(&v);
        }
        if let Some(v) = env_non_empty("HARDSHELL_BASELINE_MIN_VERSION") {
            self.baseline_minimum_version = Some(v);
        }
        if let Some(v) = env_non_empty("HARDSHELL_BASELINE_ENFORCE") {
            self.baseline_enforce = parse_bool(&v);
        }
    }
}
