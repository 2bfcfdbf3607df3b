use anyhow::Result;

use super::types::HardshellConfig;

impl HardshellConfig {
    /// Defaults, then the optional TOML file, then `HARDSHELL_*` env
    /// overrides on top.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_file_config()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }
}
