use tracing_subscriber::EnvFilter;

use crate::config::{HardshellConfig, LogFormat};

/// Install the global subscriber. `RUST_LOG` narrows the filter; the
/// output format follows the config.
pub fn init(config: &HardshellConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .try_init();
        }
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
}
