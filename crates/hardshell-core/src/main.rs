mod app;
mod config;
mod logging;
mod preflight;

use anyhow::Result;
use tracing::{error, info};

use config::HardshellConfig;
use ledger::RunStatus;

fn main() {
    let code = match run() {
        Ok(status) => {
            info!(status = %status, code = status.exit_code(), "hardshell finished");
            status.exit_code()
        }
        Err(err) => {
            error!(error = format!("{:#}", err), "hardshell failed");
            eprintln!("hardshell: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<RunStatus> {
    let config = HardshellConfig::load()?;
    logging::init(&config);
    info!(
        mode = ?config.mode,
        tag = %config.tag,
        rules_dir = %config.rules_dir.display(),
        "hardshell started"
    );
    app::execute(&config)
}
