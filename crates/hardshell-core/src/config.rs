mod defaults;
mod env;
mod file;
mod load;
mod types;
mod util;


pub use types::{HardshellConfig, LogFormat, RunMode};
