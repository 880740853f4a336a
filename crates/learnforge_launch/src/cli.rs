//! Command-line interface for the learnforge launcher

use argh::FromArgs;
use std::collections::HashMap;
use std::path::PathBuf;

/// Start the LearnForge backend and frontend for local development
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the launch config; defaults are used when it does not exist
    /// (default: learnforge.yaml)
    #[argh(positional, default = "String::from(\"learnforge.yaml\")")]
    pub config: String,

    /// override launch arguments (format: key:=value)
    #[argh(option, short = 'a', from_str_fn(parse_arg_override))]
    pub arg: Vec<(String, String)>,

    /// project root containing the service directories (default: current directory)
    #[argh(option)]
    pub root: Option<PathBuf>,

    /// do not open a browser once both services are ready
    #[argh(switch)]
    pub no_browser: bool,

    /// skip dependency installation
    #[argh(switch)]
    pub skip_install: bool,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// validate launch config and exit
    #[argh(switch)]
    pub validate: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse argument override in format "key:=value"
fn parse_arg_override(s: &str) -> Result<(String, String), String> {
    match s.split_once(":=") {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!(
            "Invalid argument format '{}'. Expected 'key:=value'",
            s
        )),
    }
}

impl LaunchArgs {
    /// Convert argument overrides to a HashMap
    pub fn arg_overrides(&self) -> HashMap<String, String> {
        self.arg.iter().cloned().collect()
    }

    /// Normalized filter for env_logger; unknown levels fall back to info
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
