//! Launch config YAML schema definitions
//!
//! Every field has a default matching the stock LearnForge checkout
//! (`server/` started with `npm start`, `client/` with `npm run dev`), so
//! running without a config file starts the stock checkout unchanged.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Upper bound for every timing knob
const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Where a loaded [`LaunchConfig`] came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at the given path; built-in defaults
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Root launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    /// Config format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Argument definitions with defaults, referenced as `$(arg name)`
    #[serde(default)]
    pub args: IndexMap<String, ArgDefinition>,

    /// Package manager used to install and start both services
    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Argument passed to each tool for the presence check
    #[serde(default = "default_version_arg")]
    pub version_arg: String,

    /// Tools that must be on PATH before anything starts
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,

    /// Environment file, relative to the project root
    #[serde(default = "default_env_file")]
    pub env_file: String,

    /// Template copied to `env_file` when it is missing
    #[serde(default = "default_env_template")]
    pub env_template: String,

    /// Directory whose presence inside a service means "already installed"
    #[serde(default = "default_install_marker")]
    pub install_marker: String,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    /// Backend service, started first
    #[serde(default = "ServiceConfig::backend")]
    pub backend: ServiceConfig,

    /// Frontend service, started after the backend gate
    #[serde(default = "ServiceConfig::frontend")]
    pub frontend: ServiceConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_package_manager() -> String {
    "npm".to_string()
}

fn default_version_arg() -> String {
    "--version".to_string()
}

fn default_tools() -> Vec<String> {
    vec!["node".to_string(), "npm".to_string()]
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_env_template() -> String {
    ".env.example".to_string()
}

fn default_install_marker() -> String {
    "node_modules".to_string()
}

/// Argument definition with default value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgDefinition {
    /// Default value for the argument
    pub default: ArgValue,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Argument values can be strings, booleans, or numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ArgValue {
    /// Convert to string representation
    pub fn as_str(&self) -> String {
        match self {
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::String(s) => s.clone(),
        }
    }
}

/// Timeouts and intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// How long to wait for the backend before starting the frontend anyway
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Wait after SIGTERM before SIGKILL
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Monitoring loop interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Browser opened once both services are ready
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to the frontend URL
    #[serde(default)]
    pub url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
        }
    }
}

/// One supervised service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in log prefixes
    pub name: String,

    /// Source directory, relative to the project root
    pub dir: String,

    /// Program to run; defaults to the package manager
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for the start command
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the service
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Case-insensitive substrings that must all appear in the ready line
    pub ready: Vec<String>,

    /// Keywords for output lines worth highlighting
    #[serde(default)]
    pub notices: Vec<String>,

    /// URL the service listens on, shown once ready
    #[serde(default)]
    pub url: Option<String>,

    /// Whether to install dependencies for this service
    #[serde(default = "default_true")]
    pub install: bool,
}

impl ServiceConfig {
    /// Stock backend: `npm start` in `server/`
    pub fn backend() -> Self {
        Self {
            name: "Server".to_string(),
            dir: "server".to_string(),
            command: None,
            args: vec!["start".to_string()],
            env: HashMap::new(),
            ready: vec!["server running on port".to_string()],
            notices: vec!["database connected".to_string()],
            url: Some("http://localhost:5000".to_string()),
            install: true,
        }
    }

    /// Stock frontend: `npm run dev` in `client/`
    pub fn frontend() -> Self {
        Self {
            name: "Client".to_string(),
            dir: "client".to_string(),
            command: None,
            args: vec!["run".to_string(), "dev".to_string()],
            env: HashMap::new(),
            ready: vec!["local:".to_string(), "http".to_string()],
            notices: Vec::new(),
            url: Some("http://localhost:5173".to_string()),
            install: true,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            args: IndexMap::new(),
            package_manager: default_package_manager(),
            version_arg: default_version_arg(),
            tools: default_tools(),
            env_file: default_env_file(),
            env_template: default_env_template(),
            install_marker: default_install_marker(),
            timing: TimingConfig::default(),
            browser: BrowserConfig::default(),
            backend: ServiceConfig::backend(),
            frontend: ServiceConfig::frontend(),
        }
    }
}

impl LaunchConfig {
    /// Load launch config from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LaunchConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LaunchConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults.
    ///
    /// The returned [`ConfigSource`] says which of the two happened.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, ConfigSource), LaunchConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::from_file(path)?, ConfigSource::File(path.to_path_buf())))
        } else {
            log::debug!("No launch config at {}, using defaults", path.display());
            Ok((Self::default(), ConfigSource::Defaults))
        }
    }

    /// Parse launch config from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, LaunchConfigError> {
        let config: LaunchConfig =
            serde_yaml::from_str(content).map_err(LaunchConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the launch configuration
    pub fn validate(&self) -> Result<(), LaunchConfigError> {
        for service in [&self.backend, &self.frontend] {
            if service.name.trim().is_empty() {
                return Err(LaunchConfigError::Validation(
                    "Service name must not be empty".to_string(),
                ));
            }
            if service.dir.trim().is_empty() {
                return Err(LaunchConfigError::Validation(format!(
                    "Service '{}': 'dir' must not be empty",
                    service.name
                )));
            }
            if service.ready.iter().all(|part| part.trim().is_empty()) {
                return Err(LaunchConfigError::Validation(format!(
                    "Service '{}': 'ready' needs at least one non-empty marker",
                    service.name
                )));
            }
            if service.command.is_none() && self.package_manager.trim().is_empty() {
                return Err(LaunchConfigError::Validation(format!(
                    "Service '{}': no 'command' and no 'package_manager' to fall back to",
                    service.name
                )));
            }
        }

        if self.backend.name == self.frontend.name {
            return Err(LaunchConfigError::Validation(format!(
                "Backend and frontend share the name '{}'",
                self.backend.name
            )));
        }

        if self.tools.iter().any(|t| t.trim().is_empty()) {
            return Err(LaunchConfigError::Validation(
                "Tool names must not be empty".to_string(),
            ));
        }

        let timing = &self.timing;
        if timing.ready_timeout_secs > MAX_WAIT_SECS
            || timing.grace_period_secs > MAX_WAIT_SECS
            || timing.poll_interval_ms > MAX_WAIT_SECS * 1000
        {
            return Err(LaunchConfigError::Validation(format!(
                "Timing values must not exceed {} seconds",
                MAX_WAIT_SECS
            )));
        }

        if self.timing.grace_period_secs == 0 || self.timing.poll_interval_ms == 0 {
            return Err(LaunchConfigError::Validation(
                "'grace_period_secs' and 'poll_interval_ms' must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur when loading a launch config
#[derive(Debug, thiserror::Error)]
pub enum LaunchConfigError {
    #[error("Failed to read launch config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse launch config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
