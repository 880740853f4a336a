//! Pre-start steps around the supervised services
//!
//! These wrap external collaborators (version queries, the package manager,
//! the desktop browser) behind small functions so the lifecycle only sees
//! success or a [`SetupError`].

use crate::config::InstallStep;
use crate::runtime::{run_to_completion, CommandSpec};
use std::path::Path;

/// Check that a tool is installed; returns the first line of its version output
pub async fn check_tool(check: &CommandSpec) -> Result<String, SetupError> {
    let output = run_to_completion(check)
        .await
        .map_err(|e| SetupError::ToolMissing {
            tool: check.program.clone(),
            reason: e.to_string(),
        })?;

    if !output.success() {
        return Err(SetupError::ToolMissing {
            tool: check.program.clone(),
            reason: format!("'{}' exited with {:?}", check.display(), output.exit_code),
        });
    }

    Ok(output.first_line().unwrap_or_default().to_string())
}

/// What [`ensure_env_file`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileStatus {
    Present,
    CreatedFromTemplate,
}

/// Copy `template` to `env_file` unless `env_file` already exists.
///
/// Contents are never parsed.
pub fn ensure_env_file(env_file: &Path, template: &Path) -> Result<EnvFileStatus, SetupError> {
    if env_file.exists() {
        return Ok(EnvFileStatus::Present);
    }

    if !template.exists() {
        return Err(SetupError::EnvSetupFailed {
            path: env_file.display().to_string(),
            reason: format!(
                "{} not found, please create {} manually",
                template.display(),
                env_file.display()
            ),
        });
    }

    std::fs::copy(template, env_file).map_err(|e| SetupError::EnvSetupFailed {
        path: env_file.display().to_string(),
        reason: format!("copying from {}: {}", template.display(), e),
    })?;

    Ok(EnvFileStatus::CreatedFromTemplate)
}

/// What [`install_dependencies`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    AlreadyInstalled,
    Installed,
}

/// Run the package manager's install for one service unless its marker exists
pub async fn install_dependencies(step: &InstallStep) -> Result<InstallStatus, SetupError> {
    if step.marker.exists() {
        return Ok(InstallStatus::AlreadyInstalled);
    }

    log::info!("Installing {} dependencies...", step.service);
    let output = run_to_completion(&step.command)
        .await
        .map_err(|e| SetupError::InstallFailed {
            service: step.service.clone(),
            reason: e.to_string(),
        })?;

    if !output.success() {
        return Err(SetupError::InstallFailed {
            service: step.service.clone(),
            reason: format!(
                "'{}' exited with {:?}: {}",
                step.command.display(),
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    Ok(InstallStatus::Installed)
}

/// Open `url` in the default browser without blocking the caller.
///
/// Failures are logged and otherwise ignored.
pub fn open_browser(url: &str) {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = open::that(&url) {
            log::warn!("Could not open browser at {}: {}", url, e);
        }
    });
}

/// Errors from the pre-start steps. All of them abort the launch.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("{tool} is not installed or not in PATH ({reason})")]
    ToolMissing { tool: String, reason: String },

    #[error("Environment setup failed for {path}: {reason}")]
    EnvSetupFailed { path: String, reason: String },

    #[error("Failed to install {service} dependencies: {reason}")]
    InstallFailed { service: String, reason: String },
}
