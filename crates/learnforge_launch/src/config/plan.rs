//! Resolved launch plan: substitutions applied, paths made absolute

use super::launch_config::{LaunchConfig, ServiceConfig};
use super::substitution::{SubstitutionContext, SubstitutionError};
use crate::runtime::{CommandSpec, DetectorRules, ProcessConfig, ReadyMarker};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the lifecycle needs, ready to execute
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Project root all relative paths were resolved against
    pub root: PathBuf,
    /// Resolved arguments
    pub args: IndexMap<String, String>,
    /// Version-check commands, one per required tool
    pub tool_checks: Vec<CommandSpec>,
    /// Environment file and its template
    pub env_file: PathBuf,
    pub env_template: PathBuf,
    /// Dependency installs, in service start order
    pub installs: Vec<InstallStep>,
    pub backend: ServicePlan,
    pub frontend: ServicePlan,
    pub timing: Timing,
    /// Opened once both services are ready; `None` disables it
    pub browser_url: Option<String>,
}

/// A service ready to hand to the supervisor
#[derive(Debug, Clone)]
pub struct ServicePlan {
    pub process: ProcessConfig,
    pub url: Option<String>,
}

impl ServicePlan {
    pub fn name(&self) -> &str {
        &self.process.name
    }
}

/// Dependency installation for one service
#[derive(Debug, Clone)]
pub struct InstallStep {
    pub service: String,
    pub command: CommandSpec,
    /// Skip the install when this path exists
    pub marker: PathBuf,
}

/// Resolved timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub ready_timeout: Duration,
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl LaunchPlan {
    /// Resolve `config` against `root`, applying `$(arg name)` overrides
    pub fn resolve(
        config: &LaunchConfig,
        root: &Path,
        arg_overrides: &HashMap<String, String>,
    ) -> Result<Self, PlanError> {
        let mut args: IndexMap<String, String> = config
            .args
            .iter()
            .map(|(name, def)| (name.clone(), def.default.as_str()))
            .collect();

        for (name, value) in arg_overrides {
            if !config.args.contains_key(name) {
                return Err(PlanError::UnknownArgument(name.clone()));
            }
            args.insert(name.clone(), value.clone());
        }

        let ctx = SubstitutionContext::new()
            .with_args(args.clone().into_iter().collect())
            .with_root(root);
        let subst = |value: &str, context: &str| {
            ctx.substitute(value).map_err(|e| PlanError::SubstitutionFailed {
                context: context.to_string(),
                source: e,
            })
        };

        let package_manager = subst(&config.package_manager, "package_manager")?;
        let version_arg = subst(&config.version_arg, "version_arg")?;

        let mut tool_checks = Vec::with_capacity(config.tools.len());
        for tool in &config.tools {
            let program = subst(tool, "tools")?;
            tool_checks.push(CommandSpec::new(program).args([version_arg.clone()]));
        }

        let env_file = root.join(subst(&config.env_file, "env_file")?);
        let env_template = root.join(subst(&config.env_template, "env_template")?);
        let install_marker = subst(&config.install_marker, "install_marker")?;

        let backend = resolve_service(&config.backend, root, &package_manager, &ctx)?;
        let frontend = resolve_service(&config.frontend, root, &package_manager, &ctx)?;

        let installs: Vec<InstallStep> = [(&config.backend, &backend), (&config.frontend, &frontend)]
            .into_iter()
            .filter(|(service, _)| service.install)
            .map(|(_, resolved)| {
                let dir = resolved
                    .process
                    .command
                    .working_dir
                    .clone()
                    .unwrap_or_else(|| root.to_path_buf());
                InstallStep {
                    service: resolved.name().to_string(),
                    command: CommandSpec::new(package_manager.clone())
                        .args(["install"])
                        .current_dir(&dir),
                    marker: dir.join(&install_marker),
                }
            })
            .collect();

        let browser_url = if config.browser.enabled {
            match &config.browser.url {
                Some(url) => Some(subst(url, "browser.url")?),
                None => frontend.url.clone(),
            }
        } else {
            None
        };

        Ok(Self {
            root: root.to_path_buf(),
            args,
            tool_checks,
            env_file,
            env_template,
            installs,
            backend,
            frontend,
            timing: Timing {
                ready_timeout: Duration::from_secs(config.timing.ready_timeout_secs),
                grace_period: Duration::from_secs(config.timing.grace_period_secs),
                poll_interval: Duration::from_millis(config.timing.poll_interval_ms),
            },
            browser_url,
        })
    }

    /// Drop dependency installs (`--skip-install`)
    pub fn without_install(mut self) -> Self {
        self.installs.clear();
        self
    }

    /// Never open a browser (`--no-browser`)
    pub fn without_browser(mut self) -> Self {
        self.browser_url = None;
        self
    }
}

fn resolve_service(
    service: &ServiceConfig,
    root: &Path,
    package_manager: &str,
    ctx: &SubstitutionContext,
) -> Result<ServicePlan, PlanError> {
    let subst = |value: &str, field: &str| {
        ctx.substitute(value).map_err(|e| PlanError::SubstitutionFailed {
            context: format!("service '{}' {}", service.name, field),
            source: e,
        })
    };

    let program = match &service.command {
        Some(command) => subst(command, "command")?,
        None => package_manager.to_string(),
    };
    let dir = root.join(subst(&service.dir, "dir")?);

    let mut args = Vec::with_capacity(service.args.len());
    for arg in &service.args {
        args.push(subst(arg, "args")?);
    }

    let mut env = HashMap::new();
    for (key, value) in &service.env {
        env.insert(key.clone(), subst(value, &format!("env '{}'", key))?);
    }

    let mut ready = Vec::with_capacity(service.ready.len());
    for part in &service.ready {
        ready.push(subst(part, "ready")?);
    }

    let url = match &service.url {
        Some(url) => Some(subst(url, "url")?),
        None => None,
    };

    Ok(ServicePlan {
        process: ProcessConfig {
            name: service.name.clone(),
            command: CommandSpec::new(program)
                .args(args)
                .current_dir(dir)
                .envs(env),
            rules: DetectorRules::new(ReadyMarker::new(ready), service.notices.as_slice()),
        },
        url,
    })
}

/// Errors that can occur while resolving a launch plan
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("Substitution failed in {context}: {source}")]
    SubstitutionFailed {
        context: String,
        #[source]
        source: SubstitutionError,
    },
}

/// Display the launch plan in a human-readable format
impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;
        writeln!(f, "Project root: {}", self.root.display())?;
        writeln!(f)?;

        if !self.args.is_empty() {
            writeln!(f, "Arguments:")?;
            for (key, value) in &self.args {
                writeln!(f, "  {}: {}", key, value)?;
            }
            writeln!(f)?;
        }

        if !self.tool_checks.is_empty() {
            writeln!(f, "Tool checks:")?;
            for check in &self.tool_checks {
                writeln!(f, "  {}", check.display())?;
            }
            writeln!(f)?;
        }

        writeln!(
            f,
            "Environment file: {} (template: {})",
            self.env_file.display(),
            self.env_template.display()
        )?;
        writeln!(f)?;

        if !self.installs.is_empty() {
            writeln!(f, "Installs:")?;
            for install in &self.installs {
                writeln!(
                    f,
                    "  {}: {} (skipped if {} exists)",
                    install.service,
                    install.command.display(),
                    install.marker.display()
                )?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Services (in start order):")?;
        for (i, service) in [&self.backend, &self.frontend].iter().enumerate() {
            let command = &service.process.command;
            writeln!(f)?;
            writeln!(f, "  {}. {}", i + 1, service.name())?;
            writeln!(f, "     Command: {}", command.display())?;
            if let Some(dir) = &command.working_dir {
                writeln!(f, "     Directory: {}", dir.display())?;
            }
            if let Some(url) = &service.url {
                writeln!(f, "     URL: {}", url)?;
            }
            if !command.env.is_empty() {
                writeln!(f, "     Environment:")?;
                let mut keys: Vec<_> = command.env.keys().collect();
                keys.sort();
                for key in keys {
                    writeln!(f, "       {}={}", key, command.env[key])?;
                }
            }
        }
        writeln!(f)?;

        writeln!(
            f,
            "Backend gate: {:?}, grace period: {:?}, poll interval: {:?}",
            self.timing.ready_timeout, self.timing.grace_period, self.timing.poll_interval
        )?;
        if let Some(url) = &self.browser_url {
            writeln!(f, "Browser: {}", url)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_mirrors_project_layout() {
        let root = Path::new("/work/learnforge");
        let plan = LaunchPlan::resolve(&LaunchConfig::default(), root, &HashMap::new()).unwrap();

        assert_eq!(plan.tool_checks.len(), 2);
        assert_eq!(plan.tool_checks[0].display(), "node --version");
        assert_eq!(plan.env_file, root.join(".env"));
        assert_eq!(plan.env_template, root.join(".env.example"));

        assert_eq!(plan.backend.name(), "Server");
        assert_eq!(plan.backend.process.command.display(), "npm start");
        assert_eq!(
            plan.backend.process.command.working_dir.as_deref(),
            Some(root.join("server").as_path())
        );
        assert_eq!(plan.frontend.process.command.display(), "npm run dev");

        assert_eq!(plan.installs.len(), 2);
        assert_eq!(plan.installs[1].marker, root.join("client/node_modules"));
        assert_eq!(plan.browser_url.as_deref(), Some("http://localhost:5173"));
        assert_eq!(plan.timing.grace_period, Duration::from_secs(5));
    }

    #[test]
    fn test_arg_overrides_flow_into_services() {
        let yaml = r#"
args:
  port:
    default: 5000
backend:
  name: Server
  dir: server
  args: [start]
  env:
    PORT: "$(arg port)"
  ready: ["server running on port $(arg port)"]
  url: "http://localhost:$(arg port)"
"#;
        let config = LaunchConfig::from_yaml(yaml).unwrap();
        let overrides = HashMap::from([("port".to_string(), "6000".to_string())]);
        let plan = LaunchPlan::resolve(&config, Path::new("/srv"), &overrides).unwrap();

        assert_eq!(plan.backend.process.command.env["PORT"], "6000");
        assert_eq!(plan.backend.url.as_deref(), Some("http://localhost:6000"));
        assert_eq!(plan.args["port"], "6000");
    }

    #[test]
    fn test_installs_follow_service_flags() {
        let mut config = LaunchConfig::default();
        config.backend.install = false;
        let plan = LaunchPlan::resolve(&config, Path::new("/app"), &HashMap::new()).unwrap();

        assert_eq!(plan.installs.len(), 1);
        assert_eq!(plan.installs[0].service, "Client");
        assert_eq!(plan.installs[0].command.display(), "npm install");
        assert_eq!(plan.backend.name(), "Server");
        assert_eq!(plan.frontend.name(), "Client");
    }

    #[test]
    fn test_unknown_override_rejected() {
        let overrides = HashMap::from([("nope".to_string(), "1".to_string())]);
        let result = LaunchPlan::resolve(&LaunchConfig::default(), Path::new("/"), &overrides);
        assert!(matches!(result, Err(PlanError::UnknownArgument(_))));
    }

    #[test]
    fn test_flags_strip_install_and_browser() {
        let plan = LaunchPlan::resolve(&LaunchConfig::default(), Path::new("/"), &HashMap::new())
            .unwrap()
            .without_install()
            .without_browser();
        assert!(plan.installs.is_empty());
        assert!(plan.browser_url.is_none());
    }

    #[test]
    fn test_plan_display_lists_services_in_order() {
        let plan =
            LaunchPlan::resolve(&LaunchConfig::default(), Path::new("/app"), &HashMap::new())
                .unwrap();
        let text = plan.to_string();
        let server = text.find("1. Server").unwrap();
        let client = text.find("2. Client").unwrap();
        assert!(server < client);
    }
}
