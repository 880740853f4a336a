//! `$(kind name)` expansion for launch config values
//!
//! Three kinds are understood:
//! - `$(arg name)`: a launch argument, e.g. `backend_port` feeding both the
//!   backend's `PORT` and its URL. Argument values may reference other
//!   arguments; a reference cycle is an error.
//! - `$(env NAME)`: an environment override, else the launcher's environment.
//!   Used verbatim, never expanded again.
//! - `$(root)`: the project root.
//!
//! Anything not shaped like a token (a lone `$`, an unclosed `$(`) is left
//! as written.

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `$(kind)` or `$(kind name)`, whitespace-tolerant inside the parens
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(\s*([A-Za-z]+)(?:\s+([^()\s]+))?\s*\)").unwrap());

/// Values available to `$(...)` tokens
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Launch arguments (defaults merged with CLI overrides), unexpanded
    pub args: HashMap<String, String>,
    /// Environment overrides, consulted before the process environment
    pub env: HashMap<String, String>,
    /// Project root, for `$(root)`
    pub root: Option<PathBuf>,
}

impl SubstitutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: HashMap<String, String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Expand every token in `input`
    pub fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        self.expand(input, &mut Vec::new())
    }

    /// `chain` holds the arguments currently being expanded, outermost first
    fn expand(&self, input: &str, chain: &mut Vec<String>) -> Result<String, SubstitutionError> {
        let mut out = String::with_capacity(input.len());
        let mut copied_to = 0;

        for caps in TOKEN.captures_iter(input) {
            let (Some(token), Some(kind)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&input[copied_to..token.start()]);
            let name = caps.get(2).map(|m| m.as_str());
            out.push_str(&self.resolve(kind.as_str(), name, chain)?);
            copied_to = token.end();
        }

        out.push_str(&input[copied_to..]);
        Ok(out)
    }

    fn resolve(
        &self,
        kind: &str,
        name: Option<&str>,
        chain: &mut Vec<String>,
    ) -> Result<String, SubstitutionError> {
        match (kind, name) {
            ("arg", Some(name)) => self.expand_arg(name, chain),
            ("env", Some(name)) => match self.env.get(name) {
                Some(value) => Ok(value.clone()),
                None => std::env::var(name)
                    .map_err(|_| SubstitutionError::UndefinedEnv(name.to_string())),
            },
            ("root", None) => self
                .root
                .as_ref()
                .map(|r| r.to_string_lossy().into_owned())
                .ok_or(SubstitutionError::NoRoot),
            ("arg" | "env", None) => Err(SubstitutionError::MissingName(kind.to_string())),
            ("root", Some(extra)) => Err(SubstitutionError::UnexpectedName {
                kind: kind.to_string(),
                name: extra.to_string(),
            }),
            _ => Err(SubstitutionError::UnknownKind(kind.to_string())),
        }
    }

    fn expand_arg(&self, name: &str, chain: &mut Vec<String>) -> Result<String, SubstitutionError> {
        if chain.iter().any(|active| active == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(SubstitutionError::ArgCycle(cycle.join(" -> ")));
        }

        let raw = self
            .args
            .get(name)
            .ok_or_else(|| SubstitutionError::UndefinedArg(name.to_string()))?;

        chain.push(name.to_string());
        let expanded = self.expand(raw, chain);
        chain.pop();
        expanded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Unknown substitution '$({0} ...)', expected arg, env or root")]
    UnknownKind(String),

    #[error("'$({0})' needs a name, e.g. '$({0} NAME)'")]
    MissingName(String),

    #[error("'$({kind})' takes no name, got '{name}'")]
    UnexpectedName { kind: String, name: String },

    #[error("Undefined argument: {0}")]
    UndefinedArg(String),

    #[error("Undefined environment variable: {0}")]
    UndefinedEnv(String),

    #[error("$(root) used but no project root is set")]
    NoRoot,

    #[error("Arguments reference each other: {0}")]
    ArgCycle(String),
}
