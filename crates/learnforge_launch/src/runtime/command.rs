//! Command runner: one-shot execution and streaming spawns

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Receiving end of a child's merged stdout/stderr line stream
pub type LineStream = mpsc::UnboundedReceiver<String>;

/// A command line to execute, without any shell in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments passed verbatim
    pub args: Vec<String>,
    /// Working directory (inherits the launcher's when unset)
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add extra environment variables
    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Human-readable command line, for logs
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env).stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Result of a command run to completion
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First non-empty line of stdout, trimmed
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Run a command and capture its output.
///
/// A non-zero exit is not an error: the code is returned for the caller to
/// interpret. Only a failure to locate or invoke the program is.
pub async fn run_to_completion(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    log::debug!("Running: {}", spec.display());

    let output = spec
        .to_command()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CommandError::from_io(&spec.program, e))?;

    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Spawn a long-lived child and stream its combined output line by line.
///
/// Stdout and stderr are read by two independent tasks feeding one channel,
/// so lines keep their per-pipe order but interleaving across pipes is best
/// effort. The stream ends once both pipes are closed.
///
/// On unix the child leads its own process group, so a terminal Ctrl+C does
/// not reach it directly and shutdown can signal the whole tree (`npm` and
/// the `node` it starts) in a controlled order.
pub fn spawn_streaming(spec: &CommandSpec) -> Result<(Child, LineStream), CommandError> {
    let mut cmd = spec.to_command();
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CommandError::from_io(&spec.program, e))?;

    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx));
    }

    Ok((child, rx))
}

/// Forward one pipe line by line until it closes.
///
/// Lines are decoded lossily: dev servers print Latin-1 and raw escape
/// bytes, and one undecodable line must not end the stream.
async fn forward_lines<R>(pipe: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(decode_line(&buf)).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("Stopped reading child output: {}", e);
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Errors from invoking external commands
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command '{0}' not found in PATH")]
    NotFound(String),

    #[error("Failed to execute '{program}': {source}")]
    Execution {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    fn from_io(program: &str, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            CommandError::NotFound(program.to_string())
        } else {
            CommandError::Execution {
                program: program.to_string(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod decode_tests {
    use super::decode_line;

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"ready\r\n"), "ready");
        assert_eq!(decode_line(b"ready\n"), "ready");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"caf\xe9"), "caf\u{FFFD}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_to_completion_returns_nonzero_exit() {
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = run_to_completion(&spec).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.first_line(), Some("out"));
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let spec = CommandSpec::new("learnforge-definitely-missing-binary");
        let result = run_to_completion(&spec).await;

        assert!(matches!(result, Err(CommandError::NotFound(_))));
        assert!(matches!(
            spawn_streaming(&spec),
            Err(CommandError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("pwd").current_dir(dir.path());
        let output = run_to_completion(&spec).await.unwrap();

        let reported = std::fs::canonicalize(output.first_line().unwrap()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_spawn_streaming_merges_stdout_and_stderr() {
        let spec = CommandSpec::new("sh").args(["-c", "echo one; echo two >&2"]);
        let (mut child, mut lines) = spawn_streaming(&spec).unwrap();

        let mut seen = Vec::new();
        while let Some(line) = lines.recv().await {
            seen.push(line);
        }
        seen.sort();

        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_stream() {
        let spec = CommandSpec::new("sh").args([
            "-c",
            "printf 'caf\\351 loaded\\r\\n'; printf 'caf\\351\\n' >&2; echo after; echo after-err >&2",
        ]);
        let (mut child, mut lines) = spawn_streaming(&spec).unwrap();

        let mut seen = Vec::new();
        while let Some(line) = lines.recv().await {
            seen.push(line);
        }
        seen.sort();

        assert_eq!(
            seen,
            vec![
                "after".to_string(),
                "after-err".to_string(),
                "caf\u{FFFD}".to_string(),
                "caf\u{FFFD} loaded".to_string(),
            ]
        );
        assert!(child.wait().await.unwrap().success());
    }
}
