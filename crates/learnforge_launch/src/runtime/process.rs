//! Managed process abstraction

use crate::runtime::command::{spawn_streaming, CommandError, CommandSpec};
use crate::runtime::detector::{DetectorRules, ReadinessDetector, ReadinessState, Signal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::mpsc;

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process has not been spawned yet
    NotStarted,
    /// Process is running, not yet ready
    Running,
    /// Process is running and has printed its ready marker
    ReadySignaled,
    /// Process has exited with exit code (`None` if killed by a signal)
    Exited(Option<i32>),
    /// Process was force-killed after the grace period
    Killed,
}

impl ProcessState {
    /// Check if process is running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::ReadySignaled)
    }

    /// Check if process has stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Killed)
    }
}

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Process name (for logging)
    pub name: String,
    /// Command line and working directory
    pub command: CommandSpec,
    /// Output classification rules
    pub rules: DetectorRules,
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to do: never started or already exited
    AlreadyStopped,
    /// Exited within the grace period
    Exited(Option<i32>),
    /// Force-killed after the grace period
    Killed,
}

/// How often a process group is re-checked while waiting for it to empty
#[cfg(unix)]
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `now + wait`, saturating far in the future instead of overflowing
pub(crate) fn deadline_after(wait: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(wait)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

/// A managed child process
pub struct ManagedProcess {
    /// Process configuration
    pub config: ProcessConfig,
    /// Lifecycle status (readiness is layered on top in [`ManagedProcess::state`])
    status: ProcessState,
    /// Process ID (if running)
    pid: Option<u32>,
    /// Process group led by the child; outlives the leader until the
    /// group is confirmed empty or killed
    pgid: Option<i32>,
    /// Start time
    started_at: Option<Instant>,
    /// Child process handle
    child: Option<Child>,
    /// Readiness latch shared with the drain worker
    readiness: Arc<ReadinessState>,
}

impl ManagedProcess {
    /// Create a new managed process
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            status: ProcessState::NotStarted,
            pid: None,
            pgid: None,
            started_at: None,
            child: None,
            readiness: Arc::new(ReadinessState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Start the process and attach a drain worker to its output.
    ///
    /// A process instance is started at most once; a stopped process is
    /// never restarted in place.
    pub fn start(
        &mut self,
        signals: mpsc::UnboundedSender<(String, Signal)>,
    ) -> Result<(), ProcessError> {
        if self.status != ProcessState::NotStarted {
            return Err(ProcessError::AlreadyStarted(self.config.name.clone()));
        }

        log::info!(
            "[{}] Starting: {}",
            self.config.name,
            self.config.command.display()
        );

        let (child, lines) =
            spawn_streaming(&self.config.command).map_err(|e| ProcessError::SpawnFailed {
                name: self.config.name.clone(),
                source: e,
            })?;

        let pid = child.id();
        log::info!(
            "[{}] Process started with PID: {}",
            self.config.name,
            pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
        );

        let detector = ReadinessDetector::new(
            self.config.name.clone(),
            self.config.rules.clone(),
            self.readiness.clone(),
        );
        tokio::spawn(detector.run(lines, signals));

        self.pid = pid;
        self.pgid = pid.map(|p| p as i32);
        self.status = ProcessState::Running;
        self.started_at = Some(Instant::now());
        self.child = Some(child);
        Ok(())
    }

    /// Current state, with the readiness latch folded in
    pub fn state(&self) -> ProcessState {
        if self.status == ProcessState::Running && self.readiness.is_ready() {
            ProcessState::ReadySignaled
        } else {
            self.status
        }
    }

    /// Readiness state shared with the drain worker
    pub fn readiness(&self) -> &Arc<ReadinessState> {
        &self.readiness
    }

    /// Process ID while running
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Reap the child if it has exited, without blocking
    pub fn check_status(&mut self) -> ProcessState {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.status = ProcessState::Exited(status.code());
                    self.pid = None;
                    self.child = None;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "[{}] Error checking process status: {}",
                        self.config.name,
                        e
                    );
                }
            }
        }

        self.state()
    }

    /// Stop the process: SIGTERM to its process group, then SIGKILL once
    /// `grace` has elapsed. Stopping a process that is not running is a no-op
    /// for the leader, but members left behind in its group are still
    /// terminated.
    ///
    /// The leader exiting is not enough: `npm` can exit while the `node` it
    /// started still holds the port, so the group is watched until it is
    /// empty or the grace period runs out.
    pub async fn stop(&mut self, grace: Duration) -> Result<StopOutcome, ProcessError> {
        let deadline = deadline_after(grace);

        if self.check_status().is_stopped() || self.child.is_none() {
            self.terminate_leftovers(deadline).await;
            return Ok(StopOutcome::AlreadyStopped);
        }
        let Some(mut child) = self.child.take() else {
            return Ok(StopOutcome::AlreadyStopped);
        };

        log::info!(
            "[{}] Stopping process (uptime {:?})...",
            self.config.name,
            self.uptime().unwrap_or_default()
        );
        self.request_terminate(&mut child);

        match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => {
                let code = status.code();
                self.status = ProcessState::Exited(code);
                self.pid = None;
                log::info!("[{}] Process exited with code: {:?}", self.config.name, code);
                self.reap_group(deadline).await;
                return Ok(StopOutcome::Exited(code));
            }
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.config.name, e);
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit within {:?}, forcing kill",
                    self.config.name,
                    grace
                );
            }
        }

        self.force_kill(&mut child);
        match child.wait().await {
            Ok(_) => {
                self.status = ProcessState::Killed;
                self.pid = None;
                self.pgid = None;
                Ok(StopOutcome::Killed)
            }
            Err(e) => {
                // Keep the handle so a later stop can retry.
                self.child = Some(child);
                Err(ProcessError::KillFailed {
                    name: self.config.name.clone(),
                    source: e,
                })
            }
        }
    }

    /// The leader is gone; ask whatever is left of its group to exit
    #[cfg(unix)]
    async fn terminate_leftovers(&mut self, deadline: tokio::time::Instant) {
        use nix::sys::signal::{killpg, Signal as UnixSignal};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return;
        };
        let group = Pid::from_raw(pgid);
        if killpg(group, None).is_err() {
            self.pgid = None;
            return;
        }

        log::warn!(
            "[{}] Process exited but its process group is still alive, terminating it",
            self.config.name
        );
        let _ = killpg(group, UnixSignal::SIGTERM);
        self.reap_group(deadline).await;
    }

    #[cfg(not(unix))]
    async fn terminate_leftovers(&mut self, _deadline: tokio::time::Instant) {
        self.pgid = None;
    }

    /// Wait for the process group to empty; SIGKILL it at `deadline`
    #[cfg(unix)]
    async fn reap_group(&mut self, deadline: tokio::time::Instant) {
        use nix::sys::signal::{killpg, Signal as UnixSignal};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        let group = Pid::from_raw(pgid);

        while killpg(group, None).is_ok() {
            if tokio::time::Instant::now() >= deadline {
                log::warn!(
                    "[{}] Process group {} outlived the grace period, killing it",
                    self.config.name,
                    pgid
                );
                let _ = killpg(group, UnixSignal::SIGKILL);
                return;
            }
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
        }
    }

    #[cfg(not(unix))]
    async fn reap_group(&mut self, _deadline: tokio::time::Instant) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn request_terminate(&self, child: &mut Child) {
        use nix::sys::signal::{killpg, Signal as UnixSignal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), UnixSignal::SIGTERM) {
                log::warn!(
                    "[{}] Failed to send SIGTERM to process group: {}, trying process only",
                    self.config.name,
                    e
                );
                let _ = child.start_kill();
            }
        }
    }

    #[cfg(not(unix))]
    fn request_terminate(&self, child: &mut Child) {
        // No graceful termination request outside unix
        let _ = child.start_kill();
    }

    fn force_kill(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal as UnixSignal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                let _ = killpg(Pid::from_raw(pid as i32), UnixSignal::SIGKILL);
            }
        }

        if let Err(e) = child.start_kill() {
            log::debug!("[{}] start_kill: {}", self.config.name, e);
        }
    }

    /// Get uptime duration
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

/// Errors that can occur with managed processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' was already started")]
    AlreadyStarted(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: CommandError,
    },

    #[error("Failed to kill process '{name}': {source}")]
    KillFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
