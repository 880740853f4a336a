//! Process supervisor - ordered start, readiness gating and reverse shutdown

use crate::runtime::detector::Signal;
use crate::runtime::process::{
    deadline_after, ManagedProcess, ProcessConfig, ProcessError, ProcessState, StopOutcome,
};
use indexmap::IndexMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wait after SIGTERM before escalating to SIGKILL
    pub grace_period: Duration,
    /// How often `wait_for_ready` re-reads the readiness latch
    pub ready_poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            ready_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Owns every started process, in start order
pub struct Supervisor {
    config: SupervisorConfig,
    /// Registry: insertion order is start order; shutdown walks it backwards
    processes: IndexMap<String, ManagedProcess>,
    signal_tx: mpsc::UnboundedSender<(String, Signal)>,
}

/// A process found exited while it was expected to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnexpectedExit {
    pub name: String,
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    /// Last error line the process printed, for the diagnostic
    pub last_error: Option<String>,
}

impl std::fmt::Display for UnexpectedExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} has stopped unexpectedly", self.name)?;
        match self.code {
            Some(code) => write!(f, " (exit code {})", code)?,
            None => write!(f, " (killed by signal)")?,
        }
        if let Some(line) = &self.last_error {
            write!(f, ", last error: {}", line)?;
        }
        Ok(())
    }
}

/// Result of stopping one registered process
#[derive(Debug)]
pub struct ShutdownReport {
    pub name: String,
    pub outcome: Result<StopOutcome, ProcessError>,
}

impl Supervisor {
    /// Create a supervisor whose drain workers emit on `signal_tx`
    pub fn new(config: SupervisorConfig, signal_tx: mpsc::UnboundedSender<(String, Signal)>) -> Self {
        Self {
            config,
            processes: IndexMap::new(),
            signal_tx,
        }
    }

    /// Spawn a process, attach its readiness detector and register it.
    ///
    /// Registration happens only after a successful spawn, so a failed start
    /// leaves the registry untouched.
    pub fn start(&mut self, config: ProcessConfig) -> Result<&ManagedProcess, SupervisorError> {
        if self.processes.contains_key(&config.name) {
            return Err(SupervisorError::AlreadyRegistered(config.name));
        }

        let name = config.name.clone();
        let mut process = ManagedProcess::new(config);
        process.start(self.signal_tx.clone())?;

        let (index, _) = self.processes.insert_full(name, process);
        Ok(&self.processes[index])
    }

    /// Look up a registered process
    pub fn get(&self, name: &str) -> Option<&ManagedProcess> {
        self.processes.get(name)
    }

    /// Registered names, in start order
    pub fn names(&self) -> Vec<&str> {
        self.processes.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Wait until `name` signals readiness.
    ///
    /// Returns false on timeout, when the process is unknown, or when its
    /// output closed without ever reaching the ready marker.
    pub async fn wait_for_ready(&self, name: &str, timeout: Duration) -> bool {
        let Some(process) = self.processes.get(name) else {
            return false;
        };
        let readiness = process.readiness().clone();
        let deadline = deadline_after(timeout);

        loop {
            if readiness.is_ready() {
                return true;
            }
            if readiness.is_closed() {
                log::debug!("[{}] Output closed before ready", name);
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.config.ready_poll_interval.min(deadline - now)).await;
        }
    }

    /// Whether every registered process has latched ready
    pub fn all_ready(&self) -> bool {
        !self.processes.is_empty()
            && self
                .processes
                .values()
                .all(|p| p.readiness().is_ready())
    }

    /// Reap exited children without blocking; report the first one found
    pub fn poll_exits(&mut self) -> Option<UnexpectedExit> {
        for (name, process) in self.processes.iter_mut() {
            if let ProcessState::Exited(code) = process.check_status() {
                return Some(UnexpectedExit {
                    name: name.clone(),
                    code,
                    last_error: process.readiness().last_error_line(),
                });
            }
        }
        None
    }

    /// Stop every registered process in reverse start order.
    ///
    /// Each entry is attempted even if an earlier one fails; failures are
    /// logged and returned in the report. Calling this again is harmless:
    /// already stopped processes are reported as such and not signalled.
    pub async fn shutdown_all(&mut self) -> Vec<ShutdownReport> {
        log::info!("Shutting down all processes...");
        let grace = self.config.grace_period;
        let mut reports = Vec::with_capacity(self.processes.len());

        for (name, process) in self.processes.iter_mut().rev() {
            let outcome = process.stop(grace).await;
            match &outcome {
                Ok(StopOutcome::AlreadyStopped) => {
                    log::debug!("[{}] Already stopped", name);
                }
                Ok(StopOutcome::Exited(_)) => log::info!("[{}] Stopped", name),
                Ok(StopOutcome::Killed) => log::warn!("[{}] Force killed", name),
                Err(e) => log::error!("[{}] Error stopping process: {}", name, e),
            }
            reports.push(ShutdownReport {
                name: name.clone(),
                outcome,
            });
        }

        log::info!("All processes shut down");
        reports
    }

    /// Get process status summary
    pub fn status(&self) -> Vec<(&str, ProcessState)> {
        self.processes
            .iter()
            .map(|(name, proc)| (name.as_str(), proc.state()))
            .collect()
    }
}

/// Errors that can occur while starting supervised processes
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("A process named '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}
