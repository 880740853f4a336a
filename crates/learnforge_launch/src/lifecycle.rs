//! Lifecycle controller - ordered startup, monitoring and the single shutdown path
//!
//! ```text
//! Init → DependencyCheck → EnvSetup → InstallDeps → StartBackend
//!      → GateOnBackend → StartFrontend → Monitoring → ShuttingDown → Terminal
//! ```
//!
//! Any failure before `Monitoring` jumps straight to `ShuttingDown`. Every
//! path goes through exactly one call to [`Supervisor::shutdown_all`].

use crate::config::LaunchPlan;
use crate::runtime::{
    ShutdownReport, Signal, Supervisor, SupervisorConfig, SupervisorError, UnexpectedExit,
};
use crate::setup::{self, EnvFileStatus, InstallStatus, SetupError};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Lifecycle phases, in the only order they may be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    DependencyCheck,
    EnvSetup,
    InstallDeps,
    StartBackend,
    GateOnBackend,
    StartFrontend,
    Monitoring,
    ShuttingDown,
    Terminal,
}

/// Why the launcher stopped
#[derive(Debug)]
pub enum Outcome {
    /// Interrupt received while monitoring
    Interrupted {
        /// Both services had reached readiness and were still running
        all_ready: bool,
    },
    /// A fatal error ended the run
    Failed(LaunchError),
}

impl Outcome {
    /// Process exit code: 0 only for an interrupt with both services healthy
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Interrupted { all_ready: true } => 0,
            _ => 1,
        }
    }
}

/// Everything that happened during one run
#[derive(Debug)]
pub struct LaunchReport {
    pub outcome: Outcome,
    /// Phases in the order they were entered
    pub phases: Vec<Phase>,
    /// One entry per started process, in stop order
    pub shutdown: Vec<ShutdownReport>,
    /// Whether the "both services ready" banner was shown
    pub all_ready_announced: bool,
}

impl LaunchReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

/// Drives one launcher run from preflight checks to teardown
pub struct Lifecycle {
    plan: LaunchPlan,
    phases: Vec<Phase>,
}

impl Lifecycle {
    pub fn new(plan: LaunchPlan) -> Self {
        Self {
            plan,
            phases: vec![Phase::Init],
        }
    }

    /// Run until interrupted or until something fails, then shut down.
    ///
    /// `interrupt` fires on Ctrl+C; it is observed between startup steps,
    /// during the backend gate and throughout monitoring.
    pub async fn run(mut self, mut interrupt: watch::Receiver<()>) -> LaunchReport {
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        let mut supervisor = Supervisor::new(
            SupervisorConfig {
                grace_period: self.plan.timing.grace_period,
                ..Default::default()
            },
            signal_tx,
        );
        let mut console = Console::new(&self.plan);

        let outcome = match self
            .startup(&mut supervisor, &mut signals, &mut console, &mut interrupt)
            .await
        {
            Ok(()) => {
                self.enter(Phase::Monitoring);
                self.monitor(&mut supervisor, &mut signals, &mut console, &mut interrupt)
                    .await
            }
            Err(e) => Outcome::Failed(e),
        };

        if let Outcome::Failed(e) = &outcome {
            log::error!("{}", e);
            if let Some(hint) = e.hint() {
                log::warn!("{}", hint);
            }
        }

        self.enter(Phase::ShuttingDown);
        println!("\nShutting down LearnForge...");
        let shutdown = supervisor.shutdown_all().await;
        self.enter(Phase::Terminal);
        println!("LearnForge stopped");

        LaunchReport {
            outcome,
            phases: self.phases,
            shutdown,
            all_ready_announced: console.announced,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug_assert!(
            self.phases.last().map_or(true, |last| *last < phase),
            "phase {:?} entered after {:?}",
            phase,
            self.phases.last()
        );
        log::debug!("Entering phase {:?}", phase);
        self.phases.push(phase);
    }

    fn current(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Init)
    }

    fn check_interrupt(&self, interrupt: &watch::Receiver<()>) -> Result<(), LaunchError> {
        if interrupt.has_changed().unwrap_or(false) {
            log::info!("Shutdown requested, aborting launch");
            return Err(LaunchError::InterruptedDuringStartup(self.current()));
        }
        Ok(())
    }

    async fn startup(
        &mut self,
        supervisor: &mut Supervisor,
        signals: &mut mpsc::UnboundedReceiver<(String, Signal)>,
        console: &mut Console,
        interrupt: &mut watch::Receiver<()>,
    ) -> Result<(), LaunchError> {
        self.enter(Phase::DependencyCheck);
        self.check_interrupt(interrupt)?;
        for check in &self.plan.tool_checks {
            let version = setup::check_tool(check).await?;
            log::info!("{}: {}", check.program, version);
        }

        self.enter(Phase::EnvSetup);
        self.check_interrupt(interrupt)?;
        match setup::ensure_env_file(&self.plan.env_file, &self.plan.env_template)? {
            EnvFileStatus::Present => log::info!("Environment file found"),
            EnvFileStatus::CreatedFromTemplate => log::warn!(
                "{} not found, created it from {}",
                self.plan.env_file.display(),
                self.plan.env_template.display()
            ),
        }

        self.enter(Phase::InstallDeps);
        for step in &self.plan.installs {
            self.check_interrupt(interrupt)?;
            match setup::install_dependencies(step).await? {
                InstallStatus::AlreadyInstalled => {
                    log::info!("{} dependencies already installed", step.service)
                }
                InstallStatus::Installed => log::info!("{} dependencies installed", step.service),
            }
        }

        self.enter(Phase::StartBackend);
        self.check_interrupt(interrupt)?;
        let backend = self.plan.backend.name().to_string();
        supervisor.start(self.plan.backend.process.clone())?;

        self.enter(Phase::GateOnBackend);
        log::info!("Waiting for {}...", backend);
        let ready = {
            let gate = supervisor.wait_for_ready(&backend, self.plan.timing.ready_timeout);
            tokio::pin!(gate);
            loop {
                tokio::select! {
                    ready = &mut gate => break ready,
                    Some((name, signal)) = signals.recv() => {
                        console.show(&name, signal, supervisor);
                    }
                    _ = wait_for_interrupt(interrupt) => {
                        log::info!("Shutdown requested, aborting launch");
                        return Err(LaunchError::InterruptedDuringStartup(Phase::GateOnBackend));
                    }
                }
            }
        };
        if !ready {
            if let Some(exit) = supervisor.poll_exits() {
                return Err(LaunchError::UnexpectedExit(exit));
            }
            log::warn!(
                "{} not ready after {:?}, starting {} anyway",
                backend,
                self.plan.timing.ready_timeout,
                self.plan.frontend.name()
            );
        }

        self.enter(Phase::StartFrontend);
        self.check_interrupt(interrupt)?;
        supervisor.start(self.plan.frontend.process.clone())?;

        Ok(())
    }

    async fn monitor(
        &mut self,
        supervisor: &mut Supervisor,
        signals: &mut mpsc::UnboundedReceiver<(String, Signal)>,
        console: &mut Console,
        interrupt: &mut watch::Receiver<()>,
    ) -> Outcome {
        log::info!("Monitoring services (press Ctrl+C to stop)");
        let mut ticker = tokio::time::interval(self.plan.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = wait_for_interrupt(interrupt) => {
                    log::info!("Received interrupt signal");
                    let healthy = supervisor.poll_exits().is_none();
                    return Outcome::Interrupted {
                        all_ready: healthy && supervisor.all_ready(),
                    };
                }
                Some((name, signal)) = signals.recv() => {
                    let closed = signal == Signal::Closed;
                    console.show(&name, signal, supervisor);
                    if closed {
                        if let Some(exit) = supervisor.poll_exits() {
                            return Outcome::Failed(LaunchError::UnexpectedExit(exit));
                        }
                    }
                }
                _ = ticker.tick() => {
                    if let Some(exit) = supervisor.poll_exits() {
                        return Outcome::Failed(LaunchError::UnexpectedExit(exit));
                    }
                }
            }
        }
    }
}

/// Resolve on the next interrupt; never resolve if the sender is gone
async fn wait_for_interrupt(interrupt: &mut watch::Receiver<()>) {
    if interrupt.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Presentation of child output and readiness signals
struct Console {
    browser_url: Option<String>,
    /// Service name to the URL it listens on
    urls: HashMap<String, String>,
    announced: bool,
}

impl Console {
    fn new(plan: &LaunchPlan) -> Self {
        let urls = [&plan.backend, &plan.frontend]
            .into_iter()
            .filter_map(|s| s.url.clone().map(|url| (s.name().to_string(), url)))
            .collect();
        Self {
            browser_url: plan.browser_url.clone(),
            urls,
            announced: false,
        }
    }

    fn show(&mut self, name: &str, signal: Signal, supervisor: &Supervisor) {
        match signal {
            Signal::Ready(line) => {
                log::info!("[{}] {}", name, line);
                match supervisor.get(name).and_then(|p| p.pid()) {
                    Some(pid) => println!("✅ {} started (PID {})", name, pid),
                    None => println!("✅ {} started", name),
                }
                self.announce_if_all_ready(supervisor);
            }
            Signal::Error(line) => log::error!("[{} Error] {}", name, line),
            Signal::Notice(line) => {
                log::info!("[{}] {}", name, line);
                println!("✅ [{}] {}", name, line);
            }
            Signal::Info(line) => {
                // Startup chatter is useful until the service is up, noise after
                let ready = supervisor
                    .get(name)
                    .map(|p| p.readiness().is_ready())
                    .unwrap_or(false);
                if ready {
                    log::debug!("[{}] {}", name, line);
                } else {
                    log::info!("[{}] {}", name, line);
                }
            }
            Signal::Closed => log::debug!("[{}] Output closed", name),
        }
    }

    fn announce_if_all_ready(&mut self, supervisor: &Supervisor) {
        if self.announced || supervisor.len() < 2 || !supervisor.all_ready() {
            return;
        }
        self.announced = true;

        println!();
        println!("🎉 LearnForge is ready!");
        for name in supervisor.names() {
            match self.urls.get(name) {
                Some(url) => println!("   {}: {}", name, url),
                None => println!("   {}", name),
            }
        }
        if let Some(url) = &self.browser_url {
            println!("   Opening {} ...", url);
        }
        println!("   Press Ctrl+C to stop all services");
        println!();

        if let Some(url) = &self.browser_url {
            setup::open_browser(url);
        }
    }
}

/// Fatal launcher errors
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Failed to start service: {0}")]
    Spawn(#[from] SupervisorError),

    #[error("Interrupted during {0:?}")]
    InterruptedDuringStartup(Phase),

    #[error("{0}")]
    UnexpectedExit(UnexpectedExit),
}

impl LaunchError {
    /// Follow-up advice for the user, where there is any
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            LaunchError::Setup(SetupError::ToolMissing { .. }) => {
                Some("Please install Node.js (which includes npm) from https://nodejs.org/")
            }
            LaunchError::Setup(SetupError::EnvSetupFailed { .. }) => {
                Some("Create the environment file manually and run the launcher again")
            }
            _ => None,
        }
    }
}
