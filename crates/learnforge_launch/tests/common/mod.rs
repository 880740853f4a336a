//! Test helpers for launcher lifecycle tests

#![allow(dead_code)]

use learnforge_launch::{LaunchConfig, LaunchPlan, LaunchReport, Lifecycle};
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

/// Upper bound for any single lifecycle run in tests
pub const RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Frontend script that reports a Vite-style ready line and keeps running
pub const FRONTEND_READY: &str =
    "echo '  VITE v5.0.0  ready in 300 ms'; echo '  Local:   http://localhost:5173/'; exec sleep 30";

/// Backend script that reports ready and keeps running
pub const BACKEND_READY: &str =
    "echo 'Database connected'; echo 'Server running on port 5000'; exec sleep 30";

/// A throwaway project checkout with `server/` and `client/` directories
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp project");
        std::fs::create_dir(dir.path().join("server")).expect("create server dir");
        std::fs::create_dir(dir.path().join("client")).expect("create client dir");
        std::fs::write(dir.path().join(".env"), "PORT=5000\n").expect("write .env");
        Self { dir }
    }

    /// Config running both services as `sh -c <script>` with short timings
    pub fn config(&self, backend_script: &str, frontend_script: &str) -> LaunchConfig {
        let mut config = LaunchConfig::default();
        config.tools.clear();
        config.browser.enabled = false;
        config.timing.ready_timeout_secs = 5;
        config.timing.grace_period_secs = 1;
        config.timing.poll_interval_ms = 100;

        for (service, script) in [
            (&mut config.backend, backend_script),
            (&mut config.frontend, frontend_script),
        ] {
            service.command = Some("sh".to_string());
            service.args = vec!["-c".to_string(), script.to_string()];
            service.install = false;
        }

        config
    }

    pub fn plan(&self, config: &LaunchConfig) -> LaunchPlan {
        LaunchPlan::resolve(config, self.dir.path(), &HashMap::new()).expect("resolve plan")
    }
}

/// Run the lifecycle, sending one interrupt after `interrupt_after` if given
pub async fn run_lifecycle(plan: LaunchPlan, interrupt_after: Option<Duration>) -> LaunchReport {
    let (tx, rx) = watch::channel(());

    if let Some(delay) = interrupt_after {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(());
            // Keep the sender alive so the receiver never sees a closed channel
            tokio::time::sleep(RUN_TIMEOUT).await;
        });
    } else {
        // Held by a task so dropping it here does not matter either way
        tokio::spawn(async move {
            tokio::time::sleep(RUN_TIMEOUT).await;
            drop(tx);
        });
    }

    tokio::time::timeout(RUN_TIMEOUT, Lifecycle::new(plan).run(rx))
        .await
        .expect("lifecycle run timed out")
}

/// Run with an interrupt already pending before startup begins
pub async fn run_interrupted_before_start(plan: LaunchPlan) -> LaunchReport {
    let (tx, rx) = watch::channel(());
    tx.send(()).expect("receiver alive");

    let report = tokio::time::timeout(RUN_TIMEOUT, Lifecycle::new(plan).run(rx))
        .await
        .expect("lifecycle run timed out");
    drop(tx);
    report
}

/// Names from the shutdown report, in stop order
pub fn shutdown_order(report: &LaunchReport) -> Vec<&str> {
    report.shutdown.iter().map(|r| r.name.as_str()).collect()
}
