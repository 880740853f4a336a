//! Lifecycle Scenario Tests
//!
//! Drives the full launcher against `sh` scripts standing in for the
//! backend and frontend dev servers.

#![cfg(unix)]

mod common;

use common::*;
use learnforge_launch::runtime::StopOutcome;
use learnforge_launch::{LaunchError, Outcome, Phase, SetupError, SupervisorError};
use std::time::Duration;

#[tokio::test]
async fn test_interrupt_with_both_ready_exits_cleanly() {
    let project = TestProject::new();
    let plan = project.plan(&project.config(BACKEND_READY, FRONTEND_READY));

    let report = run_lifecycle(plan, Some(Duration::from_millis(2000))).await;

    assert!(matches!(
        report.outcome,
        Outcome::Interrupted { all_ready: true }
    ));
    assert_eq!(report.exit_code(), 0);
    assert!(report.all_ready_announced);
    assert_eq!(
        report.phases,
        vec![
            Phase::Init,
            Phase::DependencyCheck,
            Phase::EnvSetup,
            Phase::InstallDeps,
            Phase::StartBackend,
            Phase::GateOnBackend,
            Phase::StartFrontend,
            Phase::Monitoring,
            Phase::ShuttingDown,
            Phase::Terminal,
        ]
    );
}

#[tokio::test]
async fn test_shutdown_runs_in_reverse_start_order() {
    let project = TestProject::new();
    let plan = project.plan(&project.config(BACKEND_READY, FRONTEND_READY));

    let report = run_lifecycle(plan, Some(Duration::from_millis(1500))).await;

    assert_eq!(shutdown_order(&report), vec!["Client", "Server"]);
    for entry in &report.shutdown {
        assert!(
            matches!(
                entry.outcome,
                Ok(StopOutcome::Exited(_)) | Ok(StopOutcome::Killed)
            ),
            "{} not stopped: {:?}",
            entry.name,
            entry.outcome
        );
    }
}

#[tokio::test]
async fn test_term_ignoring_service_is_killed_after_grace() {
    let project = TestProject::new();
    let stubborn = "trap '' TERM; echo '  Local:   http://localhost:5173/'; while true; do sleep 1; done";
    let plan = project.plan(&project.config(BACKEND_READY, stubborn));

    let report = run_lifecycle(plan, Some(Duration::from_millis(1500))).await;

    let client = report
        .shutdown
        .iter()
        .find(|r| r.name == "Client")
        .expect("client stopped");
    assert!(matches!(client.outcome, Ok(StopOutcome::Killed)));
}

#[tokio::test]
async fn test_backend_crash_stops_frontend_and_fails() {
    let project = TestProject::new();
    let crashing = "echo 'Server running on port 5000'; sleep 1; echo 'Error: database connection lost'; sleep 0.3; exit 1";
    let plan = project.plan(&project.config(crashing, FRONTEND_READY));

    let report = run_lifecycle(plan, None).await;

    match &report.outcome {
        Outcome::Failed(LaunchError::UnexpectedExit(exit)) => {
            assert_eq!(exit.name, "Server");
            assert_eq!(exit.code, Some(1));
            assert_eq!(
                exit.last_error.as_deref(),
                Some("Error: database connection lost")
            );
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(report.exit_code(), 1);

    assert_eq!(shutdown_order(&report), vec!["Client", "Server"]);
    assert!(matches!(
        report.shutdown[0].outcome,
        Ok(StopOutcome::Exited(_)) | Ok(StopOutcome::Killed)
    ));
    assert!(matches!(
        report.shutdown[1].outcome,
        Ok(StopOutcome::AlreadyStopped)
    ));
}

#[tokio::test]
async fn test_backend_spawn_failure_never_starts_frontend() {
    let project = TestProject::new();
    let mut config = project.config(BACKEND_READY, FRONTEND_READY);
    config.backend.command = Some("learnforge-definitely-missing-binary".to_string());
    let plan = project.plan(&config);

    let report = run_lifecycle(plan, None).await;

    assert!(matches!(
        report.outcome,
        Outcome::Failed(LaunchError::Spawn(SupervisorError::Process(_)))
    ));
    assert_eq!(report.exit_code(), 1);
    assert!(!report.phases.contains(&Phase::StartFrontend));
    assert!(report.shutdown.is_empty());
}

#[tokio::test]
async fn test_frontend_never_ready_keeps_running_without_banner() {
    let project = TestProject::new();
    let silent = "echo 'compiling...'; exec sleep 30";
    let plan = project.plan(&project.config(BACKEND_READY, silent));

    let report = run_lifecycle(plan, Some(Duration::from_millis(2000))).await;

    assert!(matches!(
        report.outcome,
        Outcome::Interrupted { all_ready: false }
    ));
    assert_eq!(report.exit_code(), 1);
    assert!(!report.all_ready_announced);
    assert!(report.phases.contains(&Phase::Monitoring));
    assert_eq!(shutdown_order(&report), vec!["Client", "Server"]);
}

#[tokio::test]
async fn test_backend_gate_timeout_starts_frontend_anyway() {
    let project = TestProject::new();
    let mut config = project.config("echo 'booting'; exec sleep 30", FRONTEND_READY);
    config.timing.ready_timeout_secs = 1;
    let plan = project.plan(&config);

    let report = run_lifecycle(plan, Some(Duration::from_millis(2500))).await;

    assert!(report.phases.contains(&Phase::StartFrontend));
    assert!(matches!(
        report.outcome,
        Outcome::Interrupted { all_ready: false }
    ));
    assert_eq!(shutdown_order(&report), vec!["Client", "Server"]);
}

#[tokio::test]
async fn test_interrupt_before_start_spawns_nothing() {
    let project = TestProject::new();
    let plan = project.plan(&project.config(BACKEND_READY, FRONTEND_READY));

    let report = run_interrupted_before_start(plan).await;

    assert!(matches!(
        report.outcome,
        Outcome::Failed(LaunchError::InterruptedDuringStartup(Phase::DependencyCheck))
    ));
    assert_eq!(report.exit_code(), 1);
    assert!(report.shutdown.is_empty());
    assert_eq!(report.phases.last(), Some(&Phase::Terminal));
}

#[tokio::test]
async fn test_missing_tool_aborts_before_services() {
    let project = TestProject::new();
    let mut config = project.config(BACKEND_READY, FRONTEND_READY);
    config.tools = vec!["learnforge-definitely-missing-binary".to_string()];
    let plan = project.plan(&config);

    let report = run_lifecycle(plan, None).await;

    assert!(matches!(
        report.outcome,
        Outcome::Failed(LaunchError::Setup(SetupError::ToolMissing { .. }))
    ));
    assert!(!report.phases.contains(&Phase::StartBackend));
    assert!(report.shutdown.is_empty());
}

#[tokio::test]
async fn test_env_file_created_from_template() {
    let project = TestProject::new();
    let root = project.dir.path();
    std::fs::remove_file(root.join(".env")).unwrap();
    std::fs::write(root.join(".env.example"), "PORT=5000\nDB_URL=\n").unwrap();
    let plan = project.plan(&project.config(BACKEND_READY, FRONTEND_READY));

    let report = run_lifecycle(plan, Some(Duration::from_millis(1500))).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        std::fs::read_to_string(root.join(".env")).unwrap(),
        "PORT=5000\nDB_URL=\n"
    );
}

#[tokio::test]
async fn test_missing_env_template_aborts() {
    let project = TestProject::new();
    std::fs::remove_file(project.dir.path().join(".env")).unwrap();
    let plan = project.plan(&project.config(BACKEND_READY, FRONTEND_READY));

    let report = run_lifecycle(plan, None).await;

    assert!(matches!(
        report.outcome,
        Outcome::Failed(LaunchError::Setup(SetupError::EnvSetupFailed { .. }))
    ));
    assert!(report.shutdown.is_empty());
}

#[tokio::test]
async fn test_install_runs_only_when_marker_missing() {
    let project = TestProject::new();
    let root = project.dir.path();
    // `sh install` runs the service's `install` script in its directory
    let install_script = "mkdir -p node_modules; echo ran > install.log\n";
    std::fs::write(root.join("server/install"), install_script).unwrap();
    std::fs::write(root.join("client/install"), install_script).unwrap();
    std::fs::create_dir(root.join("client/node_modules")).unwrap();

    let mut config = project.config(BACKEND_READY, FRONTEND_READY);
    config.package_manager = "sh".to_string();
    config.backend.install = true;
    config.frontend.install = true;
    let plan = project.plan(&config);

    let report = run_lifecycle(plan, Some(Duration::from_millis(1500))).await;

    assert_eq!(report.exit_code(), 0, "outcome: {:?}", report.outcome);
    assert!(root.join("server/install.log").exists());
    assert!(root.join("server/node_modules").is_dir());
    assert!(!root.join("client/install.log").exists());
}

#[tokio::test]
async fn test_failed_install_aborts_before_services() {
    let project = TestProject::new();
    let mut config = project.config(BACKEND_READY, FRONTEND_READY);
    config.package_manager = "sh".to_string();
    config.backend.install = true;
    let plan = project.plan(&config);

    // No `install` script in server/, so `sh install` fails
    let report = run_lifecycle(plan, None).await;

    match &report.outcome {
        Outcome::Failed(LaunchError::Setup(SetupError::InstallFailed { service, .. })) => {
            assert_eq!(service, "Server");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(report.shutdown.is_empty());
}

#[tokio::test]
async fn test_undecodable_output_does_not_hide_ready_line() {
    let project = TestProject::new();
    let latin1 = "printf 'caf\\351 loaded\\n'; printf 'caf\\351 warn\\n' >&2; \
                  echo 'Server running on port 5000'; exec sleep 30";
    let plan = project.plan(&project.config(latin1, FRONTEND_READY));

    let report = run_lifecycle(plan, Some(Duration::from_millis(2000))).await;

    assert!(matches!(
        report.outcome,
        Outcome::Interrupted { all_ready: true }
    ));
    assert!(report.all_ready_announced);
}
