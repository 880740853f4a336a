//! LearnForge Launcher
//!
//! Starts the LearnForge backend and frontend for local development and
//! keeps them running until Ctrl+C.
//!
//! # Overview
//!
//! The launcher:
//! - Checks that the toolchain is installed and prepares the `.env` file
//! - Installs dependencies for each service when they are missing
//! - Starts the backend and waits for its ready line before the frontend
//! - Streams service output and reports readiness and errors
//! - Stops both services in reverse order on any exit path
//!
//! # Example Launch Config
//!
//! Every field is optional; an absent file means these defaults.
//!
//! ```yaml
//! version: "1.0"
//!
//! args:
//!   backend_port:
//!     default: 5000
//!
//! package_manager: npm
//!
//! backend:
//!   name: Server
//!   dir: server
//!   args: [start]
//!   env:
//!     PORT: "$(arg backend_port)"
//!   ready: ["server running on port"]
//!   notices: ["database connected"]
//!   url: "http://localhost:$(arg backend_port)"
//!
//! frontend:
//!   name: Client
//!   dir: client
//!   args: [run, dev]
//!   ready: ["local:", "http"]
//!   url: "http://localhost:5173"
//! ```

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod runtime;
pub mod setup;

pub use cli::LaunchArgs;
pub use config::{
    ConfigSource, LaunchConfig, LaunchConfigError, LaunchPlan, PlanError, SubstitutionContext,
    SubstitutionError,
};
pub use lifecycle::{LaunchError, LaunchReport, Lifecycle, Outcome, Phase};
pub use runtime::{
    ManagedProcess, ProcessConfig, ProcessError, ProcessState, Signal, Supervisor,
    SupervisorConfig, SupervisorError,
};
pub use setup::SetupError;
