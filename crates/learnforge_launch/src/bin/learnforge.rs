//! LearnForge development launcher
//!
//! Usage:
//!   learnforge
//!   learnforge learnforge.yaml -a backend_port:=6000
//!   learnforge --dry-run

use learnforge_launch::{ConfigSource, LaunchArgs, LaunchConfig, LaunchPlan, Lifecycle};
use std::path::PathBuf;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    let root = match resolve_root(args.root.clone()) {
        Ok(root) => root,
        Err(e) => {
            log::error!("Failed to determine project root: {}", e);
            std::process::exit(1);
        }
    };

    // Load launch config; a missing file means stock defaults
    let config_path = root.join(&args.config);
    log::debug!("Loading launch config: {}", config_path.display());
    let (config, source) = match LaunchConfig::load(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("Failed to load launch config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        match &source {
            ConfigSource::File(path) => println!("Launch config '{}' is valid", path.display()),
            ConfigSource::Defaults => println!(
                "No launch config at '{}', the built-in defaults are in use",
                config_path.display()
            ),
        }
        println!("  Version: {}", config.version);
        println!("  Args: {}", config.args.len());
        println!("  Backend: {} ({})", config.backend.name, config.backend.dir);
        println!("  Frontend: {} ({})", config.frontend.name, config.frontend.dir);
        return;
    }

    let mut plan = match LaunchPlan::resolve(&config, &root, &args.arg_overrides()) {
        Ok(plan) => plan,
        Err(e) => {
            log::error!("Failed to resolve launch plan: {}", e);
            std::process::exit(1);
        }
    };
    if args.skip_install {
        plan = plan.without_install();
    }
    if args.no_browser {
        plan = plan.without_browser();
    }

    // Dry run mode
    if args.dry_run {
        println!("{}", plan);
        return;
    }

    println!("🚀 Starting LearnForge ({})...", source);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, initiating shutdown...");
        let _ = shutdown_tx.send(());
    }) {
        log::error!("Error setting Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let report = Lifecycle::new(plan).run(shutdown_rx).await;
    let code = report.exit_code();
    log::debug!("Launcher exiting with code {}", code);
    std::process::exit(code);
}

fn resolve_root(root: Option<PathBuf>) -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(match root {
        Some(root) if root.is_absolute() => root,
        Some(root) => cwd.join(root),
        None => cwd,
    })
}
