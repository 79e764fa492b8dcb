//! Module host entry point.
//!
//! Loads configuration, sets up logging, activates every module in the
//! configured directory and reports the result. With `--stay-resident` the
//! activated modules stay loaded until a shutdown signal arrives.

mod cli;
mod config;
mod logging;

use anyhow::{anyhow, Context, Result};
use cli::CliArgs;
use config::AppConfig;
use module_loader::{create_lifecycle_controller, ActivationReport, LifecycleController};
use tokio::signal;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("module_host: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_overrides(&args);
    config
        .validate()
        .context("Configuration validation failed")?;

    let log_path = logging::setup_logging(&config.logging, &config.loader.log_directory)?;
    info!(
        "Config: {} | Modules: {} | Log file: {}",
        args.config_path.display(),
        config.loader.module_directory.display(),
        log_path.display()
    );

    let controller = create_lifecycle_controller(config.loader.clone());
    let report = controller
        .init()
        .await
        .ok_or_else(|| anyhow!("Module activation did not complete, see {}", log_path.display()))?;

    if args.report_json {
        print_report(&report)?;
    }

    if args.stay_resident {
        stay_resident(&controller).await?;
    }

    Ok(())
}

fn print_report(report: &ActivationReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

async fn stay_resident(controller: &LifecycleController) -> Result<()> {
    let registry = controller.registry();
    info!(
        "{} modules resident: {:?}",
        registry.count().await,
        registry.names().await
    );
    info!("Press Ctrl+C to shut down");

    shutdown_signal().await?;

    info!("Shutting down, unloading {} modules", registry.count().await);
    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where signals exist.
#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        interrupted = signal::ctrl_c() => {
            interrupted?;
            info!("Received SIGINT");
        }
        _ = terminate.recv() => {
            info!("Received SIGTERM");
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
