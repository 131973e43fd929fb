//! PatchFixer - property-rename patcher for mods installed through cslol-manager
//!
//! Main entry point for the interactive console.
//!
//! # Execution Flow
//!
//! 1. Load `PatchFixer Data/PatchFixer Config.yaml` (written with defaults on first start)
//! 2. Initialize logging → logs/patchfixer.<date>
//! 3. Create the tokio runtime, [`StateManager`] and [`Metrics`]
//! 4. Show the profile menu and run the chosen profile through the [`Pipeline`]
//! 5. Repeat until the user picks Exit or stdin is closed
//! 6. Log the metrics summary and shut down the runtime with a 5s timeout
//!
//! The mod manager must be running while a profile is applied; its mods
//! directory is found from the running process.

use anyhow::{Context, Result};
use camino::Utf8Path;
use patchfixer::services::{ProcessLocator, ProcessToolRunner};
use patchfixer::ui::{MenuChoice, menu_text, parse_choice, run_with_console};
use patchfixer::{APP_NAME, ConfigManager, Metrics, Pipeline, PipelineOptions, StateManager, VERSION};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

const CONFIG_DIR: &str = "PatchFixer Data";
const LOG_DIR: &str = "logs";

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let wrote_default = config_manager.write_default_if_missing()?;
    let user_config = config_manager.load_user_config()?;
    let settings = &user_config.settings;

    // Hold the guard for the whole program so buffered log lines are flushed
    let _log_guard = patchfixer::logging::setup_logging_with_console(
        Utf8Path::new(LOG_DIR),
        "patchfixer",
        settings.debug_mode,
        settings.debug_mode,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    if wrote_default {
        tracing::info!("Wrote default configuration to {}", config_manager.user_config_path());
    }

    let options = PipelineOptions::from_settings(settings);
    for tool in options.tools.missing() {
        tracing::warn!("External tool not found: {}", tool);
        println!("Warning: {} was not found; runs will fail until it is installed.", tool);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("patchfixer-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!(
        "Tokio runtime initialized; stage parallelism {}",
        options.parallelism
    );

    let state_manager = Arc::new(StateManager::new());
    let metrics = Arc::new(Metrics::new());

    let pipeline = Pipeline::new(
        Arc::new(ProcessToolRunner::new(settings.tool_timeout())),
        ProcessLocator::new(settings.manager_process.clone()),
        options,
        Arc::clone(&state_manager),
        Arc::clone(&metrics),
    )?;

    let profiles = user_config.profiles();
    tracing::info!("{} profiles available", profiles.len());

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    loop {
        print!("{}", menu_text(&profiles));
        io::stdout().flush().context("Failed to write to stdout")?;

        line.clear();
        let read = input.read_line(&mut line).context("Failed to read from stdin")?;
        if read == 0 {
            tracing::info!("Input closed, exiting");
            break;
        }

        match parse_choice(&line, profiles.len()) {
            MenuChoice::Run(index) => {
                let profile = &profiles[index];
                if profile.is_empty() {
                    println!("Profile '{}' has no rules.", profile.name);
                    continue;
                }
                runtime.block_on(run_with_console(&pipeline, profile));
            }
            MenuChoice::Exit => break,
            MenuChoice::Invalid(choice) => {
                println!("Invalid choice '{}'. Please try again.", choice);
            }
        }
    }

    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(())
}
