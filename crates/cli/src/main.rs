use clap::Parser;
use commands::Commands;
use engine_config::{
    BridgePaths, CliFlags, ConfigError, EnvSecretResolver, RunOptions,
    mapping_file::{load_mappings, select},
};
use engine_core::state::JsonStateStore;
use engine_runtime::{Runner, control_plane::ControlPlaneConfig};
use model::run_state::RunState;
use std::{collections::HashMap, process};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{error::CliError, shutdown::ExitCode, shutdown::ShutdownCoordinator};

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "bridge-sync", version, about = "Relational/log extraction bridge to the control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    init_logging();

    let exit_code = match run_cli().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::ConfigError.as_i32()
        }
    };

    process::exit(exit_code);
}

fn init_logging() {
    let level = std::env::var("BRIDGE_LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .init();
}

async fn run_cli() -> Result<i32, CliError> {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let shutdown_coordinator = ShutdownCoordinator::new(cancel.clone());
    shutdown_coordinator.register_handlers();

    match cli.command {
        Commands::Sync {
            mapping_ids,
            dry_run,
            force,
            sequential,
            parallel: _,
            workers,
            batch_size,
            status,
        } => {
            cmd_sync(
                CliFlags {
                    mapping_ids,
                    dry_run,
                    force,
                    sequential,
                    workers,
                    batch_size,
                },
                status,
                cancel,
            )
            .await
        }
        Commands::Status { mapping_ids, json } => cmd_status(mapping_ids, json).await,
    }
}

async fn cmd_sync(flags: CliFlags, print_json: bool, cancel: CancellationToken) -> Result<i32, CliError> {
    let paths = BridgePaths::resolve();

    let mappings = match load_mappings(&paths.mappings_dir()) {
        Ok(m) => m,
        Err(err) => return Ok(config_error_exit_code(&err)),
    };
    let mappings = match select(mappings, &flags.mapping_ids) {
        Ok(m) => m,
        Err(err) => return Ok(config_error_exit_code(&err)),
    };

    let run_options = RunOptions::resolve(flags, mappings.len())?;
    let control_plane_config =
        ControlPlaneConfig::from_env(run_options.http_timeout, run_options.upload_timeout)?;

    let runner = Runner::new(paths, control_plane_config);
    let secrets = EnvSecretResolver;

    info!(mappings = mappings.len(), "starting sync run");
    let report = runner.run(&mappings, &run_options, &secrets, cancel.clone()).await;

    if print_json {
        output::print_report_json(&report)?;
    } else {
        output::print_report_human(&report);
    }

    if cancel.is_cancelled() {
        return Ok(ExitCode::Cancelled.as_i32());
    }
    Ok(report.exit_code())
}

async fn cmd_status(mapping_ids: Vec<String>, print_json: bool) -> Result<i32, CliError> {
    let paths = BridgePaths::resolve();

    let mappings = match load_mappings(&paths.mappings_dir()) {
        Ok(m) => m,
        Err(err) => return Ok(config_error_exit_code(&err)),
    };
    let mappings = match select(mappings, &mapping_ids) {
        Ok(m) => m,
        Err(err) => return Ok(config_error_exit_code(&err)),
    };

    let store = JsonStateStore::new(paths.state_file());
    let mut states: HashMap<String, RunState> = HashMap::new();
    for mapping in &mappings {
        let state = store.load(&mapping.id).await.map_err(|err| {
            CliError::Sync(engine_core::error::SyncError::StateStore(err))
        })?;
        states.insert(mapping.id.clone(), state);
    }

    if print_json {
        output::print_status_json(&states)?;
    } else {
        let mut ids: Vec<&String> = states.keys().collect();
        ids.sort();
        for id in ids {
            output::print_status_human(id, &states[id]);
        }
    }

    Ok(ExitCode::Success.as_i32())
}

fn config_error_exit_code(err: &ConfigError) -> i32 {
    tracing::error!("{err}");
    match err {
        ConfigError::NoMappingsFound(_) | ConfigError::UnknownMapping { .. } => {
            ExitCode::NoMappingsMatched.as_i32()
        }
        _ => ExitCode::ConfigError.as_i32(),
    }
}
