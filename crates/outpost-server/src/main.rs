//! Standalone outpost world server.

use std::sync::Arc;

use clap::Parser;
use outpost_config::{CliArgs, Config, default_config_dir};
use outpost_runtime::LocalRuntime;
use outpost_server::{ServerSettings, WorldServer};

fn load_config(args: &CliArgs) -> (Config, Option<std::path::PathBuf>) {
    let config_dir = args.config.clone().or_else(default_config_dir);
    let mut config = match config_dir.as_deref() {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|err| {
            eprintln!("failed to load config from {}: {err}", dir.display());
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_env_overrides();
    config.apply_cli_overrides(args);
    (config, config_dir)
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let (config, config_dir) = load_config(&args);
    let log_dir = config_dir.map(|dir| dir.join("logs"));
    outpost_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    tracing::info!(
        seed = %config.runtime.world_seed,
        tick_rate = config.sim.tick_rate_hz,
        "starting world server"
    );

    let runtime = Arc::new(LocalRuntime::new(
        config.runtime.world_seed.clone(),
        config.sim.clone(),
    ));
    let server = WorldServer::new(ServerSettings::from_config(&config), runtime);

    tokio::select! {
        result = server.run() => {
            if let Err(err) = result {
                tracing::error!(%err, "world server failed");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            server.shutdown();
        }
    }
}
