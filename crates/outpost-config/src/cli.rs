//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, RuntimeMode};

/// Outpost runtime command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "outpost", about = "Outpost world runtime")]
pub struct CliArgs {
    /// Runtime mode (local or networked).
    #[arg(long)]
    pub mode: Option<RuntimeMode>,

    /// World seed.
    #[arg(long)]
    pub world_seed: Option<String>,

    /// Server address.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Simulation tick rate in Hz.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(mode) = args.mode {
            self.runtime.mode = mode;
        }
        if let Some(ref seed) = args.world_seed {
            self.runtime.world_seed = seed.clone();
        }
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(rate) = args.tick_rate
            && rate > 0
        {
            self.sim.tick_rate_hz = rate;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            mode: Some(RuntimeMode::Networked),
            server: Some("192.168.1.1".to_string()),
            tick_rate: Some(0),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.runtime.mode, RuntimeMode::Networked);
        assert_eq!(config.network.server_address, "192.168.1.1");
        // Non-overridden fields retain defaults; a zero tick rate is ignored.
        assert_eq!(config.network.server_port, 7777);
        assert_eq!(config.sim.tick_rate_hz, 20);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["outpost", "--mode", "networked", "--port", "9000"]);
        assert_eq!(args.mode, Some(RuntimeMode::Networked));
        assert_eq!(args.port, Some(9000));
    }
}
