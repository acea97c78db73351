//! Process-environment overrides for runtime mode and peer endpoint.

use crate::{Config, RuntimeMode};

/// Selects `local` or `networked`.
pub const ENV_RUNTIME_MODE: &str = "OUTPOST_RUNTIME_MODE";
/// `host:port` of the remote peer.
pub const ENV_SERVER_ADDR: &str = "OUTPOST_SERVER_ADDR";
/// World seed override.
pub const ENV_WORLD_SEED: &str = "OUTPOST_WORLD_SEED";

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_RUNTIME_MODE) {
            match raw.parse::<RuntimeMode>() {
                Ok(mode) => self.runtime.mode = mode,
                Err(err) => log::warn!("Ignoring {ENV_RUNTIME_MODE}: {err}"),
            }
        }

        if let Some(raw) = lookup(ENV_SERVER_ADDR) {
            match raw.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
                    Ok(port) => {
                        self.network.server_address = host.to_string();
                        self.network.server_port = port;
                    }
                    Err(_) => log::warn!("Ignoring {ENV_SERVER_ADDR}: invalid port in '{raw}'"),
                },
                _ => log::warn!("Ignoring {ENV_SERVER_ADDR}: expected host:port, got '{raw}'"),
            }
        }

        if let Some(seed) = lookup(ENV_WORLD_SEED)
            && !seed.trim().is_empty()
        {
            self.runtime.world_seed = seed.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_selects_networked_mode() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[
            (ENV_RUNTIME_MODE, "networked"),
            (ENV_SERVER_ADDR, "world.example:9100"),
        ]));
        assert_eq!(config.runtime.mode, RuntimeMode::Networked);
        assert_eq!(config.network.server_address, "world.example");
        assert_eq!(config.network.server_port, 9100);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[
            (ENV_RUNTIME_MODE, "satellite"),
            (ENV_SERVER_ADDR, "no-port"),
            (ENV_WORLD_SEED, "   "),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_world_seed_override() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[(ENV_WORLD_SEED, "austin-7")]));
        assert_eq!(config.runtime.world_seed, "austin-7");
    }
}
