//! Explicit runtime context.
//!
//! A [`RuntimeContext`] is built once at process start from the loaded
//! [`Config`] (with environment overrides applied) and handed to whatever
//! needs the world runtime. It picks the local or networked implementation
//! and owns its background tasks.

use std::sync::Arc;

use outpost_config::{Config, RuntimeMode};
use outpost_net::{NetSettings, NetworkedRuntime};
use outpost_runtime::{LocalRuntime, WorldRuntimeClient};
use tokio::task::JoinHandle;

enum Backend {
    Local {
        runtime: Arc<LocalRuntime>,
        tick_driver: JoinHandle<()>,
    },
    Networked(Arc<NetworkedRuntime>),
}

pub struct RuntimeContext {
    config: Config,
    backend: Backend,
}

impl RuntimeContext {
    /// Construct the runtime selected by `config.runtime.mode`.
    ///
    /// Must be called from within a tokio runtime: the local tick driver and
    /// the networked connection task are spawned immediately.
    pub fn from_config(config: Config) -> Self {
        let backend = match config.runtime.mode {
            RuntimeMode::Local => {
                let runtime = Arc::new(LocalRuntime::new(
                    config.runtime.world_seed.clone(),
                    config.sim.clone(),
                ));
                let tick_driver = runtime.start_tick_driver();
                Backend::Local {
                    runtime,
                    tick_driver,
                }
            }
            RuntimeMode::Networked => {
                let settings = NetSettings::from_config(&config);
                Backend::Networked(Arc::new(NetworkedRuntime::connect(settings)))
            }
        };
        tracing::info!(
            mode = %config.runtime.mode,
            world_seed = %config.runtime.world_seed,
            "runtime context created"
        );
        Self { config, backend }
    }

    /// Apply `OUTPOST_*` environment overrides to `config`, then build.
    pub fn from_env(mut config: Config) -> Self {
        config.apply_env_overrides();
        Self::from_config(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> RuntimeMode {
        self.client().mode()
    }

    pub fn client(&self) -> &dyn WorldRuntimeClient {
        match &self.backend {
            Backend::Local { runtime, .. } => runtime.as_ref() as &dyn WorldRuntimeClient,
            Backend::Networked(runtime) => runtime.as_ref() as &dyn WorldRuntimeClient,
        }
    }

    /// Shared handle for consumers that outlive a borrow of the context.
    pub fn shared_client(&self) -> Arc<dyn WorldRuntimeClient> {
        match &self.backend {
            Backend::Local { runtime, .. } => Arc::clone(runtime) as Arc<dyn WorldRuntimeClient>,
            Backend::Networked(runtime) => Arc::clone(runtime) as Arc<dyn WorldRuntimeClient>,
        }
    }

    /// The in-process runtime, when running locally. Directives and the
    /// event log are only reachable this way.
    pub fn local(&self) -> Option<&Arc<LocalRuntime>> {
        match &self.backend {
            Backend::Local { runtime, .. } => Some(runtime),
            Backend::Networked(_) => None,
        }
    }

    pub fn networked(&self) -> Option<&Arc<NetworkedRuntime>> {
        match &self.backend {
            Backend::Networked(runtime) => Some(runtime),
            Backend::Local { .. } => None,
        }
    }

    /// Dispose the runtime and stop its background work.
    pub fn shutdown(&self) {
        self.client().dispose();
        if let Backend::Local { tick_driver, .. } = &self.backend {
            tick_driver.abort();
        }
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
