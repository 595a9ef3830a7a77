//! Application state shared across handlers.

use crate::config::Config;
use crate::engine::{ChainEngine, RelayEngine};
use crate::key_store::KeyStore;
use crate::lifecycle::BackgroundLoops;
use crate::readiness::ReadinessGate;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub engine: Arc<dyn RelayEngine>,
    pub readiness: Arc<ReadinessGate>,
    pub loops: BackgroundLoops,
}

impl AppState {
    /// Build state around an existing engine. Loops are not started.
    pub fn with_engine(config: Config, engine: Arc<dyn RelayEngine>) -> Self {
        let readiness = Arc::new(ReadinessGate::new());
        let loops = BackgroundLoops::new(Arc::clone(&engine), Arc::clone(&readiness), &config);

        Self {
            config,
            engine,
            readiness,
            loops,
        }
    }

    /// Load (or create) the relay key and connect a [`ChainEngine`].
    pub fn from_config(config: Config) -> Result<Self, crate::Error> {
        let store = KeyStore::from_config(&config)?;
        let signer = store.load_or_create()?;
        info!(address = %signer.address(), "Loaded relay key");

        let engine = ChainEngine::new(&config, signer)?;
        Ok(Self::with_engine(config, Arc::new(engine)))
    }
}
