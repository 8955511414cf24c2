use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use super::{
    config::{Config, StoreBackend},
    database::RedisStore,
    ledger::Ledger,
    models::CatalogSeed,
    store::{MemoryStore, Store},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub ledger: Ledger,
}

impl State {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn Store> = match config.store_backend {
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
            StoreBackend::Memory => Arc::new(memory_store(&config)?),
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Arc<Self> {
        info!("Voting scheme: {:?}", config.scheme);

        if let Some(deadline) = config.deadline {
            info!("Voting closes at {deadline}");
        }

        let ledger = Ledger::new(store.clone(), config.scheme, config.deadline);

        Arc::new(Self {
            config,
            store,
            ledger,
        })
    }
}

fn memory_store(config: &Config) -> anyhow::Result<MemoryStore> {
    warn!("Using in-memory store, votes are lost on restart");

    let Some(path) = &config.catalog_path else {
        warn!("CATALOG_PATH not set, serving an empty catalog");
        return Ok(MemoryStore::default());
    };

    let catalog = CatalogSeed::read(path)
        .with_context(|| format!("loading catalog from {}", path.display()))?;

    info!(
        "Loaded {} nominations and {} candidates from {}",
        catalog.nominations.len(),
        catalog.candidate_count(),
        path.display()
    );

    Ok(MemoryStore::from_seed(&catalog))
}
