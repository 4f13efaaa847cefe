//! Startup sequence of the in-memory backend.

use std::sync::Arc;

use tracing::info;

use kvlayer_core::{
    config::Settings,
    error::KvStoreResult,
    index::{IndexProvisioner, IndexProvisioning},
    session::{CacheConnector, SelectedSessionStore, select_session_store},
};

use crate::{
    session::InMemorySessionStore,
    store::{InMemoryStore, MemoryDatabase},
};

/// A ready in-memory store.
#[derive(Debug)]
pub struct MemoryConnected {
    store: Arc<InMemoryStore>,
    session_store: SelectedSessionStore<InMemorySessionStore>,
    indices: Option<IndexProvisioning>,
}

impl MemoryConnected {
    pub fn handle(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn store(&self) -> &MemoryDatabase {
        self.store.database()
    }

    pub fn session_store(&self) -> &SelectedSessionStore<InMemorySessionStore> {
        &self.session_store
    }

    /// Takes the provisioning handle; `None` once taken.
    pub fn indices(&mut self) -> Option<IndexProvisioning> {
        self.indices.take()
    }
}

/// Creates a store, selects its session store and starts index provisioning.
pub async fn initialize(
    settings: &Settings,
    connector: Option<&dyn CacheConnector>,
) -> KvStoreResult<MemoryConnected> {
    let store = Arc::new(InMemoryStore::new());
    let session_store = select_session_store(settings, || store.session_store(), connector).await?;
    let indices = IndexProvisioner::start(Arc::clone(&store))?;

    info!(indices = indices.issued(), "in-memory store ready");

    Ok(MemoryConnected {
        store,
        session_store,
        indices: Some(indices),
    })
}

#[cfg(test)]
mod tests {
    use kvlayer_core::config::RedisSettings;

    use super::*;
    use crate::session::InMemoryCacheConnector;

    #[tokio::test]
    async fn document_sessions_without_redis() {
        let mut connected = initialize(&Settings::default(), None).await.unwrap();

        assert!(connected.session_store().is_document());
        assert!(connected.indices().unwrap().wait().await.is_complete());
        assert!(connected.indices().is_none());
    }

    #[tokio::test]
    async fn cache_sessions_with_redis() {
        let settings = Settings {
            redis: Some(RedisSettings::default()),
            ..Settings::default()
        };
        let connector = InMemoryCacheConnector::new();

        let connected = initialize(&settings, Some(&connector)).await.unwrap();
        assert!(connected.session_store().is_cache());

        assert!(initialize(&settings, None).await.is_err());
    }
}
