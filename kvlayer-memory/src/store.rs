//! In-memory structured store.
//!
//! This module composes the five in-memory structure modules over one shared
//! [`ObjectTable`] and implements [`IndexTarget`] so the store can be provisioned
//! exactly like the document-store backend.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::DateTime;
use tokio::task::JoinHandle;
use tracing::debug;

use kvlayer_core::{
    database::Database,
    error::KvStoreResult,
    index::{IndexSpec, IndexTarget, ProvisioningLatch},
};

use crate::{
    hash::MemoryHash,
    keys::MemoryKeys,
    list::MemoryLists,
    session::InMemorySessionStore,
    sets::MemorySets,
    sorted::MemorySortedSets,
    table::{ObjectTable, SharedTable},
};

/// The five in-memory modules composed into one store.
pub type MemoryDatabase = Database<MemoryKeys, MemoryHash, MemorySets, MemorySortedSets, MemoryLists>;

/// Thread-safe in-memory structured store.
///
/// `InMemoryStore` is cheap to clone: clones share the same table, so every
/// module handed out by [`InMemoryStore::database`] sees the same rows.
///
/// # Example
///
/// ```ignore
/// use kvlayer_memory::InMemoryStore;
/// use kvlayer_core::ops::SortedSetOps;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::builder().build().await?;
///     let db = store.database();
///
///     db.sorted_set_add("users:joindate", 1_700_000_000.0, "1").await?;
///     assert_eq!(db.sorted_set_card("users:joindate").await?, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    table: SharedTable,
    database: MemoryDatabase,
    sessions: InMemorySessionStore,
    latch: Arc<ProvisioningLatch>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let table = ObjectTable::shared();
        let database = Database::new(
            MemoryKeys::new(Arc::clone(&table)),
            MemoryHash::new(Arc::clone(&table)),
            MemorySets::new(Arc::clone(&table)),
            MemorySortedSets::new(Arc::clone(&table)),
            MemoryLists::new(Arc::clone(&table)),
        );

        Self {
            table,
            database,
            sessions: InMemorySessionStore::new(),
            latch: Arc::new(ProvisioningLatch::new()),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// The composed structure modules.
    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }

    /// The document-store session adapter of this store. Every handle shares the
    /// same sessions.
    pub fn session_store(&self) -> InMemorySessionStore {
        self.sessions.clone()
    }

    /// Indices declared so far, in declaration order.
    pub async fn indices(&self) -> Vec<IndexSpec> {
        self.table.read().await.indices().to_vec()
    }

    /// Purges every expired row and returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.table.write().await.sweep_expired(DateTime::now())
    }

    /// Spawns a task purging expired rows every `period`, the way the document
    /// store's TTL monitor does. Abort the returned handle to stop it.
    pub fn spawn_ttl_monitor(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let removed = store.sweep_expired().await;
                if removed > 0 {
                    debug!(removed, "expired rows purged");
                }
            }
        })
    }
}

#[async_trait]
impl IndexTarget for InMemoryStore {
    async fn declare_index(&self, spec: &IndexSpec) -> KvStoreResult<()> {
        self.table.write().await.declare_index(spec)
    }

    fn provisioning_latch(&self) -> &ProvisioningLatch {
        &self.latch
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use kvlayer_memory::InMemoryStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder()
///         .ttl_monitor(Duration::from_secs(60))
///         .build()
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    ttl_monitor: Option<Duration>,
}

impl InMemoryStoreBuilder {
    /// Purges expired rows in the background every `period`.
    pub fn ttl_monitor(mut self, period: Duration) -> Self {
        self.ttl_monitor = Some(period);
        self
    }

    /// Builds the store, starting the TTL monitor if one was requested.
    pub async fn build(self) -> KvStoreResult<InMemoryStore> {
        let store = InMemoryStore::new();

        if let Some(period) = self.ttl_monitor {
            store.spawn_ttl_monitor(period);
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use bson::Bson;
    use kvlayer_core::{
        index::IndexProvisioner,
        ops::{KeyValueOps, SetOps},
        session::SessionStore,
    };

    use super::*;

    #[tokio::test]
    async fn modules_share_one_table() {
        let store = InMemoryStore::new();
        let db = store.database();

        db.set_add("tags", &["rust"]).await.unwrap();
        db.set("config", Bson::from(1)).await.unwrap();

        assert!(db.exists("tags").await.unwrap());
        db.flush().await.unwrap();
        assert!(!store.clone().database().exists("tags").await.unwrap());
    }

    #[tokio::test]
    async fn session_adapters_share_the_store_sessions() {
        let store = InMemoryStore::new();
        store.session_store().set("abc", &serde_json::json!({ "uid": 1 }), None).await.unwrap();

        assert_eq!(
            store.clone().session_store().get("abc").await.unwrap(),
            Some(serde_json::json!({ "uid": 1 }))
        );
        assert_eq!(InMemoryStore::new().session_store().get("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn provisioning_declares_five_indices_once() {
        let store = Arc::new(InMemoryStore::new());

        let report = IndexProvisioner::start(Arc::clone(&store)).unwrap().wait().await;

        assert_eq!(report.declared, 5);
        assert!(report.is_complete());
        assert_eq!(store.indices().await.len(), 5);
        assert!(IndexProvisioner::start(store).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_monitor_purges_expired_rows() {
        let store = InMemoryStore::builder()
            .ttl_monitor(Duration::from_secs(60))
            .build()
            .await
            .unwrap();
        let db = store.database();
        db.set("flash", Bson::from("saved")).await.unwrap();
        db.expire_at("flash", chrono::Utc::now() - chrono::TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(store.table.read().await.row_count(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(store.table.read().await.row_count(), 0);
    }
}
