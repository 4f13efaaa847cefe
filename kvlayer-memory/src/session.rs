//! In-process session adapters.
//!
//! [`InMemorySessionStore`] is the document-store session adapter of this backend.
//! [`InMemoryCache`] is a string cache with per-key expiry that can stand in for the
//! external cache behind [`CacheSessionStore`](kvlayer_core::session::CacheSessionStore).

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mea::rwlock::RwLock;
use serde_json::Value;

use kvlayer_core::{
    config::RedisSettings,
    error::{KvStoreError, KvStoreResult},
    session::{CacheClient, CacheConnector, DEFAULT_SESSION_TTL, SessionStore},
};

fn expiry_after(ttl: Duration) -> KvStoreResult<DateTime<Utc>> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| KvStoreError::InvalidValue("session".to_string(), format!("ttl of {:?} is out of range", ttl)))
}

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires: DateTime<Utc>,
    /// The ttl `expires` was last computed from.
    lifetime: Duration,
}

impl<T> Expiring<T> {
    fn new(value: T, lifetime: Duration) -> KvStoreResult<Self> {
        Ok(Self { value, expires: expiry_after(lifetime)?, lifetime })
    }

    fn is_live(&self) -> bool {
        self.expires > Utc::now()
    }

    /// Restarts the entry's lifetime.
    fn renew(&mut self, lifetime: Duration) -> KvStoreResult<()> {
        self.expires = expiry_after(lifetime)?;
        self.lifetime = lifetime;
        Ok(())
    }
}

/// Sessions kept in process memory, expiring lazily on read.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Expiring<Value>>>>,
    ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: DEFAULT_SESSION_TTL,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> KvStoreResult<Option<Value>> {
        Ok(
            self.sessions
                .read()
                .await
                .get(id)
                .filter(|session| session.is_live())
                .map(|session| session.value.clone())
        )
    }

    async fn set(&self, id: &str, session: &Value, ttl: Option<Duration>) -> KvStoreResult<()> {
        let session = Expiring::new(session.clone(), ttl.unwrap_or(self.ttl))?;

        self.sessions.write().await.insert(id.to_string(), session);

        Ok(())
    }

    async fn destroy(&self, id: &str) -> KvStoreResult<()> {
        self.sessions.write().await.remove(id);

        Ok(())
    }

    async fn touch(&self, id: &str) -> KvStoreResult<()> {
        match self
            .sessions
            .write()
            .await
            .get_mut(id)
            .filter(|session| session.is_live())
        {
            Some(session) => session.renew(session.lifetime),
            None => Ok(()),
        }
    }
}

/// A string cache with per-key expiry.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Expiring<String>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> KvStoreResult<Option<String>> {
        Ok(
            self.entries
                .read()
                .await
                .get(key)
                .filter(|entry| entry.is_live())
                .map(|entry| entry.value.clone())
        )
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvStoreResult<()> {
        let entry = Expiring::new(value.to_string(), ttl)?;

        self.entries.write().await.insert(key.to_string(), entry);

        Ok(())
    }

    async fn del(&self, key: &str) -> KvStoreResult<()> {
        self.entries.write().await.remove(key);

        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvStoreResult<bool> {
        match self
            .entries
            .write()
            .await
            .get_mut(key)
            .filter(|entry| entry.is_live())
        {
            Some(entry) => {
                entry.renew(ttl)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Hands out one shared [`InMemoryCache`] whatever the settings.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheConnector {
    cache: Arc<InMemoryCache>,
}

impl InMemoryCacheConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> Arc<InMemoryCache> {
        Arc::clone(&self.cache)
    }
}

#[async_trait]
impl CacheConnector for InMemoryCacheConnector {
    async fn connect(&self, _settings: &RedisSettings) -> KvStoreResult<Arc<dyn CacheClient>> {
        let client: Arc<dyn CacheClient> = self.cache.clone();
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use kvlayer_core::session::CacheSessionStore;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn sessions_expire_lazily() {
        let store = InMemorySessionStore::new();
        store.set("abc", &json!({ "uid": 1 }), None).await.unwrap();
        store.set("old", &json!({ "uid": 2 }), Some(Duration::ZERO)).await.unwrap();

        assert_eq!(store.get("abc").await.unwrap(), Some(json!({ "uid": 1 })));
        assert_eq!(store.get("old").await.unwrap(), None);

        store.destroy("abc").await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn touch_keeps_the_stored_lifetime() {
        let store = InMemorySessionStore::new();
        store.set("short", &json!({ "uid": 1 }), Some(Duration::from_secs(60))).await.unwrap();
        store.set("long", &json!({ "uid": 2 }), None).await.unwrap();

        store.touch("short").await.unwrap();
        store.touch("long").await.unwrap();

        let sessions = store.sessions.read().await;
        let short = sessions["short"].expires - Utc::now();
        let long = sessions["long"].expires - Utc::now();
        assert!(short <= TimeDelta::seconds(60));
        assert!(short > TimeDelta::seconds(50));
        assert!(long > TimeDelta::days(13));
    }

    #[tokio::test]
    async fn cache_sessions_touch_with_their_own_ttl() {
        let cache = Arc::new(InMemoryCache::new());
        let store = CacheSessionStore::new(cache.clone());
        store.set("short", &json!({ "uid": 1 }), Some(Duration::from_secs(60))).await.unwrap();
        store.set("long", &json!({ "uid": 2 }), None).await.unwrap();

        store.touch("short").await.unwrap();
        store.touch("long").await.unwrap();

        let entries = cache.entries.read().await;
        assert_eq!(entries["sess:short"].lifetime, Duration::from_secs(60));
        assert_eq!(entries["sess:long"].lifetime, DEFAULT_SESSION_TTL);
        assert!(!entries.contains_key("sess-ttl:long"));
        drop(entries);

        // Storing again with the default ttl forgets the custom lifetime.
        store.set("short", &json!({ "uid": 1 }), None).await.unwrap();
        store.touch("short").await.unwrap();
        assert_eq!(cache.entries.read().await["sess:short"].lifetime, DEFAULT_SESSION_TTL);

        store.destroy("short").await.unwrap();
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_expire_reports_missing_keys() {
        let cache = InMemoryCache::new();
        cache.set_ex("sess:abc", "{}", Duration::from_secs(60)).await.unwrap();

        assert!(cache.expire("sess:abc", Duration::from_secs(120)).await.unwrap());
        assert!(!cache.expire("sess:none", Duration::from_secs(120)).await.unwrap());

        cache.del("sess:abc").await.unwrap();
        assert_eq!(cache.get("sess:abc").await.unwrap(), None);
    }
}
