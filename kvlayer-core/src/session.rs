//! HTTP session storage and the one-time choice between its two adapters.
//!
//! Both adapters satisfy [`SessionStore`]. Which one is used is decided once, from
//! the settings, by [`select_session_store`]:
//!
//! - no `redis` settings: the backend's document-store adapter, sharing the store's
//!   connection;
//! - `redis` settings present: [`CacheSessionStore`], over a separately established
//!   cache connection, with a fixed time-to-live of 14 days.
//!
//! The cache driver itself is supplied by the application through [`CacheConnector`].

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::{
    config::{RedisSettings, Settings},
    error::{KvStoreError, KvStoreResult},
};

/// Time-to-live of cache-backed sessions: 14 days.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 14);

/// Key prefix of cache-backed sessions.
pub const SESSION_KEY_PREFIX: &str = "sess:";

/// Key prefix recording the lifetime, in milliseconds, of cache-backed sessions
/// stored with a non-default ttl.
pub const SESSION_LIFETIME_PREFIX: &str = "sess-ttl:";

/// Opaque session storage keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Returns the session, or `None` if it does not exist or has expired.
    async fn get(&self, id: &str) -> KvStoreResult<Option<Value>>;

    /// Stores the session for `ttl`, or for the store's default lifetime.
    async fn set(&self, id: &str, session: &Value, ttl: Option<Duration>) -> KvStoreResult<()>;

    async fn destroy(&self, id: &str) -> KvStoreResult<()>;

    /// Restarts the session's lifetime without changing its content. The lifetime
    /// is the ttl the session was last stored with.
    async fn touch(&self, id: &str) -> KvStoreResult<()>;
}

/// Minimal string cache capability needed by [`CacheSessionStore`].
#[async_trait]
pub trait CacheClient: Send + Sync + Debug {
    async fn get(&self, key: &str) -> KvStoreResult<Option<String>>;

    /// Stores `value` expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvStoreResult<()>;

    async fn del(&self, key: &str) -> KvStoreResult<()>;

    /// Resets the expiry of an existing key; returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> KvStoreResult<bool>;
}

/// Establishes the external cache connection.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    async fn connect(&self, settings: &RedisSettings) -> KvStoreResult<Arc<dyn CacheClient>>;
}

/// Session store backed by the external cache.
#[derive(Debug, Clone)]
pub struct CacheSessionStore {
    client: Arc<dyn CacheClient>,
    prefix: String,
    ttl: Duration,
}

impl CacheSessionStore {
    pub fn new(client: Arc<dyn CacheClient>) -> Self {
        Self {
            client,
            prefix: SESSION_KEY_PREFIX.to_string(),
            ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn cache_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn lifetime_key(&self, id: &str) -> String {
        format!("{}{}", SESSION_LIFETIME_PREFIX, id)
    }

    /// The lifetime recorded for `id`, if it was stored with a non-default ttl.
    async fn lifetime(&self, id: &str) -> KvStoreResult<Option<Duration>> {
        Ok(
            self.client
                .get(&self.lifetime_key(id))
                .await?
                .and_then(|millis| millis.parse::<u64>().ok())
                .map(Duration::from_millis)
        )
    }
}

#[async_trait]
impl SessionStore for CacheSessionStore {
    async fn get(&self, id: &str) -> KvStoreResult<Option<Value>> {
        match self.client.get(&self.cache_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, id: &str, session: &Value, ttl: Option<Duration>) -> KvStoreResult<()> {
        let ttl = ttl.unwrap_or(self.ttl);

        self.client
            .set_ex(&self.cache_key(id), &serde_json::to_string(session)?, ttl)
            .await?;

        if ttl == self.ttl {
            self.client.del(&self.lifetime_key(id)).await
        } else {
            self.client
                .set_ex(&self.lifetime_key(id), &ttl.as_millis().to_string(), ttl)
                .await
        }
    }

    async fn destroy(&self, id: &str) -> KvStoreResult<()> {
        self.client.del(&self.cache_key(id)).await?;
        self.client.del(&self.lifetime_key(id)).await
    }

    async fn touch(&self, id: &str) -> KvStoreResult<()> {
        match self.lifetime(id).await? {
            Some(ttl) => {
                if self.client.expire(&self.cache_key(id), ttl).await? {
                    self.client.expire(&self.lifetime_key(id), ttl).await?;
                }
            }
            None => {
                self.client.expire(&self.cache_key(id), self.ttl).await?;
            }
        }

        Ok(())
    }
}

/// The session store chosen at startup.
#[derive(Debug, Clone)]
pub enum SelectedSessionStore<D> {
    /// Backed by the document store, sharing its connection.
    Document(D),
    /// Backed by the external cache.
    Cache(CacheSessionStore),
}

impl<D> SelectedSessionStore<D> {
    pub fn is_document(&self) -> bool {
        matches!(self, SelectedSessionStore::Document(_))
    }

    pub fn is_cache(&self) -> bool {
        matches!(self, SelectedSessionStore::Cache(_))
    }
}

#[async_trait]
impl<D: SessionStore> SessionStore for SelectedSessionStore<D> {
    async fn get(&self, id: &str) -> KvStoreResult<Option<Value>> {
        match self {
            SelectedSessionStore::Document(store) => store.get(id).await,
            SelectedSessionStore::Cache(store) => store.get(id).await,
        }
    }

    async fn set(&self, id: &str, session: &Value, ttl: Option<Duration>) -> KvStoreResult<()> {
        match self {
            SelectedSessionStore::Document(store) => store.set(id, session, ttl).await,
            SelectedSessionStore::Cache(store) => store.set(id, session, ttl).await,
        }
    }

    async fn destroy(&self, id: &str) -> KvStoreResult<()> {
        match self {
            SelectedSessionStore::Document(store) => store.destroy(id).await,
            SelectedSessionStore::Cache(store) => store.destroy(id).await,
        }
    }

    async fn touch(&self, id: &str) -> KvStoreResult<()> {
        match self {
            SelectedSessionStore::Document(store) => store.touch(id).await,
            SelectedSessionStore::Cache(store) => store.touch(id).await,
        }
    }
}

/// Chooses the session store once from the settings.
///
/// `document_store` is only invoked when the document-store adapter is selected;
/// `connector` is only used when the cache adapter is selected.
pub async fn select_session_store<D, F>(
    settings: &Settings,
    document_store: F,
    connector: Option<&dyn CacheConnector>,
) -> KvStoreResult<SelectedSessionStore<D>>
where
    D: SessionStore,
    F: FnOnce() -> D,
{
    match &settings.redis {
        None => {
            info!("using document-store session store");
            Ok(SelectedSessionStore::Document(document_store()))
        }
        Some(redis) => {
            let connector = connector.ok_or_else(|| {
                KvStoreError::Configuration(
                    "redis settings present but no cache connector was supplied".to_string(),
                )
            })?;
            info!(host = %redis.host, port = redis.port, "using cache session store");

            Ok(SelectedSessionStore::Cache(CacheSessionStore::new(
                connector.connect(redis).await?,
            )))
        }
    }
}
