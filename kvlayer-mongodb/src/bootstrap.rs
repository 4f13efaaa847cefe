//! Startup sequence of the MongoDB backend.
//!
//! [`initialize`] runs, in order: connect, select the session store, compose the
//! structure modules, authenticate (or warn when no credentials are configured),
//! start index provisioning. It returns as soon as the index declarations are
//! issued, without waiting for them.

use std::sync::Arc;

use mongodb::Client;
use tracing::info;

use kvlayer_core::{
    config::Settings,
    database::Database,
    error::KvStoreResult,
    index::{IndexProvisioner, IndexProvisioning},
    session::{CacheConnector, SelectedSessionStore, select_session_store},
};

use crate::{
    connection::MongoConnection,
    hash::MongoHash,
    keys::MongoKeys,
    list::MongoLists,
    session::MongoSessionStore,
    sets::MongoSets,
    sorted::MongoSortedSets,
};

/// The five MongoDB modules composed into one store.
pub type MongoDatabase = Database<MongoKeys, MongoHash, MongoSets, MongoSortedSets, MongoLists>;

/// Composes the five modules over one connection.
pub fn compose(conn: &Arc<MongoConnection>) -> MongoDatabase {
    Database::new(
        MongoKeys::new(Arc::clone(conn)),
        MongoHash::new(Arc::clone(conn)),
        MongoSets::new(Arc::clone(conn)),
        MongoSortedSets::new(Arc::clone(conn)),
        MongoLists::new(Arc::clone(conn)),
    )
}

/// A connected, authenticated store.
#[derive(Debug)]
pub struct Connected {
    conn: Arc<MongoConnection>,
    session_store: SelectedSessionStore<MongoSessionStore>,
    store: MongoDatabase,
    indices: Option<IndexProvisioning>,
}

impl Connected {
    /// The pooled driver client.
    pub fn client(&self) -> &Client {
        self.conn.client()
    }

    pub fn connection(&self) -> &Arc<MongoConnection> {
        &self.conn
    }

    pub fn session_store(&self) -> &SelectedSessionStore<MongoSessionStore> {
        &self.session_store
    }

    pub fn store(&self) -> &MongoDatabase {
        &self.store
    }

    /// Takes the provisioning handle so the caller can wait for the indices;
    /// `None` once taken.
    pub fn indices(&mut self) -> Option<IndexProvisioning> {
        self.indices.take()
    }

    /// Shuts the connection pool down.
    pub async fn close(self) {
        self.conn.close().await;
    }
}

/// Connects to MongoDB and prepares every collaborator.
///
/// Connection and authentication failures are returned and nothing is exposed.
/// An [`Authentication`](kvlayer_core::error::KvStoreError::Authentication) error
/// is fatal: the caller must abort startup.
pub async fn initialize(
    settings: &Settings,
    connector: Option<&dyn CacheConnector>,
) -> KvStoreResult<Connected> {
    let conn = MongoConnection::connect(&settings.mongo).await?;
    let session_store = select_session_store(
        settings,
        || MongoSessionStore::new(Arc::clone(&conn)),
        connector,
    )
    .await?;
    let store = compose(&conn);

    conn.authenticate().await?;
    let indices = IndexProvisioner::start(Arc::clone(&conn))?;

    info!(
        database = %settings.mongo.database,
        indices = indices.issued(),
        "mongo store initialized"
    );

    Ok(Connected {
        conn,
        session_store,
        store,
        indices: Some(indices),
    })
}
