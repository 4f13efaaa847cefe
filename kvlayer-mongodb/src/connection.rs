//! The shared connection handle.
//!
//! One [`MongoConnection`] exists per process. It owns the pooled driver client and
//! is shared through an `Arc` by every structure module and the session store.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection, Database,
    options::{ClientOptions, ReturnDocument},
};
use tracing::{info, warn};

use kvlayer_core::{
    config::MongoSettings,
    error::{KvStoreError, KvStoreResult},
    index::{IndexSpec, IndexTarget, ProvisioningLatch},
    schema::{OBJECTS, ObjectRow, SEARCH, fields},
};

use crate::{
    error::{increment_error, operation_error, startup_error},
    filters::{self, index_model},
};

/// A pooled, verified connection to one database.
#[derive(Debug)]
pub struct MongoConnection {
    client: Client,
    database: Database,
    settings: MongoSettings,
    latch: ProvisioningLatch,
}

impl MongoConnection {
    /// Opens the pool described by `settings` and verifies the server is reachable.
    pub async fn connect(settings: &MongoSettings) -> KvStoreResult<Arc<Self>> {
        let mut options = ClientOptions::parse(settings.connection_string())
            .await
            .map_err(|e| KvStoreError::Configuration(e.to_string()))?;
        options.max_pool_size = Some(settings.pool_size);

        let client = Client::with_options(options)
            .map_err(|e| KvStoreError::Configuration(e.to_string()))?;
        let database = client.database(&settings.database);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(startup_error)?;

        info!(
            uri = %settings.connection_string_redacted(),
            pool_size = settings.pool_size,
            "connected to mongo"
        );

        Ok(Arc::new(Self {
            client,
            database,
            settings: settings.clone(),
            latch: ProvisioningLatch::new(),
        }))
    }

    /// Confirms the configured credentials were accepted.
    ///
    /// Without credentials this only warns, since the server may allow
    /// unauthenticated access.
    pub async fn authenticate(&self) -> KvStoreResult<()> {
        let Some((username, _)) = self.settings.credentials() else {
            warn!("You have no mongo password setup!");
            return Ok(());
        };

        let status = self
            .database
            .run_command(doc! { "connectionStatus": 1 })
            .await
            .map_err(startup_error)?;

        if authenticated_users(&status) == 0 {
            return Err(KvStoreError::Authentication(format!(
                "no authenticated user on connection for {}",
                username
            )));
        }

        info!(username, "authenticated with mongo");
        Ok(())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn settings(&self) -> &MongoSettings {
        &self.settings
    }

    /// The `objects` collection as raw documents.
    pub fn objects(&self) -> Collection<Document> {
        self.database.collection(OBJECTS)
    }

    /// The `objects` collection as typed rows.
    pub fn rows(&self) -> Collection<ObjectRow> {
        self.database.collection(OBJECTS)
    }

    pub fn search(&self) -> Collection<Document> {
        self.database.collection(SEARCH)
    }

    /// Adds `by` to the integer `data` of the row matched by `row` and returns the
    /// new value, creating the row when it does not exist.
    ///
    /// A row holding anything but a whole number is left unchanged and reported as
    /// [`KvStoreError::InvalidValue`].
    pub(crate) async fn increment_data(&self, key: &str, row: Document, by: i64) -> KvStoreResult<i64> {
        let objects = self.objects();
        let update = doc! { "$inc": { fields::DATA: by } };

        let updated = objects
            .find_one_and_update(filters::holding_integer(row.clone()), update.clone())
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| increment_error(key, e))?;
        if let Some(updated) = updated {
            return integer_of(key, updated.get(fields::DATA));
        }

        let existing = objects
            .find_one(row.clone())
            .projection(doc! { fields::DATA: 1 })
            .await
            .map_err(operation_error)?;
        if let Some(existing) = existing {
            return Err(not_an_integer(key, existing.get(fields::DATA)));
        }

        let created = objects
            .find_one_and_update(row, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| increment_error(key, e))?
            .ok_or_else(|| KvStoreError::Operation(format!("upsert of {} returned no row", key)))?;

        integer_of(key, created.get(fields::DATA))
    }

    /// Shuts the pool down. Operations still holding a clone of the handle fail
    /// afterwards.
    pub async fn close(self: Arc<Self>) {
        self.client.clone().shutdown().await;
        info!("mongo connection closed");
    }
}

fn authenticated_users(status: &Document) -> usize {
    status
        .get_document("authInfo")
        .ok()
        .and_then(|info| info.get_array("authenticatedUsers").ok())
        .map_or(0, Vec::len)
}

#[async_trait]
impl IndexTarget for MongoConnection {
    async fn declare_index(&self, spec: &IndexSpec) -> KvStoreResult<()> {
        self.database
            .collection::<Document>(spec.collection)
            .create_index(index_model(spec))
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    fn provisioning_latch(&self) -> &ProvisioningLatch {
        &self.latch
    }
}

/// Reads a stored number as an integer, accepting whole doubles.
pub(crate) fn integer_of(key: &str, value: Option<&Bson>) -> KvStoreResult<i64> {
    match value {
        Some(Bson::Int32(n)) => Ok(i64::from(*n)),
        Some(Bson::Int64(n)) => Ok(*n),
        Some(Bson::Double(n)) if n.fract() == 0.0 => Ok(*n as i64),
        other => Err(not_an_integer(key, other)),
    }
}

fn not_an_integer(key: &str, value: Option<&Bson>) -> KvStoreError {
    KvStoreError::InvalidValue(key.to_string(), format!("expected an integer, found {:?}", value))
}
