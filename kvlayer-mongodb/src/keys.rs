use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, DateTime, Document, doc};
use chrono::Utc;
use futures::TryStreamExt;

use kvlayer_core::{
    error::KvStoreResult,
    ops::{KeyValueOps, Lookup, key_ttl},
    schema::{StructureKind, fields, search_fields},
};

use crate::{
    connection::MongoConnection,
    error::operation_error,
    filters,
    list::SEQUENCES,
};

/// Key-level operations, plain values and full-text search over MongoDB.
#[derive(Debug, Clone)]
pub struct MongoKeys {
    conn: Arc<MongoConnection>,
}

impl MongoKeys {
    pub fn new(conn: Arc<MongoConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KeyValueOps for MongoKeys {
    async fn exists(&self, key: &str) -> KvStoreResult<bool> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::key(key))
                .projection(doc! { "_id": 1 })
                .await
                .map_err(operation_error)?
                .is_some()
        )
    }

    async fn key_type(&self, key: &str) -> KvStoreResult<Option<StructureKind>> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::key(key))
                .projection(doc! { fields::KIND: 1 })
                .await
                .map_err(operation_error)?
                .and_then(|row| row.get_str(fields::KIND).ok().and_then(StructureKind::from_tag))
        )
    }

    async fn delete(&self, key: &str) -> KvStoreResult<()> {
        self.conn
            .objects()
            .delete_many(filters::key(key))
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn delete_all(&self, keys: &[&str]) -> KvStoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        self.conn
            .objects()
            .delete_many(doc! { fields::KEY: { "$in": keys } })
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn get(&self, key: &str) -> KvStoreResult<Option<Bson>> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::key_kind(key, StructureKind::String))
                .await
                .map_err(operation_error)?
                .and_then(|row| row.get(fields::DATA).cloned())
        )
    }

    async fn set(&self, key: &str, value: Bson) -> KvStoreResult<()> {
        self.conn
            .objects()
            .update_one(
                filters::key_kind(key, StructureKind::String),
                doc! { "$set": { fields::DATA: value } },
            )
            .upsert(true)
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn increment(&self, key: &str) -> KvStoreResult<i64> {
        self.conn
            .increment_data(key, filters::key_kind(key, StructureKind::String), 1)
            .await
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> KvStoreResult<()> {
        // A missing source leaves the target untouched.
        if old_key == new_key || !self.exists(old_key).await? {
            return Ok(());
        }

        self.delete(new_key).await?;
        self.conn
            .objects()
            .update_many(filters::key(old_key), doc! { "$set": { fields::KEY: new_key } })
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn expire_at(&self, key: &str, at: chrono::DateTime<Utc>) -> KvStoreResult<()> {
        self.conn
            .objects()
            .update_many(
                filters::key(key),
                doc! { "$set": { fields::EXPIRE_AT: DateTime::from_chrono(at) } },
            )
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn persist(&self, key: &str) -> KvStoreResult<()> {
        self.conn
            .objects()
            .update_many(filters::key(key), doc! { "$unset": { fields::EXPIRE_AT: "" } })
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvStoreResult<Lookup<Option<i64>>> {
        let rows = self
            .conn
            .objects()
            .find(filters::key(key))
            .projection(doc! { fields::EXPIRE_AT: 1 })
            .await
            .map_err(operation_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(operation_error)?;

        Ok(key_ttl(
            rows.iter().map(|row| row.get_datetime(fields::EXPIRE_AT).ok().copied()),
            DateTime::now(),
        ))
    }

    async fn flush(&self) -> KvStoreResult<()> {
        self.conn
            .objects()
            .delete_many(doc! {})
            .await
            .map_err(operation_error)?;
        self.conn
            .search()
            .delete_many(doc! {})
            .await
            .map_err(operation_error)?;
        self.conn
            .database()
            .collection::<Document>(SEQUENCES)
            .delete_many(doc! {})
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn search_index(&self, namespace: &str, content: &str, id: &str) -> KvStoreResult<()> {
        self.conn
            .search()
            .update_one(
                filters::search_entry(namespace, id),
                doc! { "$set": { search_fields::CONTENT: content } },
            )
            .upsert(true)
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn search(&self, namespace: &str, term: &str, limit: usize) -> KvStoreResult<Vec<String>> {
        // A zero limit means "no limit" to the server.
        if limit == 0 {
            return Ok(Vec::new());
        }

        Ok(
            self.conn
                .search()
                .find(filters::search_text(namespace, term))
                .projection(doc! { search_fields::ID: 1 })
                .limit(i64::try_from(limit).unwrap_or(i64::MAX))
                .await
                .map_err(operation_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(operation_error)?
                .into_iter()
                .filter_map(|row| row.get_str(search_fields::ID).ok().map(str::to_string))
                .collect()
        )
    }

    async fn search_remove(&self, namespace: &str, id: &str) -> KvStoreResult<()> {
        self.conn
            .search()
            .delete_one(filters::search_entry(namespace, id))
            .await
            .map_err(operation_error)?;

        Ok(())
    }
}
