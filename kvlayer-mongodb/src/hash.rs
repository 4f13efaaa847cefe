use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt, stream::iter};

use kvlayer_core::{
    error::KvStoreResult,
    ops::{HashOps, Lookup},
    schema::{StructureKind, fields},
};

use crate::{
    connection::MongoConnection,
    error::operation_error,
    filters,
};

/// Hash operations over MongoDB: one row per field, field name in `value`.
#[derive(Debug, Clone)]
pub struct MongoHash {
    conn: Arc<MongoConnection>,
}

impl MongoHash {
    pub fn new(conn: Arc<MongoConnection>) -> Self {
        Self { conn }
    }

    async fn fields(&self, key: &str) -> KvStoreResult<Vec<Document>> {
        self.conn
            .objects()
            .find(filters::key_kind(key, StructureKind::Hash))
            .sort(filters::insertion_order())
            .await
            .map_err(operation_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(operation_error)
    }

    async fn holds_hash(&self, key: &str) -> KvStoreResult<bool> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::key_kind(key, StructureKind::Hash))
                .projection(doc! { "_id": 1 })
                .await
                .map_err(operation_error)?
                .is_some()
        )
    }
}

fn field_of(row: &Document) -> (String, Bson) {
    (
        row.get_str(fields::VALUE).unwrap_or_default().to_string(),
        row.get(fields::DATA).cloned().unwrap_or(Bson::Null),
    )
}

#[async_trait]
impl HashOps for MongoHash {
    async fn set_object(&self, key: &str, object: Document) -> KvStoreResult<()> {
        iter(object)
            .then(async |(field, value)| self.set_object_field(key, &field, value).await)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    async fn set_object_field(&self, key: &str, field: &str, value: Bson) -> KvStoreResult<()> {
        self.conn
            .objects()
            .update_one(
                filters::member(key, StructureKind::Hash, field),
                doc! { "$set": { fields::DATA: value } },
            )
            .upsert(true)
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> KvStoreResult<Option<Document>> {
        let object = self
            .fields(key)
            .await?
            .iter()
            .map(field_of)
            .collect::<Document>();

        Ok((!object.is_empty()).then_some(object))
    }

    async fn get_object_field(&self, key: &str, field: &str) -> KvStoreResult<Lookup<Bson>> {
        let row = self
            .conn
            .objects()
            .find_one(filters::member(key, StructureKind::Hash, field))
            .await
            .map_err(operation_error)?;

        match row {
            Some(row) => Ok(Lookup::Found(row.get(fields::DATA).cloned().unwrap_or(Bson::Null))),
            None => Ok(Lookup::absent(self.holds_hash(key).await?)),
        }
    }

    async fn get_object_fields(&self, key: &str, fields: &[&str]) -> KvStoreResult<Option<Document>> {
        let found = self
            .conn
            .objects()
            .find(filters::members(key, StructureKind::Hash, fields))
            .await
            .map_err(operation_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(operation_error)?
            .iter()
            .map(field_of)
            .collect::<Document>();

        if found.is_empty() && !self.holds_hash(key).await? {
            return Ok(None);
        }

        Ok(Some(
            fields
                .iter()
                .map(|field| (field.to_string(), found.get(*field).cloned().unwrap_or(Bson::Null)))
                .collect(),
        ))
    }

    async fn get_object_keys(&self, key: &str) -> KvStoreResult<Vec<String>> {
        Ok(
            self.fields(key)
                .await?
                .iter()
                .map(|row| field_of(row).0)
                .collect()
        )
    }

    async fn get_object_values(&self, key: &str) -> KvStoreResult<Vec<Bson>> {
        Ok(
            self.fields(key)
                .await?
                .iter()
                .map(|row| field_of(row).1)
                .collect()
        )
    }

    async fn is_object_field(&self, key: &str, field: &str) -> KvStoreResult<bool> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::member(key, StructureKind::Hash, field))
                .projection(doc! { "_id": 1 })
                .await
                .map_err(operation_error)?
                .is_some()
        )
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> KvStoreResult<()> {
        self.conn
            .objects()
            .delete_one(filters::member(key, StructureKind::Hash, field))
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn increment_object_field_by(&self, key: &str, field: &str, by: i64) -> KvStoreResult<i64> {
        self.conn
            .increment_data(key, filters::member(key, StructureKind::Hash, field), by)
            .await
    }
}
