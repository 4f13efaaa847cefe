use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use bson::{Document, doc};
use futures::{StreamExt, TryStreamExt, stream::iter};

use kvlayer_core::{
    error::KvStoreResult,
    ops::{Membership, SetOps},
    schema::{StructureKind, fields},
};

use crate::{connection::MongoConnection, error::operation_error, filters};

/// Samples drawn by `set_remove_random` before it gives up on a contended set.
const REMOVE_RANDOM_ATTEMPTS: usize = 5;

/// Set operations over MongoDB: one row per member.
#[derive(Debug, Clone)]
pub struct MongoSets {
    conn: Arc<MongoConnection>,
}

impl MongoSets {
    pub fn new(conn: Arc<MongoConnection>) -> Self {
        Self { conn }
    }

    async fn values(&self, filter: Document) -> KvStoreResult<Vec<String>> {
        Ok(
            self.conn
                .objects()
                .find(filter)
                .projection(doc! { fields::VALUE: 1 })
                .sort(filters::insertion_order())
                .await
                .map_err(operation_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(operation_error)?
                .into_iter()
                .filter_map(|row| row.get_str(fields::VALUE).ok().map(str::to_string))
                .collect()
        )
    }
}

#[async_trait]
impl SetOps for MongoSets {
    async fn set_add(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        iter(members)
            .then(async |member| {
                self.conn
                    .objects()
                    .update_one(
                        filters::member(key, StructureKind::Set, member),
                        doc! { "$set": { fields::VALUE: *member } },
                    )
                    .upsert(true)
                    .await
                    .map_err(operation_error)
            })
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.conn
            .objects()
            .delete_many(filters::members(key, StructureKind::Set, members))
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn is_set_member(&self, key: &str, member: &str) -> KvStoreResult<Membership> {
        let row = self
            .conn
            .objects()
            .find_one(filters::member(key, StructureKind::Set, member))
            .projection(doc! { "_id": 1 })
            .await
            .map_err(operation_error)?;

        if row.is_some() {
            return Ok(Membership::Member);
        }

        let key_exists = self
            .conn
            .objects()
            .find_one(filters::key_kind(key, StructureKind::Set))
            .projection(doc! { "_id": 1 })
            .await
            .map_err(operation_error)?
            .is_some();

        Ok(Membership::absent(key_exists))
    }

    async fn is_set_members(&self, key: &str, members: &[&str]) -> KvStoreResult<Vec<bool>> {
        let present = self
            .values(filters::members(key, StructureKind::Set, members))
            .await?
            .into_iter()
            .collect::<HashSet<_>>();

        Ok(
            members
                .iter()
                .map(|member| present.contains(*member))
                .collect()
        )
    }

    async fn get_set_members(&self, key: &str) -> KvStoreResult<Vec<String>> {
        self.values(filters::key_kind(key, StructureKind::Set)).await
    }

    async fn set_count(&self, key: &str) -> KvStoreResult<u64> {
        self.conn
            .objects()
            .count_documents(filters::key_kind(key, StructureKind::Set))
            .await
            .map_err(operation_error)
    }

    async fn set_remove_random(&self, key: &str) -> KvStoreResult<Option<String>> {
        for _ in 0..REMOVE_RANDOM_ATTEMPTS {
            let sampled = self
                .conn
                .objects()
                .aggregate(filters::sample(filters::key_kind(key, StructureKind::Set)))
                .await
                .map_err(operation_error)?
                .try_next()
                .await
                .map_err(operation_error)?;

            let Some(id) = sampled.and_then(|mut row| row.remove("_id")) else {
                return Ok(None);
            };

            // Another caller may have removed the sampled row first.
            let removed = self
                .conn
                .objects()
                .find_one_and_delete(doc! { "_id": id })
                .await
                .map_err(operation_error)?;

            if let Some(member) = removed.as_ref().and_then(|row| row.get_str(fields::VALUE).ok()) {
                return Ok(Some(member.to_string()));
            }
        }

        Ok(None)
    }
}
