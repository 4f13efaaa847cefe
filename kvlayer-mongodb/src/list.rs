use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{Collection, options::ReturnDocument};

use kvlayer_core::{
    error::{KvStoreError, KvStoreResult},
    ops::ListOps,
    range::{direct_range, resolve_range},
    schema::{ObjectRow, StructureKind, fields},
};

use crate::{connection::MongoConnection, error::operation_error, filters};

/// Collection holding the head and tail counters of every list.
pub const SEQUENCES: &str = "sequences";

/// List operations over MongoDB: one row per element, ordered by `seq`.
///
/// Each push takes its `seq` from a per-key counter row in [`SEQUENCES`], so
/// concurrent pushes never share a `seq`: prepends always land before the current
/// head and appends after the current tail.
#[derive(Debug, Clone)]
pub struct MongoLists {
    conn: Arc<MongoConnection>,
}

impl MongoLists {
    pub fn new(conn: Arc<MongoConnection>) -> Self {
        Self { conn }
    }

    /// The `seq` at the head (or the tail) of the list.
    async fn edge_seq(&self, key: &str, tail: bool) -> KvStoreResult<Option<i64>> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::key_kind(key, StructureKind::List))
                .sort(filters::list_order(tail))
                .projection(doc! { fields::SEQ: 1 })
                .await
                .map_err(operation_error)?
                .and_then(|row| row.get_i64(fields::SEQ).ok())
        )
    }

    fn sequences(&self) -> Collection<Document> {
        self.conn.database().collection(SEQUENCES)
    }

    /// Allocates the `seq` of a new head (or tail) element.
    ///
    /// The counter update is atomic, which keeps concurrent allocations distinct.
    /// The edge read keeps them outside elements the counter has not seen, such as
    /// those moved in by a rename.
    async fn next_seq(&self, key: &str, tail: bool) -> KvStoreResult<i64> {
        let edge = self.edge_seq(key, tail).await?;

        let counter = self
            .sequences()
            .find_one_and_update(doc! { "_id": key }, filters::sequence_step(edge, tail))
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(operation_error)?
            .ok_or_else(|| KvStoreError::Operation(format!("sequence of {} returned no row", key)))?;

        counter
            .get_i64(filters::sequence_field(tail))
            .map_err(|e| KvStoreError::Operation(format!("sequence of {}: {}", key, e)))
    }

    async fn push(&self, key: &str, value: &str, seq: i64) -> KvStoreResult<()> {
        self.conn
            .rows()
            .insert_one(ObjectRow::list_element(key, value, seq))
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn pop(&self, key: &str, tail: bool) -> KvStoreResult<Option<String>> {
        Ok(
            self.conn
                .objects()
                .find_one_and_delete(filters::key_kind(key, StructureKind::List))
                .sort(filters::list_order(tail))
                .await
                .map_err(operation_error)?
                .and_then(|row| row.get_str(fields::VALUE).ok().map(str::to_string))
        )
    }

    /// Row ids in list order.
    async fn ids(&self, key: &str) -> KvStoreResult<Vec<Bson>> {
        Ok(
            self.conn
                .objects()
                .find(filters::key_kind(key, StructureKind::List))
                .sort(filters::list_order(false))
                .projection(doc! { "_id": 1 })
                .await
                .map_err(operation_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(operation_error)?
                .into_iter()
                .filter_map(|mut row| row.remove("_id"))
                .collect()
        )
    }
}

#[async_trait]
impl ListOps for MongoLists {
    async fn list_prepend(&self, key: &str, value: &str) -> KvStoreResult<()> {
        let seq = self.next_seq(key, false).await?;

        self.push(key, value, seq).await
    }

    async fn list_append(&self, key: &str, value: &str) -> KvStoreResult<()> {
        let seq = self.next_seq(key, true).await?;

        self.push(key, value, seq).await
    }

    async fn list_remove_first(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.pop(key, false).await
    }

    async fn list_remove_last(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.pop(key, true).await
    }

    async fn list_remove_all(&self, key: &str, value: &str) -> KvStoreResult<u64> {
        Ok(
            self.conn
                .objects()
                .delete_many(filters::member(key, StructureKind::List, value))
                .await
                .map_err(operation_error)?
                .deleted_count
        )
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<()> {
        let ids = self.ids(key).await?;
        let kept = match resolve_range(start, stop, ids.len() as u64) {
            Some((offset, count)) => ids
                .into_iter()
                .skip(offset as usize)
                .take(count as usize)
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };

        let mut filter = filters::key_kind(key, StructureKind::List);
        filter.insert("_id", doc! { "$nin": kept });

        self.conn
            .objects()
            .delete_many(filter)
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn get_list_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        let (offset, count) = match direct_range(start, stop) {
            Some(window) => window,
            None => match resolve_range(start, stop, self.list_length(key).await?) {
                Some((offset, count)) => (offset, Some(count)),
                None => return Ok(Vec::new()),
            },
        };

        let rows = self.conn.rows();
        let mut find = rows
            .find(filters::key_kind(key, StructureKind::List))
            .sort(filters::list_order(false))
            .skip(offset);

        match count {
            Some(0) => return Ok(Vec::new()),
            Some(count) => find = find.limit(i64::try_from(count).unwrap_or(i64::MAX)),
            None => {}
        }

        Ok(
            find.await
                .map_err(operation_error)?
                .try_collect::<Vec<ObjectRow>>()
                .await
                .map_err(operation_error)?
                .into_iter()
                .filter_map(|row| row.value)
                .collect()
        )
    }

    async fn list_length(&self, key: &str) -> KvStoreResult<u64> {
        self.conn
            .objects()
            .count_documents(filters::key_kind(key, StructureKind::List))
            .await
            .map_err(operation_error)
    }
}
