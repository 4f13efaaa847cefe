use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;

use kvlayer_core::{
    error::{KvStoreError, KvStoreResult},
    ops::{Lookup, ScoredMember, SortedSetOps},
    range::{ScoreRange, direct_range, resolve_range},
    schema::{ObjectRow, StructureKind, fields},
};

use crate::{connection::MongoConnection, error::operation_error, filters};

/// Sorted-set operations over MongoDB: one row per member, ordered by `score`
/// and then by row id.
#[derive(Debug, Clone)]
pub struct MongoSortedSets {
    conn: Arc<MongoConnection>,
}

impl MongoSortedSets {
    pub fn new(conn: Arc<MongoConnection>) -> Self {
        Self { conn }
    }

    /// Reads `count` members (all when `None`) after skipping `offset`, in score order.
    async fn window(
        &self,
        filter: Document,
        offset: u64,
        count: Option<u64>,
        descending: bool,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        let rows = self.conn.rows();
        let mut find = rows
            .find(filter)
            .sort(filters::score_order(descending))
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
                .iter()
                .map(|row| ScoredMember::new(row.member(), row.score.unwrap_or_default()))
                .collect()
        )
    }

    async fn range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        descending: bool,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        // Negative bounds other than a trailing -1 need the cardinality first.
        let (offset, count) = match direct_range(start, stop) {
            Some(window) => window,
            None => match resolve_range(start, stop, self.sorted_set_card(key).await?) {
                Some((offset, count)) => (offset, Some(count)),
                None => return Ok(Vec::new()),
            },
        };

        self.window(filters::key_kind(key, StructureKind::SortedSet), offset, count, descending)
            .await
    }

    async fn member_row(&self, key: &str, member: &str) -> KvStoreResult<Option<Document>> {
        self.conn
            .objects()
            .find_one(filters::member(key, StructureKind::SortedSet, member))
            .projection(doc! { fields::SCORE: 1 })
            .await
            .map_err(operation_error)
    }

    async fn holds_sorted_set(&self, key: &str) -> KvStoreResult<bool> {
        Ok(
            self.conn
                .objects()
                .find_one(filters::key_kind(key, StructureKind::SortedSet))
                .projection(doc! { "_id": 1 })
                .await
                .map_err(operation_error)?
                .is_some()
        )
    }

    /// Counts the members ranked before `member`. Not atomic with respect to
    /// concurrent writes between the two reads.
    async fn rank(&self, key: &str, member: &str, descending: bool) -> KvStoreResult<Lookup<u64>> {
        let Some(row) = self.member_row(key, member).await? else {
            return Ok(Lookup::absent(self.holds_sorted_set(key).await?));
        };

        let id = row.get("_id").cloned().unwrap_or(Bson::Null);
        let before = self
            .conn
            .objects()
            .count_documents(filters::ranked_before(key, score_of(&row), &id, descending))
            .await
            .map_err(operation_error)?;

        Ok(Lookup::Found(before))
    }
}

fn score_of(row: &Document) -> f64 {
    match row.get(fields::SCORE) {
        Some(Bson::Double(score)) => *score,
        Some(Bson::Int32(score)) => f64::from(*score),
        Some(Bson::Int64(score)) => *score as f64,
        _ => 0.0,
    }
}

#[async_trait]
impl SortedSetOps for MongoSortedSets {
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> KvStoreResult<()> {
        self.conn
            .objects()
            .update_one(
                filters::member(key, StructureKind::SortedSet, member),
                doc! { "$set": { fields::SCORE: score } },
            )
            .upsert(true)
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn sorted_set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.conn
            .objects()
            .delete_many(filters::members(key, StructureKind::SortedSet, members))
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn get_sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.range_with_scores(key, start, stop, false).await
    }

    async fn get_sorted_set_rev_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.range_with_scores(key, start, stop, true).await
    }

    async fn get_sorted_set_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.window(filters::score_range(key, range), offset, count, false).await
    }

    async fn get_sorted_set_rev_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.window(filters::score_range(key, range), offset, count, true).await
    }

    async fn sorted_set_count(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64> {
        self.conn
            .objects()
            .count_documents(filters::score_range(key, range))
            .await
            .map_err(operation_error)
    }

    async fn sorted_set_card(&self, key: &str) -> KvStoreResult<u64> {
        self.conn
            .objects()
            .count_documents(filters::key_kind(key, StructureKind::SortedSet))
            .await
            .map_err(operation_error)
    }

    async fn sorted_set_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>> {
        self.rank(key, member, false).await
    }

    async fn sorted_set_rev_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>> {
        self.rank(key, member, true).await
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> KvStoreResult<Lookup<f64>> {
        match self.member_row(key, member).await? {
            Some(row) => Ok(Lookup::Found(score_of(&row))),
            None => Ok(Lookup::absent(self.holds_sorted_set(key).await?)),
        }
    }

    async fn sorted_set_increment_by(&self, key: &str, by: f64, member: &str) -> KvStoreResult<f64> {
        let row = self
            .conn
            .objects()
            .find_one_and_update(
                filters::member(key, StructureKind::SortedSet, member),
                doc! { "$inc": { fields::SCORE: by } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(operation_error)?
            .ok_or_else(|| KvStoreError::Operation(format!("upsert of {} in {} returned no row", member, key)))?;

        Ok(score_of(&row))
    }

    async fn sorted_set_remove_range_by_score(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64> {
        Ok(
            self.conn
                .objects()
                .delete_many(filters::score_range(key, range))
                .await
                .map_err(operation_error)?
                .deleted_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_read_from_any_numeric_type() {
        assert_eq!(score_of(&doc! { "score": 2.5 }), 2.5);
        assert_eq!(score_of(&doc! { "score": 3 }), 3.0);
        assert_eq!(score_of(&doc! { "score": 4_i64 }), 4.0);
        assert_eq!(score_of(&doc! {}), 0.0);
    }
}
