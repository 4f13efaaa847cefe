//! Composition of the five structure modules into one store.
//!
//! A backend provides one type per structure kind, each holding a clone of the same
//! shared handle. [`Database`] owns one of each and implements every operation trait
//! by delegating to the module that owns it, so it is a [`StructuredStore`].
//!
//! # Example
//!
//! ```ignore
//! use kvlayer::prelude::*;
//!
//! async fn greet(store: &dyn StructuredStore) -> KvStoreResult<()> {
//!     store.set_object_field("user:1", "username", "alice".into()).await?;
//!     store.sorted_set_add("users:joindate", 1_700_000_000.0, "1").await?;
//!     Ok(())
//! }
//! ```
//!
//! [`StructuredStore`]: crate::ops::StructuredStore

use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::{DateTime, Utc};

use crate::{
    error::KvStoreResult,
    ops::{HashOps, KeyValueOps, ListOps, Lookup, Membership, ScoredMember, SetOps, SortedSetOps},
    range::ScoreRange,
    schema::StructureKind,
};

/// A structured store composed from one module per structure kind.
///
/// # Type Parameters
///
/// * `M` - key-level operations ([`KeyValueOps`])
/// * `H` - hash operations ([`HashOps`])
/// * `S` - set operations ([`SetOps`])
/// * `Z` - sorted-set operations ([`SortedSetOps`])
/// * `L` - list operations ([`ListOps`])
#[derive(Debug, Clone)]
pub struct Database<M, H, S, Z, L> {
    main: M,
    hash: H,
    sets: S,
    sorted: Z,
    list: L,
}

impl<M, H, S, Z, L> Database<M, H, S, Z, L>
where
    M: KeyValueOps,
    H: HashOps,
    S: SetOps,
    Z: SortedSetOps,
    L: ListOps,
{
    /// Composes the five modules.
    pub fn new(main: M, hash: H, sets: S, sorted: Z, list: L) -> Self {
        Self { main, hash, sets, sorted, list }
    }

    pub fn main(&self) -> &M {
        &self.main
    }

    pub fn hash(&self) -> &H {
        &self.hash
    }

    pub fn sets(&self) -> &S {
        &self.sets
    }

    pub fn sorted(&self) -> &Z {
        &self.sorted
    }

    pub fn list(&self) -> &L {
        &self.list
    }
}

#[async_trait]
impl<M, H, S, Z, L> KeyValueOps for Database<M, H, S, Z, L>
where
    M: KeyValueOps,
    H: Send + Sync,
    S: Send + Sync,
    Z: Send + Sync,
    L: Send + Sync,
{
    async fn exists(&self, key: &str) -> KvStoreResult<bool> {
        self.main.exists(key).await
    }

    async fn key_type(&self, key: &str) -> KvStoreResult<Option<StructureKind>> {
        self.main.key_type(key).await
    }

    async fn delete(&self, key: &str) -> KvStoreResult<()> {
        self.main.delete(key).await
    }

    async fn delete_all(&self, keys: &[&str]) -> KvStoreResult<()> {
        self.main.delete_all(keys).await
    }

    async fn get(&self, key: &str) -> KvStoreResult<Option<Bson>> {
        self.main.get(key).await
    }

    async fn set(&self, key: &str, value: Bson) -> KvStoreResult<()> {
        self.main.set(key, value).await
    }

    async fn increment(&self, key: &str) -> KvStoreResult<i64> {
        self.main.increment(key).await
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> KvStoreResult<()> {
        self.main.rename(old_key, new_key).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> KvStoreResult<()> {
        self.main.expire(key, seconds).await
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> KvStoreResult<()> {
        self.main.expire_at(key, at).await
    }

    async fn persist(&self, key: &str) -> KvStoreResult<()> {
        self.main.persist(key).await
    }

    async fn ttl(&self, key: &str) -> KvStoreResult<Lookup<Option<i64>>> {
        self.main.ttl(key).await
    }

    async fn flush(&self) -> KvStoreResult<()> {
        self.main.flush().await
    }

    async fn search_index(&self, namespace: &str, content: &str, id: &str) -> KvStoreResult<()> {
        self.main
            .search_index(namespace, content, id)
            .await
    }

    async fn search(&self, namespace: &str, term: &str, limit: usize) -> KvStoreResult<Vec<String>> {
        self.main
            .search(namespace, term, limit)
            .await
    }

    async fn search_remove(&self, namespace: &str, id: &str) -> KvStoreResult<()> {
        self.main.search_remove(namespace, id).await
    }
}

#[async_trait]
impl<M, H, S, Z, L> HashOps for Database<M, H, S, Z, L>
where
    M: Send + Sync,
    H: HashOps,
    S: Send + Sync,
    Z: Send + Sync,
    L: Send + Sync,
{
    async fn set_object(&self, key: &str, object: Document) -> KvStoreResult<()> {
        self.hash.set_object(key, object).await
    }

    async fn set_object_field(&self, key: &str, field: &str, value: Bson) -> KvStoreResult<()> {
        self.hash
            .set_object_field(key, field, value)
            .await
    }

    async fn get_object(&self, key: &str) -> KvStoreResult<Option<Document>> {
        self.hash.get_object(key).await
    }

    async fn get_objects(&self, keys: &[&str]) -> KvStoreResult<Vec<Option<Document>>> {
        self.hash.get_objects(keys).await
    }

    async fn get_object_field(&self, key: &str, field: &str) -> KvStoreResult<Lookup<Bson>> {
        self.hash.get_object_field(key, field).await
    }

    async fn get_object_fields(&self, key: &str, fields: &[&str]) -> KvStoreResult<Option<Document>> {
        self.hash.get_object_fields(key, fields).await
    }

    async fn get_object_keys(&self, key: &str) -> KvStoreResult<Vec<String>> {
        self.hash.get_object_keys(key).await
    }

    async fn get_object_values(&self, key: &str) -> KvStoreResult<Vec<Bson>> {
        self.hash.get_object_values(key).await
    }

    async fn is_object_field(&self, key: &str, field: &str) -> KvStoreResult<bool> {
        self.hash.is_object_field(key, field).await
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> KvStoreResult<()> {
        self.hash.delete_object_field(key, field).await
    }

    async fn increment_object_field_by(&self, key: &str, field: &str, by: i64) -> KvStoreResult<i64> {
        self.hash
            .increment_object_field_by(key, field, by)
            .await
    }
}

#[async_trait]
impl<M, H, S, Z, L> SetOps for Database<M, H, S, Z, L>
where
    M: Send + Sync,
    H: Send + Sync,
    S: SetOps,
    Z: Send + Sync,
    L: Send + Sync,
{
    async fn set_add(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.sets.set_add(key, members).await
    }

    async fn set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.sets.set_remove(key, members).await
    }

    async fn is_set_member(&self, key: &str, member: &str) -> KvStoreResult<Membership> {
        self.sets.is_set_member(key, member).await
    }

    async fn is_set_members(&self, key: &str, members: &[&str]) -> KvStoreResult<Vec<bool>> {
        self.sets.is_set_members(key, members).await
    }

    async fn is_member_of_sets(&self, keys: &[&str], member: &str) -> KvStoreResult<Vec<bool>> {
        self.sets.is_member_of_sets(keys, member).await
    }

    async fn get_set_members(&self, key: &str) -> KvStoreResult<Vec<String>> {
        self.sets.get_set_members(key).await
    }

    async fn set_count(&self, key: &str) -> KvStoreResult<u64> {
        self.sets.set_count(key).await
    }

    async fn set_remove_random(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.sets.set_remove_random(key).await
    }
}

#[async_trait]
impl<M, H, S, Z, L> SortedSetOps for Database<M, H, S, Z, L>
where
    M: Send + Sync,
    H: Send + Sync,
    S: Send + Sync,
    Z: SortedSetOps,
    L: Send + Sync,
{
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> KvStoreResult<()> {
        self.sorted
            .sorted_set_add(key, score, member)
            .await
    }

    async fn sorted_set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.sorted.sorted_set_remove(key, members).await
    }

    async fn get_sorted_set_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        self.sorted
            .get_sorted_set_range(key, start, stop)
            .await
    }

    async fn get_sorted_set_rev_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        self.sorted
            .get_sorted_set_rev_range(key, start, stop)
            .await
    }

    async fn get_sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.sorted
            .get_sorted_set_range_with_scores(key, start, stop)
            .await
    }

    async fn get_sorted_set_rev_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.sorted
            .get_sorted_set_rev_range_with_scores(key, start, stop)
            .await
    }

    async fn get_sorted_set_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.sorted
            .get_sorted_set_range_by_score(key, range, offset, count)
            .await
    }

    async fn get_sorted_set_rev_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.sorted
            .get_sorted_set_rev_range_by_score(key, range, offset, count)
            .await
    }

    async fn sorted_set_count(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64> {
        self.sorted.sorted_set_count(key, range).await
    }

    async fn sorted_set_card(&self, key: &str) -> KvStoreResult<u64> {
        self.sorted.sorted_set_card(key).await
    }

    async fn sorted_set_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>> {
        self.sorted.sorted_set_rank(key, member).await
    }

    async fn sorted_set_rev_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>> {
        self.sorted.sorted_set_rev_rank(key, member).await
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> KvStoreResult<Lookup<f64>> {
        self.sorted.sorted_set_score(key, member).await
    }

    async fn is_sorted_set_member(&self, key: &str, member: &str) -> KvStoreResult<Membership> {
        self.sorted.is_sorted_set_member(key, member).await
    }

    async fn sorted_set_increment_by(&self, key: &str, by: f64, member: &str) -> KvStoreResult<f64> {
        self.sorted
            .sorted_set_increment_by(key, by, member)
            .await
    }

    async fn sorted_set_remove_range_by_score(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64> {
        self.sorted
            .sorted_set_remove_range_by_score(key, range)
            .await
    }
}

#[async_trait]
impl<M, H, S, Z, L> ListOps for Database<M, H, S, Z, L>
where
    M: Send + Sync,
    H: Send + Sync,
    S: Send + Sync,
    Z: Send + Sync,
    L: ListOps,
{
    async fn list_prepend(&self, key: &str, value: &str) -> KvStoreResult<()> {
        self.list.list_prepend(key, value).await
    }

    async fn list_append(&self, key: &str, value: &str) -> KvStoreResult<()> {
        self.list.list_append(key, value).await
    }

    async fn list_remove_first(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.list.list_remove_first(key).await
    }

    async fn list_remove_last(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.list.list_remove_last(key).await
    }

    async fn list_remove_all(&self, key: &str, value: &str) -> KvStoreResult<u64> {
        self.list.list_remove_all(key, value).await
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<()> {
        self.list.list_trim(key, start, stop).await
    }

    async fn get_list_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        self.list.get_list_range(key, start, stop).await
    }

    async fn list_length(&self, key: &str) -> KvStoreResult<u64> {
        self.list.list_length(key).await
    }
}
