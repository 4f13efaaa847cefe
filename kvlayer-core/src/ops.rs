//! The structured key-value contract.
//!
//! The contract is split into one trait per structure kind so each backend can
//! implement it as five small, independent modules sharing one handle:
//!
//! - [`KeyValueOps`] - key-level operations, plain values and full-text search
//! - [`HashOps`] - field/value maps
//! - [`SetOps`] - unordered unique members
//! - [`SortedSetOps`] - unique members ordered by score
//! - [`ListOps`] - ordered sequences
//!
//! [`StructuredStore`] is the union of the five and is implemented automatically
//! for anything implementing all of them, including
//! [`Database`](crate::database::Database).
//!
//! # Absent versus empty
//!
//! Single-item reads distinguish "the key does not exist" from "the key exists but
//! does not hold that member" through [`Lookup`] and [`Membership`]. Range reads
//! return empty vectors for absent keys, matching key-value server semantics.

use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::{KvStoreError, KvStoreResult}, range::ScoreRange, schema::StructureKind};

/// Result of reading a single member of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lookup<T> {
    /// The member exists.
    Found(T),
    /// The key exists but does not hold the member.
    MemberAbsent,
    /// No row exists for the key at all.
    KeyAbsent,
}

impl<T> Lookup<T> {
    /// Converts into an `Option`, dropping the absent/empty distinction.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::MemberAbsent => Lookup::MemberAbsent,
            Lookup::KeyAbsent => Lookup::KeyAbsent,
        }
    }

    /// Builds the "not found" variant from whether the key exists.
    pub fn absent(key_exists: bool) -> Self {
        if key_exists { Lookup::MemberAbsent } else { Lookup::KeyAbsent }
    }
}

/// Result of a membership test against a set or sorted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Membership {
    Member,
    NotMember,
    KeyAbsent,
}

impl Membership {
    pub fn is_member(&self) -> bool {
        matches!(self, Membership::Member)
    }

    /// Builds the "not found" variant from whether the key exists.
    pub fn absent(key_exists: bool) -> Self {
        if key_exists { Membership::NotMember } else { Membership::KeyAbsent }
    }
}

/// A sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub value: String,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(value: impl Into<String>, score: f64) -> Self {
        Self { value: value.into(), score }
    }
}

/// Key-level operations, plain values and full-text search.
#[async_trait]
pub trait KeyValueOps: Send + Sync {
    /// Returns `true` if any row exists for the key.
    async fn exists(&self, key: &str) -> KvStoreResult<bool>;

    /// Returns the structure kind held by the key.
    async fn key_type(&self, key: &str) -> KvStoreResult<Option<StructureKind>>;

    /// Removes every row of the key, whatever its kind.
    async fn delete(&self, key: &str) -> KvStoreResult<()>;

    async fn delete_all(&self, keys: &[&str]) -> KvStoreResult<()>;

    /// Reads a plain value.
    async fn get(&self, key: &str) -> KvStoreResult<Option<Bson>>;

    /// Writes a plain value, replacing any previous one.
    async fn set(&self, key: &str, value: Bson) -> KvStoreResult<()>;

    /// Increments a plain integer value by one, creating it at 1.
    async fn increment(&self, key: &str) -> KvStoreResult<i64>;

    /// Moves every row of `old_key` to `new_key`, replacing what `new_key` held.
    /// Not atomic across the two steps.
    async fn rename(&self, old_key: &str, new_key: &str) -> KvStoreResult<()>;

    /// Expires every row of the key after `seconds`.
    async fn expire(&self, key: &str, seconds: u64) -> KvStoreResult<()> {
        let at = i64::try_from(seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| KvStoreError::InvalidValue(key.to_string(), format!("expiry of {}s is out of range", seconds)))?;

        self.expire_at(key, at).await
    }

    /// Expires every row of the key at `at`.
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> KvStoreResult<()>;

    /// Removes any expiry from the key.
    async fn persist(&self, key: &str) -> KvStoreResult<()>;

    /// Seconds until the key expires; `Found(None)` when it has no expiry.
    async fn ttl(&self, key: &str) -> KvStoreResult<Lookup<Option<i64>>>;

    /// Removes every row from both collections.
    async fn flush(&self) -> KvStoreResult<()>;

    /// Indexes `content` for entity `id` under `namespace`, replacing earlier content.
    async fn search_index(&self, namespace: &str, content: &str, id: &str) -> KvStoreResult<()>;

    /// Returns ids under `namespace` whose content matches `term`.
    async fn search(&self, namespace: &str, term: &str, limit: usize) -> KvStoreResult<Vec<String>>;

    async fn search_remove(&self, namespace: &str, id: &str) -> KvStoreResult<()>;
}

/// Field/value maps. Each field is one row; the field name is the row's `value`.
#[async_trait]
pub trait HashOps: Send + Sync {
    /// Writes every field of `object`, keeping fields not mentioned.
    async fn set_object(&self, key: &str, object: Document) -> KvStoreResult<()>;

    async fn set_object_field(&self, key: &str, field: &str, value: Bson) -> KvStoreResult<()>;

    /// Returns every field, or `None` if the key holds no fields.
    async fn get_object(&self, key: &str) -> KvStoreResult<Option<Document>>;

    async fn get_objects(&self, keys: &[&str]) -> KvStoreResult<Vec<Option<Document>>> {
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            objects.push(self.get_object(key).await?);
        }

        Ok(objects)
    }

    async fn get_object_field(&self, key: &str, field: &str) -> KvStoreResult<Lookup<Bson>>;

    /// Returns the requested fields, missing ones as `Null`; `None` if the key is absent.
    async fn get_object_fields(&self, key: &str, fields: &[&str]) -> KvStoreResult<Option<Document>>;

    async fn get_object_keys(&self, key: &str) -> KvStoreResult<Vec<String>>;

    async fn get_object_values(&self, key: &str) -> KvStoreResult<Vec<Bson>>;

    async fn is_object_field(&self, key: &str, field: &str) -> KvStoreResult<bool>;

    async fn delete_object_field(&self, key: &str, field: &str) -> KvStoreResult<()>;

    /// Adds `by` to an integer field, creating it at `by`, and returns the new value.
    async fn increment_object_field_by(&self, key: &str, field: &str, by: i64) -> KvStoreResult<i64>;

    async fn increment_object_field(&self, key: &str, field: &str) -> KvStoreResult<i64> {
        self.increment_object_field_by(key, field, 1).await
    }

    async fn decrement_object_field(&self, key: &str, field: &str) -> KvStoreResult<i64> {
        self.increment_object_field_by(key, field, -1).await
    }
}

/// Unordered collections of unique members.
#[async_trait]
pub trait SetOps: Send + Sync {
    async fn set_add(&self, key: &str, members: &[&str]) -> KvStoreResult<()>;

    async fn set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()>;

    async fn is_set_member(&self, key: &str, member: &str) -> KvStoreResult<Membership>;

    async fn is_set_members(&self, key: &str, members: &[&str]) -> KvStoreResult<Vec<bool>>;

    /// Tests one member against several sets.
    async fn is_member_of_sets(&self, keys: &[&str], member: &str) -> KvStoreResult<Vec<bool>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.is_set_member(key, member).await?.is_member());
        }

        Ok(results)
    }

    async fn get_set_members(&self, key: &str) -> KvStoreResult<Vec<String>>;

    async fn set_count(&self, key: &str) -> KvStoreResult<u64>;

    /// Removes and returns an arbitrary member.
    async fn set_remove_random(&self, key: &str) -> KvStoreResult<Option<String>>;
}

/// Unique members ordered by score, ties broken by first insertion.
#[async_trait]
pub trait SortedSetOps: Send + Sync {
    /// Adds a member or updates its score. Updating keeps its original insertion position.
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> KvStoreResult<()>;

    async fn sorted_set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()>;

    /// Members ranked `start..=stop` in ascending score order.
    async fn get_sorted_set_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        Ok(members_of(self.get_sorted_set_range_with_scores(key, start, stop).await?))
    }

    /// Members ranked `start..=stop` in descending score order.
    async fn get_sorted_set_rev_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        Ok(members_of(self.get_sorted_set_rev_range_with_scores(key, start, stop).await?))
    }

    async fn get_sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvStoreResult<Vec<ScoredMember>>;

    async fn get_sorted_set_rev_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvStoreResult<Vec<ScoredMember>>;

    /// Members whose score lies in `range`, ascending, skipping `offset` and
    /// returning at most `count` (all when `None`).
    async fn get_sorted_set_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>>;

    /// Same as [`get_sorted_set_range_by_score`](Self::get_sorted_set_range_by_score), descending.
    async fn get_sorted_set_rev_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>>;

    async fn sorted_set_count(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64>;

    async fn sorted_set_card(&self, key: &str) -> KvStoreResult<u64>;

    /// Zero-based position in ascending order.
    async fn sorted_set_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>>;

    /// Zero-based position in descending order.
    async fn sorted_set_rev_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>>;

    async fn sorted_set_score(&self, key: &str, member: &str) -> KvStoreResult<Lookup<f64>>;

    async fn is_sorted_set_member(&self, key: &str, member: &str) -> KvStoreResult<Membership> {
        Ok(match self.sorted_set_score(key, member).await? {
            Lookup::Found(_) => Membership::Member,
            Lookup::MemberAbsent => Membership::NotMember,
            Lookup::KeyAbsent => Membership::KeyAbsent,
        })
    }

    /// Adds `by` to a member's score, inserting it at `by`, and returns the new score.
    async fn sorted_set_increment_by(&self, key: &str, by: f64, member: &str) -> KvStoreResult<f64>;

    /// Removes members whose score lies in `range` and returns how many were removed.
    async fn sorted_set_remove_range_by_score(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64>;
}

/// Ordered sequences of (possibly repeated) elements.
#[async_trait]
pub trait ListOps: Send + Sync {
    async fn list_prepend(&self, key: &str, value: &str) -> KvStoreResult<()>;

    async fn list_append(&self, key: &str, value: &str) -> KvStoreResult<()>;

    async fn list_remove_first(&self, key: &str) -> KvStoreResult<Option<String>>;

    async fn list_remove_last(&self, key: &str) -> KvStoreResult<Option<String>>;

    /// Removes every occurrence of `value` and returns how many were removed.
    async fn list_remove_all(&self, key: &str, value: &str) -> KvStoreResult<u64>;

    /// Keeps only the elements in `start..=stop`.
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<()>;

    async fn get_list_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>>;

    async fn list_length(&self, key: &str) -> KvStoreResult<u64>;
}

/// The full structured key-value capability set.
pub trait StructuredStore: KeyValueOps + HashOps + SetOps + SortedSetOps + ListOps {}

impl<T> StructuredStore for T where T: KeyValueOps + HashOps + SetOps + SortedSetOps + ListOps {}

/// Seconds until a key expires, given the expiry of each of its live rows.
///
/// A key expires as a whole only when every row carries an expiry; the earliest
/// one wins. No rows at all means the key is absent.
pub fn key_ttl(expiries: impl IntoIterator<Item = Option<bson::DateTime>>, now: bson::DateTime) -> Lookup<Option<i64>> {
    let expiries = expiries.into_iter().collect::<Vec<_>>();

    if expiries.is_empty() {
        return Lookup::KeyAbsent;
    }

    Lookup::Found(
        expiries
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .and_then(|expiries| expiries.into_iter().min())
            .map(|at| ((at.timestamp_millis() - now.timestamp_millis()) / 1000).max(0)),
    )
}

fn members_of(scored: Vec<ScoredMember>) -> Vec<String> {
    scored
        .into_iter()
        .map(|member| member.value)
        .collect()
}
