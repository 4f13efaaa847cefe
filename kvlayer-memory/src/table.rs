//! The shared row table behind every in-memory structure module.
//!
//! Rows are grouped by `_key` and kept in insertion order, which makes insertion the
//! natural tie-breaker for every ordered read. Expired rows are hidden from reads as
//! soon as their `expireAt` passes, dropped from a key whenever that key is written,
//! and purged from the whole table by [`ObjectTable::sweep_expired`].

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use bson::{Bson, DateTime};
use mea::rwlock::RwLock;

use kvlayer_core::{
    error::{KvStoreError, KvStoreResult},
    index::IndexSpec,
    schema::{ObjectRow, SearchRow, StructureKind},
};

/// Handle shared by the structure modules of one store.
pub type SharedTable = Arc<RwLock<ObjectTable>>;

/// A row together with its insertion sequence number.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub(crate) row: ObjectRow,
    pub(crate) inserted: u64,
}

/// In-memory equivalent of the `objects` and `search` collections.
#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: HashMap<String, Vec<StoredRow>>,
    search: Vec<SearchRow>,
    indices: Vec<IndexSpec>,
    next_insert: u64,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh table in a shareable handle.
    pub fn shared() -> SharedTable {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Live rows of a key, in insertion order.
    pub(crate) fn live(&self, key: &str, now: DateTime) -> impl Iterator<Item = &StoredRow> {
        self.objects
            .get(key)
            .into_iter()
            .flatten()
            .filter(move |stored| !stored.row.is_expired(now))
    }

    /// Live rows of a key holding `kind`, in insertion order.
    pub(crate) fn live_of(&self, key: &str, kind: StructureKind, now: DateTime) -> impl Iterator<Item = &StoredRow> {
        self.live(key, now)
            .filter(move |stored| stored.row.kind == kind)
    }

    pub(crate) fn holds(&self, key: &str, kind: StructureKind, now: DateTime) -> bool {
        self.live_of(key, kind, now).next().is_some()
    }

    pub(crate) fn find(&self, key: &str, kind: StructureKind, member: &str, now: DateTime) -> Option<&ObjectRow> {
        self.live_of(key, kind, now)
            .map(|stored| &stored.row)
            .find(|row| row.value.as_deref() == Some(member))
    }

    /// Rows of a key for writing. Expired rows are dropped first.
    pub(crate) fn rows_mut(&mut self, key: &str, now: DateTime) -> &mut Vec<StoredRow> {
        let rows = self.objects.entry(key.to_string()).or_default();
        rows.retain(|stored| !stored.row.is_expired(now));
        rows
    }

    pub(crate) fn find_mut(
        &mut self,
        key: &str,
        kind: StructureKind,
        member: Option<&str>,
        now: DateTime,
    ) -> Option<&mut ObjectRow> {
        self.rows_mut(key, now)
            .iter_mut()
            .map(|stored| &mut stored.row)
            .find(|row| row.kind == kind && row.value.as_deref() == member)
    }

    /// Appends a row behind every existing row of its key.
    pub(crate) fn insert(&mut self, row: ObjectRow) {
        let inserted = self.next_insert;
        self.next_insert += 1;

        self.objects
            .entry(row.key.clone())
            .or_default()
            .push(StoredRow { row, inserted });
    }

    /// Removes rows of `key` matching `predicate` and returns how many were removed.
    pub(crate) fn remove_where(
        &mut self,
        key: &str,
        now: DateTime,
        predicate: impl Fn(&ObjectRow) -> bool,
    ) -> u64 {
        let rows = self.rows_mut(key, now);
        let before = rows.len();
        rows.retain(|stored| !predicate(&stored.row));
        let removed = (before - rows.len()) as u64;

        self.compact(key);
        removed
    }

    /// Drops the key's entry once it holds no rows.
    pub(crate) fn compact(&mut self, key: &str) {
        if self
            .objects
            .get(key)
            .is_some_and(Vec::is_empty)
        {
            self.objects.remove(key);
        }
    }

    pub(crate) fn take_key(&mut self, key: &str, now: DateTime) -> Option<Vec<StoredRow>> {
        self.objects
            .remove(key)
            .map(|rows| {
                rows.into_iter()
                    .filter(|stored| !stored.row.is_expired(now))
                    .collect::<Vec<_>>()
            })
            .filter(|rows| !rows.is_empty())
    }

    pub(crate) fn put_key(&mut self, key: &str, rows: Vec<StoredRow>) {
        self.objects.insert(key.to_string(), rows);
    }

    /// Live sorted-set rows ordered by score, ties in insertion order.
    pub(crate) fn sorted_members(&self, key: &str, descending: bool, now: DateTime) -> Vec<&ObjectRow> {
        let mut rows = self
            .live_of(key, StructureKind::SortedSet, now)
            .map(|stored| &stored.row)
            .collect::<Vec<_>>();

        // `sort_by` is stable, so equal scores keep insertion order in both directions.
        rows.sort_by(|a, b| {
            let ordering = score_of(a).total_cmp(&score_of(b));
            if descending { ordering.reverse() } else { ordering }
        });

        rows
    }

    /// Live list rows in list order.
    pub(crate) fn list_elements(&self, key: &str, now: DateTime) -> Vec<&StoredRow> {
        let mut rows = self
            .live_of(key, StructureKind::List, now)
            .collect::<Vec<_>>();

        rows.sort_by(|a, b| match a.row.seq.cmp(&b.row.seq) {
            Ordering::Equal => a.inserted.cmp(&b.inserted),
            ordering => ordering,
        });

        rows
    }

    pub(crate) fn clear(&mut self) {
        self.objects.clear();
        self.search.clear();
    }

    pub(crate) fn search_rows(&self) -> &[SearchRow] {
        &self.search
    }

    pub(crate) fn search_rows_mut(&mut self) -> &mut Vec<SearchRow> {
        &mut self.search
    }

    /// Records an index declaration; identical declarations are ignored.
    pub(crate) fn declare_index(&mut self, spec: &IndexSpec) -> KvStoreResult<()> {
        match self
            .indices
            .iter()
            .find(|existing| existing.collection == spec.collection && existing.keys == spec.keys)
        {
            Some(existing) if existing.options == spec.options => Ok(()),
            Some(_) => Err(KvStoreError::Operation(format!(
                "index {} already exists with different options",
                spec.name()
            ))),
            None => {
                self.indices.push(spec.clone());
                Ok(())
            }
        }
    }

    /// Declared indices, in declaration order.
    pub fn indices(&self) -> &[IndexSpec] {
        &self.indices
    }

    /// Removes every expired row and returns how many were removed.
    pub fn sweep_expired(&mut self, now: DateTime) -> usize {
        let mut removed = 0;

        self.objects.retain(|_, rows| {
            let before = rows.len();
            rows.retain(|stored| !stored.row.is_expired(now));
            removed += before - rows.len();
            !rows.is_empty()
        });

        removed
    }

    /// Number of stored rows, expired or not.
    pub fn row_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }
}

pub(crate) fn score_of(row: &ObjectRow) -> f64 {
    row.score.unwrap_or_default()
}

/// Reads a stored payload as an integer, accepting whole doubles.
pub(crate) fn integer_of(key: &str, value: &Bson) -> KvStoreResult<i64> {
    match value {
        Bson::Int32(n) => Ok(i64::from(*n)),
        Bson::Int64(n) => Ok(*n),
        Bson::Double(n) if n.fract() == 0.0 => Ok(*n as i64),
        other => Err(KvStoreError::InvalidValue(
            key.to_string(),
            format!("cannot increment non-integer value {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_rows_are_hidden_then_swept() {
        let now = DateTime::now();
        let mut table = ObjectTable::new();
        let mut stale = ObjectRow::set_member("tags", "old");
        stale.expire_at = Some(DateTime::from_millis(now.timestamp_millis() - 1_000));
        table.insert(stale);
        table.insert(ObjectRow::set_member("tags", "new"));

        assert_eq!(table.live("tags", now).count(), 1);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.sweep_expired(now), 1);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn equal_scores_keep_insertion_order_both_ways() {
        let now = DateTime::now();
        let mut table = ObjectTable::new();
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 1.0)] {
            table.insert(ObjectRow::sorted_member("z", member, score));
        }

        let ascending = table
            .sorted_members("z", false, now)
            .into_iter()
            .map(ObjectRow::member)
            .collect::<Vec<_>>();
        let descending = table
            .sorted_members("z", true, now)
            .into_iter()
            .map(ObjectRow::member)
            .collect::<Vec<_>>();

        assert_eq!(ascending, ["a", "c", "b"]);
        assert_eq!(descending, ["b", "a", "c"]);
    }

    #[test]
    fn conflicting_index_declarations_are_rejected() {
        let mut table = ObjectTable::new();
        let mut spec = kvlayer_core::index::required_indices()[2].clone();

        table.declare_index(&spec).unwrap();
        table.declare_index(&spec).unwrap();
        assert_eq!(table.indices().len(), 1);

        spec.options.expire_after_seconds = Some(60);
        assert!(table.declare_index(&spec).is_err());
    }

    #[test]
    fn integers_accept_whole_doubles_only() {
        assert_eq!(integer_of("k", &Bson::Double(4.0)).unwrap(), 4);
        assert_eq!(integer_of("k", &Bson::Int32(7)).unwrap(), 7);
        assert!(integer_of("k", &Bson::Double(4.5)).is_err());
        assert!(integer_of("k", &Bson::String("7".into())).is_err());
    }
}
