use async_trait::async_trait;
use bson::DateTime;

use kvlayer_core::{
    error::KvStoreResult,
    ops::{Lookup, ScoredMember, SortedSetOps},
    range::{ScoreRange, resolve_range},
    schema::{ObjectRow, StructureKind},
};

use crate::table::{ObjectTable, SharedTable, score_of};

#[derive(Debug, Clone)]
pub struct MemorySortedSets {
    table: SharedTable,
}

impl MemorySortedSets {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }

    async fn range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        descending: bool,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        let table = self.table.read().await;
        let members = table.sorted_members(key, descending, DateTime::now());

        let Some((offset, count)) = resolve_range(start, stop, members.len() as u64) else {
            return Ok(Vec::new());
        };

        Ok(
            members
                .into_iter()
                .skip(offset as usize)
                .take(count as usize)
                .map(scored)
                .collect()
        )
    }

    async fn range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
        descending: bool,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        let table = self.table.read().await;

        Ok(
            table
                .sorted_members(key, descending, DateTime::now())
                .into_iter()
                .filter(|row| range.contains(score_of(row)))
                .skip(offset as usize)
                .take(count.map_or(usize::MAX, |count| count as usize))
                .map(scored)
                .collect()
        )
    }

    async fn rank(&self, key: &str, member: &str, descending: bool) -> KvStoreResult<Lookup<u64>> {
        let table = self.table.read().await;
        let now = DateTime::now();
        let members = table.sorted_members(key, descending, now);

        Ok(
            match members.iter().position(|row| row.member() == member) {
                Some(rank) => Lookup::Found(rank as u64),
                None => Lookup::absent(!members.is_empty()),
            }
        )
    }
}

fn scored(row: &ObjectRow) -> ScoredMember {
    ScoredMember::new(row.member(), score_of(row))
}

fn upsert_score(table: &mut ObjectTable, key: &str, member: &str, now: DateTime, score: impl FnOnce(Option<f64>) -> f64) -> f64 {
    match table.find_mut(key, StructureKind::SortedSet, Some(member), now) {
        Some(row) => {
            let next = score(row.score);
            row.score = Some(next);
            next
        }
        None => {
            let next = score(None);
            table.insert(ObjectRow::sorted_member(key, member, next));
            next
        }
    }
}

#[async_trait]
impl SortedSetOps for MemorySortedSets {
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> KvStoreResult<()> {
        upsert_score(&mut *self.table.write().await, key, member, DateTime::now(), |_| score);

        Ok(())
    }

    async fn sorted_set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.table
            .write()
            .await
            .remove_where(key, DateTime::now(), |row| {
                row.kind == StructureKind::SortedSet && members.contains(&row.member())
            });

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
        self.range_by_score(key, range, offset, count, false).await
    }

    async fn get_sorted_set_rev_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: u64,
        count: Option<u64>,
    ) -> KvStoreResult<Vec<ScoredMember>> {
        self.range_by_score(key, range, offset, count, true).await
    }

    async fn sorted_set_count(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::SortedSet, DateTime::now())
                .filter(|stored| range.contains(score_of(&stored.row)))
                .count() as u64
        )
    }

    async fn sorted_set_card(&self, key: &str) -> KvStoreResult<u64> {
        self.sorted_set_count(key, ScoreRange::all()).await
    }

    async fn sorted_set_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>> {
        self.rank(key, member, false).await
    }

    async fn sorted_set_rev_rank(&self, key: &str, member: &str) -> KvStoreResult<Lookup<u64>> {
        self.rank(key, member, true).await
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> KvStoreResult<Lookup<f64>> {
        let table = self.table.read().await;
        let now = DateTime::now();

        Ok(match table.find(key, StructureKind::SortedSet, member, now) {
            Some(row) => Lookup::Found(score_of(row)),
            None => Lookup::absent(table.holds(key, StructureKind::SortedSet, now)),
        })
    }

    async fn sorted_set_increment_by(&self, key: &str, by: f64, member: &str) -> KvStoreResult<f64> {
        Ok(upsert_score(
            &mut *self.table.write().await,
            key,
            member,
            DateTime::now(),
            |current| current.unwrap_or_default() + by,
        ))
    }

    async fn sorted_set_remove_range_by_score(&self, key: &str, range: ScoreRange) -> KvStoreResult<u64> {
        Ok(
            self.table
                .write()
                .await
                .remove_where(key, DateTime::now(), |row| {
                    row.kind == StructureKind::SortedSet && range.contains(score_of(row))
                })
        )
    }
}

#[cfg(test)]
mod tests {
    use kvlayer_core::ops::Membership;

    use super::*;

    async fn seeded() -> MemorySortedSets {
        let sorted = MemorySortedSets::new(ObjectTable::shared());
        for (member, score) in [("c", 3.0), ("a", 1.0), ("b", 2.0)] {
            sorted.sorted_set_add("z", score, member).await.unwrap();
        }
        sorted
    }

    #[tokio::test]
    async fn ranges_follow_score_order() {
        let sorted = seeded().await;

        assert_eq!(sorted.get_sorted_set_range("z", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(sorted.get_sorted_set_rev_range("z", 0, -1).await.unwrap(), vec!["c", "b", "a"]);
        assert_eq!(sorted.get_sorted_set_range("z", -2, -1).await.unwrap(), vec!["b", "c"]);
        assert!(sorted.get_sorted_set_range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn equal_scores_keep_first_insertion_order() {
        let sorted = MemorySortedSets::new(ObjectTable::shared());
        for member in ["x", "y", "z"] {
            sorted.sorted_set_add("ties", 5.0, member).await.unwrap();
        }
        // Re-adding keeps the original position.
        sorted.sorted_set_add("ties", 5.0, "x").await.unwrap();

        assert_eq!(sorted.get_sorted_set_range("ties", 0, -1).await.unwrap(), vec!["x", "y", "z"]);
        assert_eq!(sorted.get_sorted_set_rev_range("ties", 0, -1).await.unwrap(), vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn score_windows_with_offset_and_count() {
        let sorted = seeded().await;

        let window = sorted
            .get_sorted_set_range_by_score("z", ScoreRange::at_least(2.0), 0, None)
            .await
            .unwrap();
        assert_eq!(window, vec![ScoredMember::new("b", 2.0), ScoredMember::new("c", 3.0)]);

        let window = sorted
            .get_sorted_set_rev_range_by_score("z", ScoreRange::all(), 1, Some(1))
            .await
            .unwrap();
        assert_eq!(window, vec![ScoredMember::new("b", 2.0)]);

        assert_eq!(sorted.sorted_set_count("z", ScoreRange::new(1.0, 2.0)).await.unwrap(), 2);
        assert_eq!(sorted.sorted_set_card("z").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rank_and_score_lookups() {
        let sorted = seeded().await;

        assert_eq!(sorted.sorted_set_rank("z", "c").await.unwrap(), Lookup::Found(2));
        assert_eq!(sorted.sorted_set_rev_rank("z", "c").await.unwrap(), Lookup::Found(0));
        assert_eq!(sorted.sorted_set_rank("z", "q").await.unwrap(), Lookup::MemberAbsent);
        assert_eq!(sorted.sorted_set_rank("none", "q").await.unwrap(), Lookup::KeyAbsent);
        assert_eq!(sorted.sorted_set_score("z", "b").await.unwrap(), Lookup::Found(2.0));
        assert_eq!(sorted.is_sorted_set_member("z", "q").await.unwrap(), Membership::NotMember);
    }

    #[tokio::test]
    async fn increments_and_range_removal() {
        let sorted = seeded().await;

        assert_eq!(sorted.sorted_set_increment_by("z", 5.0, "a").await.unwrap(), 6.0);
        assert_eq!(sorted.sorted_set_increment_by("z", 1.5, "d").await.unwrap(), 1.5);
        assert_eq!(sorted.get_sorted_set_range("z", 0, 0).await.unwrap(), vec!["d"]);

        assert_eq!(
            sorted.sorted_set_remove_range_by_score("z", ScoreRange::at_most(3.0)).await.unwrap(),
            3
        );
        assert_eq!(sorted.get_sorted_set_range("z", 0, -1).await.unwrap(), vec!["a"]);

        sorted.sorted_set_remove("z", &["a"]).await.unwrap();
        assert_eq!(sorted.sorted_set_card("z").await.unwrap(), 0);
    }
}
