use async_trait::async_trait;
use bson::DateTime;
use rand::Rng;

use kvlayer_core::{
    error::KvStoreResult,
    ops::{Membership, SetOps},
    schema::{ObjectRow, StructureKind},
};

use crate::table::SharedTable;

#[derive(Debug, Clone)]
pub struct MemorySets {
    table: SharedTable,
}

impl MemorySets {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl SetOps for MemorySets {
    async fn set_add(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let now = DateTime::now();

        for member in members {
            if table.find(key, StructureKind::Set, member, now).is_none() {
                table.insert(ObjectRow::set_member(key, member));
            }
        }

        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[&str]) -> KvStoreResult<()> {
        self.table
            .write()
            .await
            .remove_where(key, DateTime::now(), |row| {
                row.kind == StructureKind::Set && members.contains(&row.member())
            });

        Ok(())
    }

    async fn is_set_member(&self, key: &str, member: &str) -> KvStoreResult<Membership> {
        let table = self.table.read().await;
        let now = DateTime::now();

        Ok(match table.find(key, StructureKind::Set, member, now) {
            Some(_) => Membership::Member,
            None => Membership::absent(table.holds(key, StructureKind::Set, now)),
        })
    }

    async fn is_set_members(&self, key: &str, members: &[&str]) -> KvStoreResult<Vec<bool>> {
        let table = self.table.read().await;
        let now = DateTime::now();

        Ok(
            members
                .iter()
                .map(|member| table.find(key, StructureKind::Set, member, now).is_some())
                .collect()
        )
    }

    async fn get_set_members(&self, key: &str) -> KvStoreResult<Vec<String>> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::Set, DateTime::now())
                .map(|stored| stored.row.member().to_string())
                .collect()
        )
    }

    async fn set_count(&self, key: &str) -> KvStoreResult<u64> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::Set, DateTime::now())
                .count() as u64
        )
    }

    async fn set_remove_random(&self, key: &str) -> KvStoreResult<Option<String>> {
        let mut table = self.table.write().await;
        let now = DateTime::now();
        let members = table
            .live_of(key, StructureKind::Set, now)
            .map(|stored| stored.row.member().to_string())
            .collect::<Vec<_>>();

        if members.is_empty() {
            return Ok(None);
        }

        let picked = members[rand::thread_rng().gen_range(0..members.len())].clone();
        table.remove_where(key, now, |row| {
            row.kind == StructureKind::Set && row.member() == picked
        });

        Ok(Some(picked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ObjectTable;

    fn sets() -> MemorySets {
        MemorySets::new(ObjectTable::shared())
    }

    #[tokio::test]
    async fn members_are_unique() {
        let sets = sets();
        sets.set_add("tags", &["rust", "mongodb", "rust"]).await.unwrap();
        sets.set_add("tags", &["rust"]).await.unwrap();

        assert_eq!(sets.set_count("tags").await.unwrap(), 2);
        assert_eq!(sets.get_set_members("tags").await.unwrap(), vec!["rust", "mongodb"]);
    }

    #[tokio::test]
    async fn membership_distinguishes_absent_keys() {
        let sets = sets();
        sets.set_add("tags", &["rust"]).await.unwrap();

        assert_eq!(sets.is_set_member("tags", "rust").await.unwrap(), Membership::Member);
        assert_eq!(sets.is_set_member("tags", "go").await.unwrap(), Membership::NotMember);
        assert_eq!(sets.is_set_member("other", "go").await.unwrap(), Membership::KeyAbsent);
        assert_eq!(
            sets.is_member_of_sets(&["tags", "other"], "rust").await.unwrap(),
            vec![true, false]
        );
        assert_eq!(sets.is_set_members("tags", &["go", "rust"]).await.unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn remove_random_drains_the_set() {
        let sets = sets();
        sets.set_add("queue", &["a", "b"]).await.unwrap();

        let first = sets.set_remove_random("queue").await.unwrap().unwrap();
        let second = sets.set_remove_random("queue").await.unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(sets.set_remove_random("queue").await.unwrap(), None);
        assert_eq!(sets.is_set_member("queue", "a").await.unwrap(), Membership::KeyAbsent);
    }
}
