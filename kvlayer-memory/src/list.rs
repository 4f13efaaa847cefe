use std::collections::HashSet;

use async_trait::async_trait;
use bson::DateTime;

use kvlayer_core::{
    error::KvStoreResult,
    ops::ListOps,
    range::resolve_range,
    schema::{ObjectRow, StructureKind},
};

use crate::table::{ObjectTable, SharedTable};

#[derive(Debug, Clone)]
pub struct MemoryLists {
    table: SharedTable,
}

impl MemoryLists {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }

    /// Removes the element at the head or the tail of the list.
    async fn pop(&self, key: &str, from_tail: bool) -> KvStoreResult<Option<String>> {
        let mut table = self.table.write().await;
        let now = DateTime::now();
        let elements = table.list_elements(key, now);
        let picked = if from_tail { elements.last() } else { elements.first() };

        let Some((inserted, value)) = picked.map(|stored| (stored.inserted, stored.row.member().to_string())) else {
            return Ok(None);
        };

        drop_inserted(&mut table, key, now, &HashSet::from([inserted]));
        Ok(Some(value))
    }
}

fn drop_inserted(table: &mut ObjectTable, key: &str, now: DateTime, inserted: &HashSet<u64>) {
    table
        .rows_mut(key, now)
        .retain(|stored| !inserted.contains(&stored.inserted));
    table.compact(key);
}

#[async_trait]
impl ListOps for MemoryLists {
    async fn list_prepend(&self, key: &str, value: &str) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let seq = table
            .live_of(key, StructureKind::List, DateTime::now())
            .filter_map(|stored| stored.row.seq)
            .min()
            .map_or(0, |seq| seq - 1);

        table.insert(ObjectRow::list_element(key, value, seq));
        Ok(())
    }

    async fn list_append(&self, key: &str, value: &str) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let seq = table
            .live_of(key, StructureKind::List, DateTime::now())
            .filter_map(|stored| stored.row.seq)
            .max()
            .map_or(0, |seq| seq + 1);

        table.insert(ObjectRow::list_element(key, value, seq));
        Ok(())
    }

    async fn list_remove_first(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.pop(key, false).await
    }

    async fn list_remove_last(&self, key: &str) -> KvStoreResult<Option<String>> {
        self.pop(key, true).await
    }

    async fn list_remove_all(&self, key: &str, value: &str) -> KvStoreResult<u64> {
        Ok(
            self.table
                .write()
                .await
                .remove_where(key, DateTime::now(), |row| {
                    row.kind == StructureKind::List && row.member() == value
                })
        )
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let now = DateTime::now();
        let elements = table.list_elements(key, now);
        let kept = match resolve_range(start, stop, elements.len() as u64) {
            Some((offset, count)) => offset as usize..(offset + count) as usize,
            None => 0..0,
        };

        let dropped = elements
            .iter()
            .enumerate()
            .filter(|(position, _)| !kept.contains(position))
            .map(|(_, stored)| stored.inserted)
            .collect::<HashSet<_>>();

        drop_inserted(&mut table, key, now, &dropped);
        Ok(())
    }

    async fn get_list_range(&self, key: &str, start: i64, stop: i64) -> KvStoreResult<Vec<String>> {
        let table = self.table.read().await;
        let elements = table.list_elements(key, DateTime::now());

        let Some((offset, count)) = resolve_range(start, stop, elements.len() as u64) else {
            return Ok(Vec::new());
        };

        Ok(
            elements
                .into_iter()
                .skip(offset as usize)
                .take(count as usize)
                .map(|stored| stored.row.member().to_string())
                .collect()
        )
    }

    async fn list_length(&self, key: &str) -> KvStoreResult<u64> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::List, DateTime::now())
                .count() as u64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists() -> MemoryLists {
        MemoryLists::new(ObjectTable::shared())
    }

    #[tokio::test]
    async fn prepend_and_append_order() {
        let lists = lists();
        lists.list_append("recent", "b").await.unwrap();
        lists.list_append("recent", "c").await.unwrap();
        lists.list_prepend("recent", "a").await.unwrap();

        assert_eq!(lists.get_list_range("recent", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(lists.get_list_range("recent", -1, -1).await.unwrap(), vec!["c"]);
        assert_eq!(lists.list_length("recent").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn pops_from_both_ends() {
        let lists = lists();
        for value in ["a", "b", "c"] {
            lists.list_append("queue", value).await.unwrap();
        }

        assert_eq!(lists.list_remove_first("queue").await.unwrap().as_deref(), Some("a"));
        assert_eq!(lists.list_remove_last("queue").await.unwrap().as_deref(), Some("c"));
        assert_eq!(lists.get_list_range("queue", 0, -1).await.unwrap(), vec!["b"]);
        assert_eq!(lists.list_remove_last("empty").await.unwrap(), None);
    }

    #[tokio::test]
    async fn trim_and_remove_all() {
        let lists = lists();
        for value in ["x", "a", "x", "b", "x"] {
            lists.list_append("log", value).await.unwrap();
        }

        assert_eq!(lists.list_remove_all("log", "x").await.unwrap(), 3);
        assert_eq!(lists.get_list_range("log", 0, -1).await.unwrap(), vec!["a", "b"]);

        lists.list_append("log", "c").await.unwrap();
        lists.list_trim("log", 1, -1).await.unwrap();
        assert_eq!(lists.get_list_range("log", 0, -1).await.unwrap(), vec!["b", "c"]);

        lists.list_trim("log", 5, 10).await.unwrap();
        assert_eq!(lists.list_length("log").await.unwrap(), 0);
    }
}
