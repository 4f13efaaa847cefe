//! Key-level operations, plain values and full-text search.

use async_trait::async_trait;
use bson::{Bson, DateTime};
use chrono::Utc;

use kvlayer_core::{
    error::KvStoreResult,
    ops::{KeyValueOps, Lookup, key_ttl},
    schema::{ObjectRow, SearchRow, StructureKind},
};

use crate::table::{SharedTable, integer_of};

#[derive(Debug, Clone)]
pub struct MemoryKeys {
    table: SharedTable,
}

impl MemoryKeys {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl KeyValueOps for MemoryKeys {
    async fn exists(&self, key: &str) -> KvStoreResult<bool> {
        Ok(
            self.table
                .read()
                .await
                .live(key, DateTime::now())
                .next()
                .is_some()
        )
    }

    async fn key_type(&self, key: &str) -> KvStoreResult<Option<StructureKind>> {
        Ok(
            self.table
                .read()
                .await
                .live(key, DateTime::now())
                .next()
                .map(|stored| stored.row.kind)
        )
    }

    async fn delete(&self, key: &str) -> KvStoreResult<()> {
        self.delete_all(&[key]).await
    }

    async fn delete_all(&self, keys: &[&str]) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let now = DateTime::now();

        for key in keys {
            table.remove_where(key, now, |_| true);
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> KvStoreResult<Option<Bson>> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::String, DateTime::now())
                .next()
                .and_then(|stored| stored.row.data.clone())
        )
    }

    async fn set(&self, key: &str, value: Bson) -> KvStoreResult<()> {
        let mut table = self.table.write().await;

        match table.find_mut(key, StructureKind::String, None, DateTime::now()) {
            Some(row) => row.data = Some(value),
            None => table.insert(ObjectRow::string(key, value)),
        }

        Ok(())
    }

    async fn increment(&self, key: &str) -> KvStoreResult<i64> {
        let mut table = self.table.write().await;

        match table.find_mut(key, StructureKind::String, None, DateTime::now()) {
            Some(row) => {
                let next = integer_of(key, row.data.as_ref().unwrap_or(&Bson::Int64(0)))? + 1;
                row.data = Some(Bson::Int64(next));
                Ok(next)
            }
            None => {
                table.insert(ObjectRow::string(key, Bson::Int64(1)));
                Ok(1)
            }
        }
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> KvStoreResult<()> {
        let mut table = self.table.write().await;

        if let Some(mut rows) = table.take_key(old_key, DateTime::now()) {
            for stored in rows.iter_mut() {
                stored.row.key = new_key.to_string();
            }
            table.put_key(new_key, rows);
        }

        Ok(())
    }

    async fn expire_at(&self, key: &str, at: chrono::DateTime<Utc>) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let at = DateTime::from_chrono(at);

        for stored in table.rows_mut(key, DateTime::now()).iter_mut() {
            stored.row.expire_at = Some(at);
        }
        table.compact(key);

        Ok(())
    }

    async fn persist(&self, key: &str) -> KvStoreResult<()> {
        let mut table = self.table.write().await;

        for stored in table.rows_mut(key, DateTime::now()).iter_mut() {
            stored.row.expire_at = None;
        }
        table.compact(key);

        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvStoreResult<Lookup<Option<i64>>> {
        let table = self.table.read().await;
        let now = DateTime::now();

        Ok(key_ttl(table.live(key, now).map(|stored| stored.row.expire_at), now))
    }

    async fn flush(&self) -> KvStoreResult<()> {
        self.table.write().await.clear();

        Ok(())
    }

    async fn search_index(&self, namespace: &str, content: &str, id: &str) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let rows = table.search_rows_mut();

        rows.retain(|row| !(row.key == namespace && row.id == id));
        rows.push(SearchRow {
            key: namespace.to_string(),
            id: id.to_string(),
            content: content.to_string(),
        });

        Ok(())
    }

    async fn search(&self, namespace: &str, term: &str, limit: usize) -> KvStoreResult<Vec<String>> {
        let terms = tokenize(term);

        Ok(
            self.table
                .read()
                .await
                .search_rows()
                .iter()
                .filter(|row| row.key == namespace)
                .filter(|row| {
                    let words = tokenize(&row.content);
                    terms.iter().any(|term| words.contains(term))
                })
                .take(limit)
                .map(|row| row.id.clone())
                .collect()
        )
    }

    async fn search_remove(&self, namespace: &str, id: &str) -> KvStoreResult<()> {
        self.table
            .write()
            .await
            .search_rows_mut()
            .retain(|row| !(row.key == namespace && row.id == id));

        Ok(())
    }
}

/// Lowercased alphanumeric words, the way a text index splits content.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ObjectTable;

    fn keys() -> MemoryKeys {
        MemoryKeys::new(ObjectTable::shared())
    }

    #[tokio::test]
    async fn plain_values_and_counters() {
        let keys = keys();

        assert_eq!(keys.get("config").await.unwrap(), None);
        keys.set("config", Bson::from("v1")).await.unwrap();
        keys.set("config", Bson::from("v2")).await.unwrap();
        assert_eq!(keys.get("config").await.unwrap(), Some(Bson::from("v2")));

        assert_eq!(keys.increment("nextUid").await.unwrap(), 1);
        assert_eq!(keys.increment("nextUid").await.unwrap(), 2);
        assert!(keys.increment("config").await.is_err());
    }

    #[tokio::test]
    async fn rename_moves_every_row() {
        let keys = keys();
        keys.set("draft", Bson::from("text")).await.unwrap();
        keys.set("post", Bson::from("stale")).await.unwrap();

        keys.rename("draft", "post").await.unwrap();

        assert!(!keys.exists("draft").await.unwrap());
        assert_eq!(keys.get("post").await.unwrap(), Some(Bson::from("text")));
    }

    #[tokio::test]
    async fn renaming_a_missing_key_keeps_the_target() {
        let keys = keys();
        keys.set("queue", Bson::from("kept")).await.unwrap();

        keys.rename("missing", "queue").await.unwrap();

        assert_eq!(keys.get("queue").await.unwrap(), Some(Bson::from("kept")));
        assert!(!keys.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_reports_absent_persistent_and_expiring_keys() {
        let keys = keys();
        assert_eq!(keys.ttl("session").await.unwrap(), Lookup::KeyAbsent);

        keys.set("session", Bson::from("x")).await.unwrap();
        assert_eq!(keys.ttl("session").await.unwrap(), Lookup::Found(None));

        keys.expire("session", 120).await.unwrap();
        let remaining = keys.ttl("session").await.unwrap().found().flatten().unwrap();
        assert!((118..=120).contains(&remaining));

        keys.persist("session").await.unwrap();
        assert_eq!(keys.ttl("session").await.unwrap(), Lookup::Found(None));
    }

    #[tokio::test]
    async fn past_expiry_hides_the_key() {
        let keys = keys();
        keys.set("flash", Bson::from("saved")).await.unwrap();

        keys.expire_at("flash", Utc::now() - chrono::TimeDelta::seconds(1)).await.unwrap();

        assert!(!keys.exists("flash").await.unwrap());
        assert_eq!(keys.get("flash").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_matches_words_within_a_namespace() {
        let keys = keys();
        keys.search_index("post", "Rust ownership explained", "1").await.unwrap();
        keys.search_index("post", "Borrowing in practice", "2").await.unwrap();
        keys.search_index("topic", "Rust meetup", "9").await.unwrap();

        assert_eq!(keys.search("post", "rust", 10).await.unwrap(), vec!["1".to_string()]);

        keys.search_index("post", "Nothing to see", "1").await.unwrap();
        assert!(keys.search("post", "rust", 10).await.unwrap().is_empty());

        keys.search_remove("post", "2").await.unwrap();
        assert!(keys.search("post", "borrowing", 10).await.unwrap().is_empty());
    }
}
