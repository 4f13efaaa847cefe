use async_trait::async_trait;
use bson::{Bson, DateTime, Document};

use kvlayer_core::{
    error::KvStoreResult,
    ops::{HashOps, Lookup},
    schema::{ObjectRow, StructureKind},
};

use crate::table::{ObjectTable, SharedTable, integer_of};

#[derive(Debug, Clone)]
pub struct MemoryHash {
    table: SharedTable,
}

impl MemoryHash {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }
}

fn upsert_field(table: &mut ObjectTable, key: &str, field: &str, value: Bson, now: DateTime) {
    match table.find_mut(key, StructureKind::Hash, Some(field), now) {
        Some(row) => row.data = Some(value),
        None => table.insert(ObjectRow::hash_field(key, field, value)),
    }
}

#[async_trait]
impl HashOps for MemoryHash {
    async fn set_object(&self, key: &str, object: Document) -> KvStoreResult<()> {
        let mut table = self.table.write().await;
        let now = DateTime::now();

        for (field, value) in object {
            upsert_field(&mut table, key, &field, value, now);
        }

        Ok(())
    }

    async fn set_object_field(&self, key: &str, field: &str, value: Bson) -> KvStoreResult<()> {
        upsert_field(&mut *self.table.write().await, key, field, value, DateTime::now());

        Ok(())
    }

    async fn get_object(&self, key: &str) -> KvStoreResult<Option<Document>> {
        let table = self.table.read().await;
        let object = table
            .live_of(key, StructureKind::Hash, DateTime::now())
            .map(|stored| {
                (
                    stored.row.member().to_string(),
                    stored.row.data.clone().unwrap_or(Bson::Null),
                )
            })
            .collect::<Document>();

        Ok((!object.is_empty()).then_some(object))
    }

    async fn get_object_field(&self, key: &str, field: &str) -> KvStoreResult<Lookup<Bson>> {
        let table = self.table.read().await;
        let now = DateTime::now();

        Ok(match table.find(key, StructureKind::Hash, field, now) {
            Some(row) => Lookup::Found(row.data.clone().unwrap_or(Bson::Null)),
            None => Lookup::absent(table.holds(key, StructureKind::Hash, now)),
        })
    }

    async fn get_object_fields(&self, key: &str, fields: &[&str]) -> KvStoreResult<Option<Document>> {
        let table = self.table.read().await;
        let now = DateTime::now();

        if !table.holds(key, StructureKind::Hash, now) {
            return Ok(None);
        }

        Ok(Some(
            fields
                .iter()
                .map(|field| {
                    let value = table
                        .find(key, StructureKind::Hash, field, now)
                        .and_then(|row| row.data.clone())
                        .unwrap_or(Bson::Null);
                    (field.to_string(), value)
                })
                .collect(),
        ))
    }

    async fn get_object_keys(&self, key: &str) -> KvStoreResult<Vec<String>> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::Hash, DateTime::now())
                .map(|stored| stored.row.member().to_string())
                .collect()
        )
    }

    async fn get_object_values(&self, key: &str) -> KvStoreResult<Vec<Bson>> {
        Ok(
            self.table
                .read()
                .await
                .live_of(key, StructureKind::Hash, DateTime::now())
                .map(|stored| stored.row.data.clone().unwrap_or(Bson::Null))
                .collect()
        )
    }

    async fn is_object_field(&self, key: &str, field: &str) -> KvStoreResult<bool> {
        Ok(
            self.table
                .read()
                .await
                .find(key, StructureKind::Hash, field, DateTime::now())
                .is_some()
        )
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> KvStoreResult<()> {
        self.table
            .write()
            .await
            .remove_where(key, DateTime::now(), |row| {
                row.kind == StructureKind::Hash && row.member() == field
            });

        Ok(())
    }

    async fn increment_object_field_by(&self, key: &str, field: &str, by: i64) -> KvStoreResult<i64> {
        let mut table = self.table.write().await;

        match table.find_mut(key, StructureKind::Hash, Some(field), DateTime::now()) {
            Some(row) => {
                let next = integer_of(key, row.data.as_ref().unwrap_or(&Bson::Int64(0)))? + by;
                row.data = Some(Bson::Int64(next));
                Ok(next)
            }
            None => {
                table.insert(ObjectRow::hash_field(key, field, Bson::Int64(by)));
                Ok(by)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn hash() -> MemoryHash {
        MemoryHash::new(ObjectTable::shared())
    }

    #[tokio::test]
    async fn set_object_merges_fields() {
        let hash = hash();
        hash.set_object("user:1", doc! { "username": "alice", "postcount": 3 }).await.unwrap();
        hash.set_object("user:1", doc! { "username": "alicia" }).await.unwrap();

        assert_eq!(
            hash.get_object("user:1").await.unwrap(),
            Some(doc! { "username": "alicia", "postcount": 3 })
        );
        assert_eq!(hash.get_object("user:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn field_lookup_distinguishes_missing_key_from_missing_field() {
        let hash = hash();
        hash.set_object_field("user:1", "username", Bson::from("alice")).await.unwrap();

        assert_eq!(
            hash.get_object_field("user:1", "username").await.unwrap(),
            Lookup::Found(Bson::from("alice"))
        );
        assert_eq!(hash.get_object_field("user:1", "email").await.unwrap(), Lookup::MemberAbsent);
        assert_eq!(hash.get_object_field("user:9", "email").await.unwrap(), Lookup::KeyAbsent);

        assert_eq!(
            hash.get_object_fields("user:1", &["username", "email"]).await.unwrap(),
            Some(doc! { "username": "alice", "email": Bson::Null })
        );
        assert_eq!(hash.get_object_fields("user:9", &["username"]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn increments_create_then_accumulate() {
        let hash = hash();

        assert_eq!(hash.increment_object_field("topic:1", "postcount").await.unwrap(), 1);
        assert_eq!(hash.increment_object_field_by("topic:1", "postcount", 4).await.unwrap(), 5);
        assert_eq!(hash.decrement_object_field("topic:1", "postcount").await.unwrap(), 4);
        assert_eq!(hash.decrement_object_field("topic:1", "viewcount").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn deleting_the_last_field_removes_the_key() {
        let hash = hash();
        hash.set_object_field("user:1", "username", Bson::from("alice")).await.unwrap();

        hash.delete_object_field("user:1", "username").await.unwrap();

        assert!(!hash.is_object_field("user:1", "username").await.unwrap());
        assert_eq!(hash.get_object_field("user:1", "username").await.unwrap(), Lookup::KeyAbsent);
    }
}
