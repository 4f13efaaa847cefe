//! Row layout shared by every backend.
//!
//! All structure kinds are multiplexed onto the `objects` collection, one row per
//! (key, member) pair. Full-text entries live in the separate `search` collection.
//! Backends store these rows natively (the MongoDB backend as BSON documents with
//! exactly these field names, the memory backend as [`ObjectRow`] values).

use std::fmt;

use bson::{Bson, DateTime};
use serde::{Deserialize, Serialize};

/// Collection holding every structure row.
pub const OBJECTS: &str = "objects";
/// Collection holding full-text entries.
pub const SEARCH: &str = "search";

/// Field names of the `objects` collection.
pub mod fields {
    pub const KEY: &str = "_key";
    pub const KIND: &str = "type";
    pub const VALUE: &str = "value";
    pub const DATA: &str = "data";
    pub const SCORE: &str = "score";
    pub const SEQ: &str = "seq";
    pub const EXPIRE_AT: &str = "expireAt";
}

/// Field names of the `search` collection.
pub mod search_fields {
    pub const KEY: &str = "key";
    pub const ID: &str = "id";
    pub const CONTENT: &str = "content";
}

/// The emulated structure a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    /// Plain key-value: one row per key, payload in `data`.
    String,
    /// Hash: one row per field, field name in `value`, payload in `data`.
    Hash,
    /// Set: one row per member, member in `value`.
    Set,
    /// Sorted set: one row per member, member in `value`, ordering in `score`.
    #[serde(rename = "zset")]
    SortedSet,
    /// List: one row per element, element in `value`, position in `seq`.
    List,
}

impl StructureKind {
    /// The tag stored in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::String => "string",
            StructureKind::Hash => "hash",
            StructureKind::Set => "set",
            StructureKind::SortedSet => "zset",
            StructureKind::List => "list",
        }
    }

    /// Parses a stored `type` tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(StructureKind::String),
            "hash" => Some(StructureKind::Hash),
            "set" => Some(StructureKind::Set),
            "zset" => Some(StructureKind::SortedSet),
            "list" => Some(StructureKind::List),
            _ => None,
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StructureKind> for Bson {
    fn from(kind: StructureKind) -> Self {
        Bson::String(kind.as_str().to_string())
    }
}

/// One row of the `objects` collection.
///
/// Unknown fields (such as the store-assigned `_id`) are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRow {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "type")]
    pub kind: StructureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    #[serde(rename = "expireAt", default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime>,
}

impl ObjectRow {
    fn new(key: &str, kind: StructureKind) -> Self {
        Self {
            key: key.to_string(),
            kind,
            value: None,
            data: None,
            score: None,
            seq: None,
            expire_at: None,
        }
    }

    /// A plain key-value row.
    pub fn string(key: &str, data: Bson) -> Self {
        Self { data: Some(data), ..Self::new(key, StructureKind::String) }
    }

    /// A hash field row.
    pub fn hash_field(key: &str, field: &str, data: Bson) -> Self {
        Self {
            value: Some(field.to_string()),
            data: Some(data),
            ..Self::new(key, StructureKind::Hash)
        }
    }

    /// A set member row.
    pub fn set_member(key: &str, member: &str) -> Self {
        Self { value: Some(member.to_string()), ..Self::new(key, StructureKind::Set) }
    }

    /// A sorted-set member row.
    pub fn sorted_member(key: &str, member: &str, score: f64) -> Self {
        Self {
            value: Some(member.to_string()),
            score: Some(score),
            ..Self::new(key, StructureKind::SortedSet)
        }
    }

    /// A list element row.
    pub fn list_element(key: &str, element: &str, seq: i64) -> Self {
        Self {
            value: Some(element.to_string()),
            seq: Some(seq),
            ..Self::new(key, StructureKind::List)
        }
    }

    /// Returns `true` if the row carries an expiry at or before `now`.
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }

    /// The member identity, or an empty string for plain values.
    pub fn member(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

/// One row of the `search` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    pub key: String,
    pub id: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use bson::{de::deserialize_from_bson, doc, oid::ObjectId, ser::serialize_to_bson};

    use super::*;

    #[test]
    fn rows_use_store_field_names() {
        let row = ObjectRow::sorted_member("users:joindate", "uid:1", 3.0);
        let bson = serialize_to_bson(&row).unwrap();

        assert_eq!(
            bson,
            Bson::Document(doc! {
                "_key": "users:joindate",
                "type": "zset",
                "value": "uid:1",
                "score": 3.0,
            })
        );
    }

    #[test]
    fn store_documents_decode_into_rows() {
        let stored = doc! {
            "_id": ObjectId::new(),
            "_key": "user:1",
            "type": "hash",
            "value": "username",
            "data": "alice",
        };
        let row: ObjectRow = deserialize_from_bson(Bson::Document(stored)).unwrap();

        assert_eq!(row, ObjectRow::hash_field("user:1", "username", Bson::from("alice")));
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = DateTime::now();
        let mut row = ObjectRow::set_member("tags", "rust");

        assert!(!row.is_expired(now));
        row.expire_at = Some(now);
        assert!(row.is_expired(now));
    }
}
